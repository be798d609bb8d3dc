/// Conical-tool reachability constraint.
///
/// Swiss-cheese layer: **Grid constraint**
/// A V-bit cannot reach the bottom of a pit narrower than its cone, so every
/// cell is held within a fixed depth step of its deepest 8-neighbour.
/// Sweeps run in place until a fixed point; propagation across many cells
/// within one sweep is allowed.
use crate::grid::{HeightGrid, GREY_LEVELS};
use crate::tool::ToolGeometry;
use tracing::{debug, warn};

const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Outcome of one smoothing run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingReport {
    /// Full-grid sweeps performed, including the final no-change sweep.
    pub sweeps: usize,
    /// Cells whose depth was raised at least once.
    pub raised: usize,
    /// True when the sweep cap stopped the loop before a fixed point.
    pub capped: bool,
}

/// Raises cells the tool cannot reach given their neighbours.
#[derive(Debug, Clone, Copy)]
pub struct ReachabilitySmoother {
    /// Permitted depth drop between neighbours, in grey levels.
    correction: f64,
}

impl ReachabilitySmoother {
    pub fn new(tool: &ToolGeometry, target_depth: f64, density: f64) -> Self {
        Self {
            correction: GREY_LEVELS / (target_depth * density * tool.tool_slope()),
        }
    }

    pub fn correction(&self) -> f64 {
        self.correction
    }

    /// Whether the constraint can bind at all.
    pub fn is_active(&self) -> bool {
        self.correction.is_finite() && self.correction > 0.0 && self.correction < GREY_LEVELS
    }

    pub fn max_sweeps(&self, grid: &HeightGrid) -> usize {
        let by_range = (GREY_LEVELS / self.correction).ceil() as usize;
        by_range.min(grid.columns().max(grid.rows())) + 1
    }

    pub fn smooth(&self, grid: &mut HeightGrid) -> SmoothingReport {
        let mut report = SmoothingReport {
            sweeps: 0,
            raised: 0,
            capped: false,
        };
        if !self.is_active() {
            debug!(correction = self.correction, "reachability constraint inactive");
            return report;
        }

        let cap = self.max_sweeps(grid);
        let mut touched = vec![false; grid.columns() * grid.rows()];
        loop {
            if report.sweeps == cap {
                report.capped = true;
                warn!(
                    sweeps = cap,
                    correction = self.correction,
                    "reachability smoothing hit its sweep cap"
                );
                break;
            }
            report.sweeps += 1;
            if !self.sweep(grid, &mut touched) {
                break;
            }
        }
        report.raised = touched.iter().filter(|t| **t).count();
        debug!(
            sweeps = report.sweeps,
            raised = report.raised,
            "reachability smoothing finished"
        );
        report
    }

    fn sweep(&self, grid: &mut HeightGrid, touched: &mut [bool]) -> bool {
        let (cols, rows) = (grid.columns(), grid.rows());
        let mut changed = false;
        for i in 0..cols {
            for j in 0..rows {
                // Absent cells are already at full depth.
                let Some(height) = grid.get(i, j) else {
                    continue;
                };
                // Work in heights so a raised cell compares equal on the next sweep.
                let lowest = NEIGHBOURS
                    .iter()
                    .filter_map(|(di, dj)| {
                        let ni = i.checked_add_signed(*di).filter(|n| *n < cols)?;
                        let nj = j.checked_add_signed(*dj).filter(|n| *n < rows)?;
                        Some(grid.get(ni, nj).unwrap_or(0.0))
                    })
                    .fold(f64::INFINITY, f64::min);
                let allowed = lowest + self.correction;
                if height > allowed {
                    grid.set(i, j, allowed);
                    touched[i * rows + j] = true;
                    changed = true;
                }
            }
        }
        changed
    }
}
