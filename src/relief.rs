/// Path synthesis from a constrained height grid.
///
/// Swiss-cheese layer: **Path synthesis**
/// Two products come out of the same grid: lightweight preview polylines,
/// and the full motion stream scanned column by column along Y in
/// step-down passes.
use crate::config::JobConfig;
use crate::geometry::{round_to, Vec2};
use crate::grid::{HeightGrid, GREY_LEVELS};
use crate::motion::MotionAccumulator;
use crate::progress::ProgressObserver;
use std::f64::consts::TAU;
use tracing::debug;

/// Minimum growth between two progress notifications.
const PROGRESS_STEP: f64 = 0.05;

/// Vertical envelope of one relief job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutProfile {
    pub target_depth: f64,
    pub step_down: f64,
    /// Z of the stock surface.
    pub initial_z: f64,
    pub final_depth: f64,
    pub safety_height: f64,
    pub stop_height: f64,
    pub jog_speed: f64,
    pub work_speed: f64,
}

impl CutProfile {
    /// Profile with the stock surface at `initial_z`; safety and stop
    /// heights are taken relative to it.
    pub fn new(config: &JobConfig, initial_z: f64) -> Self {
        Self {
            target_depth: config.target_depth,
            step_down: config.step_down,
            initial_z,
            final_depth: initial_z - config.target_depth,
            safety_height: initial_z + config.safety_height,
            stop_height: initial_z + config.stop_height,
            jog_speed: config.jog_speed,
            work_speed: config.work_speed,
        }
    }

    /// Surface at Z 0 on a 3-axis machine, at the stock radius on a rotary one.
    pub fn from_config(config: &JobConfig) -> Self {
        let initial_z = if config.is_rotate {
            config.diameter / 2.0
        } else {
            0.0
        };
        Self::new(config, initial_z)
    }

    /// Denominator for progress reporting, and the most passes a scan runs.
    pub fn pass_count(&self) -> usize {
        if self.step_down.is_nan() || self.step_down <= 0.0 {
            return 1;
        }
        ((self.target_depth / self.step_down).ceil() as usize).saturating_add(1)
    }

    /// Depth of pass `n`, measured from the surface so that rounding never
    /// swallows a step.
    pub fn pass_depth(&self, n: usize) -> f64 {
        round_to(self.initial_z - (n + 1) as f64 * self.step_down, 2)
    }
}

/// Conversion from a depth level (`0..=255`) to machine Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthScale {
    /// Depth levels span the target depth below the stock surface.
    Linear,
    /// Depth levels span the part radius; Z is measured from the axis.
    Radial { max_radius: f64 },
}

impl DepthScale {
    pub fn z(&self, profile: &CutProfile, depth: f64) -> f64 {
        match self {
            DepthScale::Linear => {
                profile.initial_z - round_to(depth * profile.target_depth / GREY_LEVELS, 2)
            }
            DepthScale::Radial { max_radius } => {
                let below_stock = profile.initial_z - max_radius;
                profile.initial_z - below_stock - round_to(depth * max_radius / GREY_LEVELS, 2)
            }
        }
    }
}

fn column_z(grid: &HeightGrid, profile: &CutProfile, scale: DepthScale) -> Vec<Vec<f64>> {
    (0..grid.columns())
        .map(|i| {
            (0..grid.rows())
                .map(|j| scale.z(profile, grid.depth(i, j)))
                .collect()
        })
        .collect()
}

// ── Preview ──────────────────────────────────────────────────────────

/// One `(x, z)` profile per row, closed along the bottom of the cut.
pub fn planar_view(grid: &HeightGrid, profile: &CutProfile, scale: DepthScale) -> Vec<Vec<Vec2>> {
    let geom = grid.geometry();
    let floor = profile.final_depth;
    let mut paths = Vec::with_capacity(grid.rows());
    for j in 0..grid.rows() {
        let mut path: Vec<Vec2> = Vec::new();
        for i in 0..grid.columns() {
            let x = geom.x(i);
            let z = scale.z(profile, grid.depth(i, j));
            if i == 0 {
                path.push(Vec2::new(x, floor));
            }
            let n = path.len();
            if n >= 2 && path[n - 1].y == z && path[n - 2].y == z {
                path[n - 1].x = x;
            } else {
                path.push(Vec2::new(x, z));
            }
            if i + 1 == grid.columns() {
                path.push(Vec2::new(x, floor));
            }
        }
        if let Some(first) = path.first().copied() {
            path.push(first);
        }
        paths.push(path);
    }
    paths
}

/// One closed ring per row, the surface wrapped around a cylinder of
/// `circumference`. Angular positions with no sample sit at `stock_radius`.
pub fn rotary_view(
    grid: &HeightGrid,
    profile: &CutProfile,
    scale: DepthScale,
    circumference: f64,
    stock_radius: f64,
) -> Vec<Vec<Vec2>> {
    let geom = grid.geometry();
    let length = (circumference * geom.density).floor() as usize;
    if length == 0 {
        return Vec::new();
    }
    let mut paths = Vec::with_capacity(grid.rows());
    for j in 0..grid.rows() {
        let mut ring: Vec<Option<f64>> = vec![None; length];
        for i in 0..grid.columns() {
            let z = scale.z(profile, grid.depth(i, j));
            let index = ((geom.x(i) / circumference * length as f64).round() as i64)
                .rem_euclid(length as i64) as usize;
            ring[index] = Some(ring[index].map_or(z, |cur| cur.min(z)));
        }
        let mut path: Vec<Vec2> = ring
            .iter()
            .enumerate()
            .map(|(k, z)| {
                let b = k as f64 / length as f64 * TAU;
                let r = z.unwrap_or(stock_radius);
                Vec2::new(r * b.sin(), r * b.cos())
            })
            .collect();
        if let Some(first) = path.first().copied() {
            path.push(first);
        }
        paths.push(path);
    }
    paths
}

// ── Toolpath ─────────────────────────────────────────────────────────

/// Cells skipped over since the last cut in a column.
#[derive(Debug, Clone, Copy)]
struct PendingRetract {
    x: f64,
    y: f64,
    z: f64,
    max_z: f64,
}

impl PendingRetract {
    fn defer(prev: Option<Self>, x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            max_z: prev.map_or(z, |p| p.max_z.max(z)),
        }
    }
}

/// Turns a grid into step-down passes of boustrophedon column scans.
#[derive(Debug, Clone, Copy)]
pub struct ToolpathScanner {
    profile: CutProfile,
    scale: DepthScale,
    spindle_speed: Option<f64>,
}

impl ToolpathScanner {
    pub fn new(profile: CutProfile, scale: DepthScale) -> Self {
        Self {
            profile,
            scale,
            spindle_speed: None,
        }
    }

    pub fn with_spindle_speed(mut self, speed: Option<f64>) -> Self {
        self.spindle_speed = speed;
        self
    }

    pub fn profile(&self) -> &CutProfile {
        &self.profile
    }

    /// Append the complete program for `grid` to `acc`.
    pub fn scan(
        &self,
        grid: &HeightGrid,
        acc: &mut MotionAccumulator,
        progress: &mut dyn ProgressObserver,
    ) {
        let p = &self.profile;
        let geom = grid.geometry();
        let (width, height) = (grid.columns(), grid.rows());
        let columns = column_z(grid, p, self.scale);
        let column_min: Vec<f64> = columns
            .iter()
            .map(|col| col.iter().copied().fold(f64::INFINITY, f64::min))
            .collect();
        let max_passes = p.pass_count();
        let passes = max_passes as f64;
        let (start_x, start_y) = (geom.x(0), geom.y(0));

        acc.safe_start(start_x, start_y, p.stop_height, p.safety_height, p.jog_speed);
        acc.spindle_on(self.spindle_speed);

        let mut reported = 0.0;
        let mut done = 0usize;
        let mut depth = p.pass_depth(0);
        loop {
            debug!(pass = done, depth, "relief pass");
            let band = depth + p.step_down;
            let mut forward = false;
            for (i, col) in columns.iter().enumerate() {
                if column_min[i] >= band {
                    continue;
                }
                forward = !forward;
                let x = geom.x(i);
                let mut pending: Option<PendingRetract> = None;
                for k in 0..height {
                    let j = if forward { k } else { height - 1 - k };
                    let y = geom.y(j);
                    if k == 0 {
                        acc.rapid_xy(x, y, p.jog_speed);
                    }
                    let z = col[j];
                    if z < band {
                        if let Some(retract) = pending.take() {
                            self.hop(acc, retract);
                        }
                        let target = depth.max(z);
                        if acc.position().z == target {
                            acc.feed_y(y, p.work_speed);
                        } else {
                            acc.feed_yz(y, target, p.work_speed);
                        }
                    } else {
                        pending = Some(PendingRetract::defer(pending, x, y, z));
                    }
                }
                match pending {
                    Some(retract) => self.hop(
                        acc,
                        PendingRetract {
                            z: p.safety_height,
                            max_z: retract.max_z.max(p.safety_height),
                            ..retract
                        },
                    ),
                    None => self.lift(acc, p.safety_height),
                }

                let within = if width > 1 {
                    i as f64 / (width - 1) as f64
                } else {
                    1.0
                };
                let fraction = within / passes + done as f64 / passes;
                if fraction - reported >= PROGRESS_STEP {
                    reported = fraction;
                    progress.on_progress(fraction);
                }
            }
            self.lift(acc, p.safety_height);
            acc.rapid_xy(start_x, start_y, p.jog_speed);
            done += 1;

            if depth <= p.final_depth || done >= max_passes {
                break;
            }
            depth = p.pass_depth(done);
        }

        acc.rapid_z(p.stop_height, p.jog_speed);
        acc.spindle_off();
        progress.on_progress(1.0);
        debug!(passes = done, commands = acc.commands().len(), "relief scan finished");
    }

    /// Rapid to `z` unless the tool is already there.
    fn lift(&self, acc: &mut MotionAccumulator, z: f64) {
        if acc.position().z != z {
            acc.rapid_z(z, self.profile.jog_speed);
        }
    }

    /// Clear the skipped cells, then drop onto the last of them.
    fn hop(&self, acc: &mut MotionAccumulator, retract: PendingRetract) {
        let jog = self.profile.jog_speed;
        if acc.position().z < retract.max_z {
            acc.rapid_z(retract.max_z, jog);
        }
        acc.rapid_xy(retract.x, retract.y, jog);
        acc.rapid_z(retract.z, jog);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridGeometry;
    use crate::motion::{AxisMapping, MotionCommand};
    use crate::progress::NoProgress;
    use approx::assert_abs_diff_eq;

    fn config(target: f64, step: f64) -> JobConfig {
        JobConfig {
            target_depth: target,
            step_down: step,
            safety_height: 1.0,
            stop_height: 10.0,
            ..JobConfig::default()
        }
    }

    fn scan(grid: &HeightGrid, profile: CutProfile) -> MotionAccumulator {
        let mut acc = MotionAccumulator::new(AxisMapping::Linear);
        ToolpathScanner::new(profile, DepthScale::Linear).scan(grid, &mut acc, &mut NoProgress);
        acc
    }

    #[test]
    fn test_profile_relative_heights() {
        let cfg = JobConfig {
            is_rotate: true,
            diameter: 40.0,
            ..config(5.0, 2.0)
        };
        let p = CutProfile::from_config(&cfg);
        assert_eq!(p.initial_z, 20.0);
        assert_eq!(p.final_depth, 15.0);
        assert_eq!(p.safety_height, 21.0);
        assert_eq!(p.stop_height, 30.0);
        assert_eq!(p.pass_count(), 4);
    }

    #[test]
    fn test_depth_scales() {
        let p = CutProfile::from_config(&config(5.0, 5.0));
        assert_eq!(DepthScale::Linear.z(&p, 255.0), -5.0);
        assert_eq!(DepthScale::Linear.z(&p, 0.0), 0.0);
        assert_eq!(DepthScale::Linear.z(&p, 51.0), -1.0);

        let rotary = CutProfile::new(&config(5.0, 5.0), 20.0);
        let radial = DepthScale::Radial { max_radius: 12.0 };
        // surface of the part sits at its radius, the axis at zero
        assert_abs_diff_eq!(radial.z(&rotary, 0.0), 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(radial.z(&rotary, 255.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_grid_single_pass() {
        let grid = HeightGrid::filled(GridGeometry::new(10, 10, 1.0), 0.0);
        let acc = scan(&grid, CutProfile::from_config(&config(5.0, 5.0)));
        let cmds = acc.commands();
        let feeds: Vec<_> = cmds
            .iter()
            .filter_map(|c| match c {
                MotionCommand::Feed(a) => Some(*a),
                _ => None,
            })
            .collect();
        assert_eq!(feeds.len(), 100);
        assert!(feeds.iter().all(|a| a.z.map_or(true, |z| z == -5.0)));
        // one plunge per column, the rest are Y-only
        assert_eq!(feeds.iter().filter(|a| a.z.is_some()).count(), 10);
        assert_eq!(cmds.first(), Some(&MotionCommand::AbsolutePositioning));
        assert_eq!(cmds.last(), Some(&MotionCommand::SpindleOff));
        assert!(matches!(cmds[4], MotionCommand::SpindleOn { .. }));
    }

    #[test]
    fn test_no_retract_between_cut_cells() {
        let grid = HeightGrid::filled(GridGeometry::new(3, 5, 1.0), 0.0);
        let acc = scan(&grid, CutProfile::from_config(&config(5.0, 5.0)));
        let cmds = acc.commands();
        // inside a column: feeds follow one another with nothing in between
        for w in cmds.windows(2) {
            if let (MotionCommand::Feed(_), MotionCommand::Rapid(a)) = (&w[0], &w[1]) {
                assert_eq!(a.z, Some(1.0), "only the column-end lift follows a cut");
            }
        }
    }

    #[test]
    fn test_pass_count_redesigned_termination() {
        let grid = HeightGrid::filled(GridGeometry::new(2, 2, 1.0), 0.0);
        let acc = scan(&grid, CutProfile::from_config(&config(5.0, 2.0)));
        let depths: Vec<f64> = acc
            .commands()
            .iter()
            .filter_map(|c| match c {
                MotionCommand::Feed(a) => a.z,
                _ => None,
            })
            .collect();
        // passes at -2, -4 and -6, the last clamped to the -5 target
        assert_eq!(depths, vec![-2.0, -2.0, -4.0, -4.0, -5.0, -5.0]);
    }

    #[test]
    fn test_step_below_rounding_still_terminates() {
        let grid = HeightGrid::filled(GridGeometry::new(2, 2, 1.0), 0.0);
        let profile = CutProfile::from_config(&config(1.0, 0.004));
        assert_eq!(profile.pass_depth(0), 0.0);
        assert_eq!(profile.pass_depth(249), -1.0);
        let acc = scan(&grid, profile);
        let z = acc.bounding_box().z.unwrap();
        assert_abs_diff_eq!(z.min, -1.0, epsilon = 1e-9);
        assert_eq!(acc.last_command(), Some(&MotionCommand::SpindleOff));
    }

    #[test]
    fn test_non_positive_step_runs_one_pass() {
        let grid = HeightGrid::filled(GridGeometry::new(2, 2, 1.0), 0.0);
        let profile = CutProfile::from_config(&config(1.0, 0.0));
        assert_eq!(profile.pass_count(), 1);
        let acc = scan(&grid, profile);
        assert_eq!(acc.last_command(), Some(&MotionCommand::SpindleOff));
    }

    #[test]
    fn test_untouched_columns_are_skipped() {
        let mut grid = HeightGrid::filled(GridGeometry::new(3, 2, 1.0), 255.0);
        grid.set(1, 0, 0.0);
        let acc = scan(&grid, CutProfile::from_config(&config(5.0, 5.0)));
        let visited: Vec<f64> = acc
            .commands()
            .iter()
            .filter_map(|c| match c {
                MotionCommand::Feed(_) => None,
                c => c.axes().and_then(|a| a.x),
            })
            .collect();
        let x1 = grid.geometry().x(1);
        let x0 = grid.geometry().x(0);
        // start position plus column 1 only
        assert!(visited.iter().all(|x| *x == x0 || *x == x1));
        assert!(visited.contains(&x1));
    }

    #[test]
    fn test_shallow_gap_hops_over() {
        // column 0: deep, stock, deep
        let mut grid = HeightGrid::filled(GridGeometry::new(1, 3, 1.0), 0.0);
        grid.set(0, 1, 255.0);
        let acc = scan(&grid, CutProfile::from_config(&config(5.0, 5.0)));
        let cmds = acc.commands();
        let y = |j| grid.geometry().y(j);
        let idx = cmds
            .iter()
            .position(|c| matches!(c, MotionCommand::Feed(a) if a.y == Some(y(0))))
            .unwrap();
        // lift to the stock surface, hop to the skipped cell, drop, then cut
        let rest = &cmds[idx + 1..idx + 5];
        assert_eq!(rest[0].axes().unwrap().z, Some(0.0));
        assert_eq!(rest[1].axes().unwrap().y, Some(y(1)));
        assert_eq!(rest[2].axes().unwrap().z, Some(0.0));
        assert!(matches!(rest[3], MotionCommand::Feed(a) if a.z == Some(-5.0) && a.y == Some(y(2))));
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_one() {
        let grid = HeightGrid::filled(GridGeometry::new(40, 2, 1.0), 0.0);
        let profile = CutProfile::from_config(&config(4.0, 1.0));
        let mut seen = Vec::new();
        let mut acc = MotionAccumulator::new(AxisMapping::Linear);
        let mut record = |p: f64| seen.push(p);
        ToolpathScanner::new(profile, DepthScale::Linear).scan(&grid, &mut acc, &mut record);
        assert!(seen.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.len() > 5);
    }

    #[test]
    fn test_single_column_grid_progress() {
        let grid = HeightGrid::filled(GridGeometry::new(1, 4, 1.0), 0.0);
        let profile = CutProfile::from_config(&config(2.0, 1.0));
        let mut last = 0.0;
        let mut acc = MotionAccumulator::new(AxisMapping::Linear);
        let mut record = |p: f64| last = p;
        ToolpathScanner::new(profile, DepthScale::Linear).scan(&grid, &mut acc, &mut record);
        assert_eq!(last, 1.0);
    }

    #[test]
    fn test_planar_view_merges_flat_runs() {
        let grid = HeightGrid::filled(GridGeometry::new(5, 1, 1.0), 255.0);
        let p = CutProfile::from_config(&config(5.0, 5.0));
        let paths = planar_view(&grid, &p, DepthScale::Linear);
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        // floor, two surface points spanning the row, floor, closing point
        assert_eq!(path.len(), 5);
        assert_eq!(path[0], Vec2::new(-2.5, -5.0));
        assert_eq!(path[1], Vec2::new(-2.5, 0.0));
        assert_eq!(path[2], Vec2::new(1.5, 0.0));
        assert_eq!(path[3], Vec2::new(1.5, -5.0));
        assert_eq!(path[4], path[0]);
    }

    #[test]
    fn test_rotary_view_rings() {
        let grid = HeightGrid::filled(GridGeometry::new(8, 2, 1.0), 255.0);
        let p = CutProfile::new(&config(2.0, 1.0), 5.0);
        let circumference = 8.0;
        let paths = rotary_view(&grid, &p, DepthScale::Linear, circumference, 5.0);
        assert_eq!(paths.len(), 2);
        for ring in &paths {
            assert_eq!(ring.len(), 9);
            assert_eq!(ring.first(), ring.last());
            for pt in ring {
                assert_abs_diff_eq!(pt.length(), 5.0, epsilon = 1e-9);
            }
        }
    }
}
