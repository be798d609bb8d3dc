/// Height grids and their geometry.
///
/// Swiss-cheese layer: **Discretized surface**
/// Every source (raster, planar mesh, unwrapped mesh) lands here before
/// smoothing and path synthesis.
use serde::{Deserialize, Serialize};

/// Grey level of the stock surface; `0.0` is full target depth.
pub const GREY_LEVELS: f64 = 255.0;

/// Dimensions and spacing of a grid.
///
/// Values are re-derived, never mutated in place: a rotated source gets a
/// fresh `GridGeometry` from [`GridGeometry::rescaled`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub columns: usize,
    pub rows: usize,
    /// Samples per physical unit along both axes.
    pub density: f64,
}

impl GridGeometry {
    pub fn new(columns: usize, rows: usize, density: f64) -> Self {
        Self {
            columns,
            rows,
            density,
        }
    }

    /// `round(extent × density)` cells per axis.
    pub fn from_extent(width: f64, height: f64, density: f64) -> Self {
        Self::new(
            (width * density).round().max(0.0) as usize,
            (height * density).round().max(0.0) as usize,
            density,
        )
    }

    /// Scale cell counts by the change in source size (e.g. after rotating an
    /// image onto a larger canvas).
    pub fn rescaled(&self, from: (u32, u32), to: (u32, u32)) -> Self {
        let scale = |cells: usize, a: u32, b: u32| {
            if a == 0 {
                cells
            } else {
                (cells as f64 * b as f64 / a as f64).round() as usize
            }
        };
        Self::new(
            scale(self.columns, from.0, to.0),
            scale(self.rows, from.1, to.1),
            self.density,
        )
    }

    pub fn spacing(&self) -> f64 {
        1.0 / self.density
    }

    pub fn width(&self) -> f64 {
        self.columns as f64 / self.density
    }

    pub fn height(&self) -> f64 {
        self.rows as f64 / self.density
    }

    pub fn is_empty(&self) -> bool {
        self.columns == 0 || self.rows == 0
    }

    /// Physical X of column `i`, centred on the grid.
    pub fn x(&self, i: usize) -> f64 {
        (i as f64 - self.columns as f64 / 2.0) / self.density
    }

    /// Physical Y of row `j`, centred; row 0 is the top edge.
    pub fn y(&self, j: usize) -> f64 {
        (self.rows as f64 / 2.0 - j as f64) / self.density
    }
}

/// Column-major grid of optional grey heights.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    geometry: GridGeometry,
    cells: Vec<Option<f64>>,
}

impl HeightGrid {
    /// A grid with every cell unsampled.
    pub fn new(geometry: GridGeometry) -> Self {
        Self {
            cells: vec![None; geometry.columns * geometry.rows],
            geometry,
        }
    }

    pub fn filled(geometry: GridGeometry, height: f64) -> Self {
        Self {
            cells: vec![Some(height); geometry.columns * geometry.rows],
            geometry,
        }
    }

    pub fn from_fn(geometry: GridGeometry, mut f: impl FnMut(usize, usize) -> Option<f64>) -> Self {
        let mut grid = Self::new(geometry);
        for i in 0..geometry.columns {
            for j in 0..geometry.rows {
                grid.cells[i * geometry.rows + j] = f(i, j);
            }
        }
        grid
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    pub fn columns(&self) -> usize {
        self.geometry.columns
    }

    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    fn index(&self, col: usize, row: usize) -> Option<usize> {
        (col < self.geometry.columns && row < self.geometry.rows)
            .then(|| col * self.geometry.rows + row)
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f64> {
        self.index(col, row).and_then(|idx| self.cells[idx])
    }

    /// Store a height. Out-of-range coordinates are ignored.
    pub fn set(&mut self, col: usize, row: usize, height: f64) {
        if let Some(idx) = self.index(col, row) {
            self.cells[idx] = Some(height);
        }
    }

    /// Keep the larger of the stored height and `height`.
    pub fn raise(&mut self, col: usize, row: usize, height: f64) {
        if let Some(idx) = self.index(col, row) {
            let cell = &mut self.cells[idx];
            *cell = Some(cell.map_or(height, |h| h.max(height)));
        }
    }

    /// Depth level `255 − height`; absent cells are full depth.
    pub fn depth(&self, col: usize, row: usize) -> f64 {
        GREY_LEVELS - self.get(col, row).unwrap_or(0.0)
    }

    pub fn set_depth(&mut self, col: usize, row: usize, depth: f64) {
        self.set(col, row, GREY_LEVELS - depth);
    }

    /// Map every present height, leaving absent cells untouched.
    pub fn map_heights(&mut self, f: impl Fn(f64) -> f64) {
        for cell in self.cells.iter_mut().flatten() {
            *cell = f(*cell);
        }
    }

    pub fn sampled_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}
