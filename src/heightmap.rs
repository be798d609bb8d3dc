/// Top-surface height map of a mesh, sampled on a regular XY grid.
///
/// Swiss-cheese layer: **3-D → grid projection** (3-axis machining)
/// Extension point: a different projector (e.g. drop-cutter with tool
/// compensation) only needs to produce a `HeightGrid`.
use crate::error::{ReliefError, Result};
use crate::geometry::{
    is_zero, point_in_triangle, segment_line_intersection, PlaneEquation, Triangle, Vec2, Vec3,
};
use crate::grid::{GridGeometry, HeightGrid, GREY_LEVELS};
use crate::mesh::Mesh;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
pub struct PlanarHeightMapBuilder {
    density: f64,
    extension_x: usize,
    extension_y: usize,
    min_grey: f64,
    max_grey: f64,
}

impl PlanarHeightMapBuilder {
    pub fn new(density: f64) -> Self {
        Self {
            density,
            extension_x: 0,
            extension_y: 0,
            min_grey: 0.0,
            max_grey: GREY_LEVELS,
        }
    }

    /// Unsampled margin, in cells, added on each side.
    pub fn with_extension(mut self, x: usize, y: usize) -> Self {
        self.extension_x = x;
        self.extension_y = y;
        self
    }

    pub fn with_grey_range(mut self, min_grey: f64, max_grey: f64) -> Self {
        self.min_grey = min_grey;
        self.max_grey = max_grey;
        self
    }

    /// Sample the visible top surface of `mesh`, measured from its AABB minimum.
    pub fn build(&self, mesh: &Mesh) -> Result<HeightGrid> {
        let aabb = *mesh
            .aabb()
            .ok_or_else(|| ReliefError::EmptyGrid("mesh has no vertices".into()))?;
        let extent = aabb.length();
        let core = GridGeometry::from_extent(extent.x, extent.y, self.density);
        let geometry = GridGeometry::new(
            core.columns + 2 * self.extension_x,
            core.rows + 2 * self.extension_y,
            self.density,
        );
        if geometry.is_empty() {
            return Err(ReliefError::EmptyGrid(format!(
                "mesh footprint {:.3} x {:.3} at density {}",
                extent.x, extent.y, self.density
            )));
        }

        let mut grid = HeightGrid::new(geometry);
        for tri in mesh.triangles() {
            let local = Triangle {
                v0: tri.v0 - aabb.min,
                v1: tri.v1 - aabb.min,
                v2: tri.v2 - aabb.min,
            };
            self.rasterize(&local, &mut grid);
        }

        let (min_grey, max_grey) = (self.min_grey, self.max_grey);
        if is_zero(extent.z) {
            grid.map_heights(|_| max_grey);
        } else {
            grid.map_heights(|z| z / extent.z * (max_grey - min_grey) + min_grey);
        }
        debug!(
            columns = geometry.columns,
            rows = geometry.rows,
            sampled = grid.sampled_cells(),
            "planar height map built"
        );
        Ok(grid)
    }

    fn rasterize(&self, tri: &Triangle, grid: &mut HeightGrid) {
        let d = self.density;
        let bounds = tri.bounds();
        let plane = PlaneEquation::through(tri.v0, tri.v1, tri.v2);
        let flat = |v: Vec3| Vec2::new(v.x, v.y);
        let rows = grid.rows() as i64;
        // samples past the core footprint would land in the margins
        let core_columns = grid.columns() as i64 - 2 * self.extension_x as i64;
        let core_rows = rows - 2 * self.extension_y as i64;

        let (i0, i1) = ((bounds.min.x * d).ceil() as i64, (bounds.max.x * d).floor() as i64);
        let (j0, j1) = ((bounds.min.y * d).ceil() as i64, (bounds.max.y * d).floor() as i64);
        for i in i0.max(0)..=i1.min(core_columns - 1) {
            for j in j0.max(0)..=j1.min(core_rows - 1) {
                let p = Vec2::new(i as f64 / d, j as f64 / d);
                if !point_in_triangle(flat(tri.v0), flat(tri.v1), flat(tri.v2), p) {
                    continue;
                }
                let z = match plane.z_at(p.x, p.y) {
                    Some(z) => Some(z),
                    None => self.wall_height(tri, &plane, p),
                };
                let Some(z) = z else {
                    trace!(i, j, "no height resolved for wall sample");
                    continue;
                };
                let col = i + self.extension_x as i64;
                let row_from_bottom = j + self.extension_y as i64;
                grid.raise(col as usize, (rows - 1 - row_from_bottom) as usize, z);
            }
        }
    }

    /// Top of a vertical face above `p`, from its silhouette edges.
    fn wall_height(&self, tri: &Triangle, plane: &PlaneEquation, p: Vec2) -> Option<f64> {
        // A vertical face projects to a line; only samples on that line see it.
        if plane.trace_distance(p.x, p.y) > 0.5 / self.density {
            return None;
        }
        let along_y = is_zero(plane.b);
        let project = |v: Vec3| {
            if along_y {
                Vec2::new(v.y, v.z)
            } else {
                Vec2::new(v.x, v.z)
            }
        };
        let u = if along_y { p.y } else { p.x };
        let (q0, q1) = (Vec2::new(u, 0.0), Vec2::new(u, 1.0));
        let [a, b, c] = tri.vertices().map(project);
        [(a, b), (b, c), (c, a)]
            .into_iter()
            .filter_map(|(s, e)| segment_line_intersection(s, e, q0, q1))
            .map(|hit| hit.y)
            .reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tri(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> Triangle {
        Triangle {
            v0: Vec3::new(a[0], a[1], a[2]),
            v1: Vec3::new(b[0], b[1], b[2]),
            v2: Vec3::new(c[0], c[1], c[2]),
        }
    }

    fn floor() -> Vec<Triangle> {
        vec![
            tri([0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.0, 10.0, 0.0]),
            tri([0.0, 0.0, 0.0], [10.0, 10.0, 0.0], [0.0, 10.0, 0.0]),
        ]
    }

    #[test]
    fn test_ramp_heights() {
        let mesh = Mesh::from_triangles(&[
            tri([0.0, 0.0, 0.0], [10.0, 0.0, 5.0], [10.0, 10.0, 5.0]),
            tri([0.0, 0.0, 0.0], [10.0, 10.0, 5.0], [0.0, 10.0, 0.0]),
        ]);
        let grid = PlanarHeightMapBuilder::new(1.0).build(&mesh).unwrap();
        assert_eq!(grid.columns(), 10);
        assert_eq!(grid.rows(), 10);
        // z = x / 2, normalised by the 5 mm extent
        assert_abs_diff_eq!(grid.get(4, 3).unwrap(), 102.0, epsilon = 1e-9);
        assert_abs_diff_eq!(grid.get(0, 0).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_offset_mesh_matches_origin_mesh() {
        let mut shifted = Mesh::from_triangles(&[
            tri([0.0, 0.0, 0.0], [10.0, 0.0, 5.0], [10.0, 10.0, 5.0]),
            tri([0.0, 0.0, 0.0], [10.0, 10.0, 5.0], [0.0, 10.0, 0.0]),
        ]);
        let base = PlanarHeightMapBuilder::new(1.0).build(&shifted).unwrap();
        shifted.offset(Vec3::new(-3.0, 7.0, 2.0));
        let moved = PlanarHeightMapBuilder::new(1.0).build(&shifted).unwrap();
        for i in 0..base.columns() {
            for j in 0..base.rows() {
                let (a, b) = (base.get(i, j), moved.get(i, j));
                assert_eq!(a.is_some(), b.is_some());
                if let (Some(a), Some(b)) = (a, b) {
                    assert_abs_diff_eq!(a, b, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_flat_mesh_maps_to_max_grey() {
        let mesh = Mesh::from_triangles(&floor());
        let grid = PlanarHeightMapBuilder::new(1.0)
            .with_grey_range(10.0, 200.0)
            .build(&mesh)
            .unwrap();
        assert_eq!(grid.get(5, 5), Some(200.0));
    }

    #[test]
    fn test_extension_margin_stays_unsampled() {
        let mesh = Mesh::from_triangles(&floor());
        let grid = PlanarHeightMapBuilder::new(1.0)
            .with_extension(2, 3)
            .build(&mesh)
            .unwrap();
        assert_eq!(grid.columns(), 14);
        assert_eq!(grid.rows(), 16);
        assert_eq!(grid.get(0, 8), None);
        assert_eq!(grid.get(1, 8), None);
        assert_eq!(grid.get(7, 15), None);
        assert!(grid.get(2, 12).is_some());
        assert!(grid.get(11, 3).is_some());
        for row in 0..grid.rows() {
            assert_eq!(grid.get(12, row), None, "right margin row {row}");
            assert_eq!(grid.get(13, row), None, "right margin row {row}");
        }
        for col in 0..grid.columns() {
            for row in (0..3).chain(13..16) {
                assert_eq!(grid.get(col, row), None, "margin cell ({col}, {row})");
            }
        }
    }

    #[test]
    fn test_vertical_wall_takes_top_edge() {
        let mut tris = floor();
        // wall in the x = 5 plane, sloping from z = 3 at y = 0 to z = 0 at y = 10
        tris.push(tri([5.0, 0.0, 0.0], [5.0, 10.0, 0.0], [5.0, 0.0, 3.0]));
        let mesh = Mesh::from_triangles(&tris);
        let grid = PlanarHeightMapBuilder::new(1.0).build(&mesh).unwrap();
        // y = 2 sits on row 10 - 1 - 2
        assert_abs_diff_eq!(grid.get(5, 7).unwrap(), 204.0, epsilon = 1e-9);
        // neighbouring column only sees the floor
        assert_abs_diff_eq!(grid.get(4, 7).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_mesh_is_error() {
        let err = PlanarHeightMapBuilder::new(1.0)
            .build(&Mesh::default())
            .unwrap_err();
        assert!(matches!(err, ReliefError::EmptyGrid(_)));
    }
}
