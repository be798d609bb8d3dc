/// Cylindrical unwrap of a mesh for rotary machining.
///
/// Swiss-cheese layer: **3-D → grid projection** (4-axis machining)
/// The part turns about the machine Y axis. Each Y layer is sliced, and every
/// angular bin around the axis keeps the outermost radius of the section.
use crate::error::{ReliefError, Result};
use crate::geometry::{ray_line_distance, Vec2, Vec3};
use crate::grid::{GridGeometry, HeightGrid, GREY_LEVELS};
use crate::mesh::Mesh;
use crate::slicer::{slice_layers, SliceAxis};
use std::f64::consts::{PI, TAU};
use tracing::{debug, trace};

const ANGLE_EPSILON: f64 = 1e-9;

/// Unwrapped grid: columns are angular bins, rows are Y layers (top row is
/// the largest Y), heights are `radius / max_radius × 255`.
#[derive(Debug, Clone)]
pub struct RadialGrid {
    pub grid: HeightGrid,
    pub max_radius: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RadialSlicer {
    density: f64,
}

impl RadialSlicer {
    pub fn new(density: f64) -> Self {
        Self { density }
    }

    /// Recentre `mesh` on its XZ centre and unwrap it around the Y axis.
    pub fn unwrap(&self, mut mesh: Mesh) -> Result<RadialGrid> {
        let aabb = *mesh
            .aabb()
            .ok_or_else(|| ReliefError::EmptyGrid("mesh has no vertices".into()))?;
        let centre = aabb.center();
        mesh.offset(Vec3::new(-centre.x, 0.0, -centre.z));

        let reach = mesh
            .vertices()
            .iter()
            .map(|v| v.x.hypot(v.z))
            .fold(0.0, f64::max);
        if reach <= 0.0 {
            return Err(ReliefError::EmptyGrid(
                "mesh lies on the rotation axis".into(),
            ));
        }

        let d = self.density;
        let layers = ((aabb.length().y * d).round() as usize).max(1);
        let bins = ((TAU * reach * d).round() as usize).max(3);
        let sections = slice_layers(&mesh, SliceAxis::Y, 1.0 / d, layers);

        let mut radii = vec![vec![None::<f64>; bins]; layers];
        let mut max_radius = 0.0f64;
        for (k, layer) in sections.iter().enumerate() {
            let ring = &mut radii[layers - 1 - k];
            for poly in &layer.polygons {
                for (a, b) in poly.edges() {
                    for (bin, r) in edge_bins(a, b, bins) {
                        let slot = &mut ring[bin];
                        *slot = Some(slot.map_or(r, |cur: f64| cur.max(r)));
                        max_radius = max_radius.max(r);
                    }
                }
            }
        }

        if max_radius <= 0.0 {
            return Err(ReliefError::EmptyGrid(
                "no cross-section reached any angular bin".into(),
            ));
        }
        let geometry = GridGeometry::new(bins, layers, d);
        let grid = HeightGrid::from_fn(geometry, |i, j| {
            radii[j][i].map(|r| r / max_radius * GREY_LEVELS)
        });
        debug!(
            bins,
            layers,
            max_radius,
            sampled = grid.sampled_cells(),
            "radial unwrap built"
        );
        Ok(RadialGrid { grid, max_radius })
    }
}

/// Angular bins crossed by the section edge `a`–`b`, with the radius of the
/// edge at each bin angle. Points are `(x, z)`; angle 0 looks along +Z.
fn edge_bins(a: Vec2, b: Vec2, bins: usize) -> Vec<(usize, f64)> {
    if Vec2::dist(a, b) < ANGLE_EPSILON {
        return Vec::new();
    }
    let start = a.x.atan2(a.y);
    let end = b.x.atan2(b.y);
    let mut span = end - start;
    if span > PI {
        span -= TAU;
    } else if span < -PI {
        span += TAU;
    }
    if span.abs() < ANGLE_EPSILON || (span.abs() - PI).abs() < ANGLE_EPSILON {
        trace!(?a, ?b, "edge subtends no usable angle");
        return Vec::new();
    }

    let per_bin = TAU / bins as f64;
    let (lo, hi) = if span > 0.0 {
        (start, start + span)
    } else {
        (start + span, start)
    };
    let first = (lo / per_bin).ceil() as i64;
    let last = (hi / per_bin).floor() as i64;
    (first..=last)
        .filter_map(|k| {
            let r = ray_line_distance(k as f64 * per_bin, a, b)?;
            Some((k.rem_euclid(bins as i64) as usize, r))
        })
        .collect()
}
