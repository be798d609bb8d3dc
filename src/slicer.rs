/// Mesh slicer: intersects a triangle mesh with a stack of parallel planes to
/// produce 2-D polygon layers.
///
/// Swiss-cheese layer: **3-D → 2-D projection**
/// Extension point: swap in adaptive layer spacing by choosing the levels.
use crate::geometry::{Polyline, Segment2, Triangle, Vec2, Vec3};
use crate::mesh::Mesh;
use tracing::trace;

const CHAIN_EPSILON: f64 = 1e-6;

/// Axis the cutting planes are stacked along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceAxis {
    X,
    Y,
    Z,
}

impl SliceAxis {
    fn level(&self, v: Vec3) -> f64 {
        match self {
            SliceAxis::X => v.x,
            SliceAxis::Y => v.y,
            SliceAxis::Z => v.z,
        }
    }

    /// In-plane coordinates of a point on a cutting plane.
    fn project(&self, v: Vec3) -> Vec2 {
        match self {
            SliceAxis::X => Vec2::new(v.y, v.z),
            SliceAxis::Y => Vec2::new(v.x, v.z),
            SliceAxis::Z => Vec2::new(v.x, v.y),
        }
    }
}

/// Cross-section of a mesh at one plane. Closed polygons repeat their first
/// point at the end.
#[derive(Debug, Clone)]
pub struct PolygonLayer {
    pub level: f64,
    pub polygons: Vec<Polyline>,
}

/// Slice `count` layers of `thickness`, layer `k` at `min + (k + ½)·thickness`
/// along `axis`. Empty layers are kept so indices line up with levels.
pub fn slice_layers(mesh: &Mesh, axis: SliceAxis, thickness: f64, count: usize) -> Vec<PolygonLayer> {
    let Some(bounds) = mesh.aabb() else {
        return Vec::new();
    };
    let start = axis.level(bounds.min);
    let triangles: Vec<Triangle> = mesh.triangles().collect();
    (0..count)
        .map(|k| {
            let level = start + (k as f64 + 0.5) * thickness;
            PolygonLayer {
                level,
                polygons: slice_at(&triangles, axis, level),
            }
        })
        .collect()
}

/// Slice the triangles at a single plane, returning chained contours.
pub fn slice_at(triangles: &[Triangle], axis: SliceAxis, level: f64) -> Vec<Polyline> {
    let segments = collect_segments(triangles, axis, level);
    chain_segments(segments)
}

/// For every triangle that straddles the plane, compute the intersection
/// segment.
fn collect_segments(triangles: &[Triangle], axis: SliceAxis, level: f64) -> Vec<Segment2> {
    let mut segs = Vec::new();
    for tri in triangles {
        let levels = tri.vertices().map(|v| axis.level(v));
        let lo = levels.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if lo > level || hi < level {
            continue;
        }
        if let Some(seg) = intersect_triangle(tri, axis, level) {
            segs.push(seg);
        }
    }
    segs
}

fn intersect_triangle(tri: &Triangle, axis: SliceAxis, level: f64) -> Option<Segment2> {
    let verts = tri.vertices();
    let edges = [(0, 1), (1, 2), (2, 0)];
    let mut pts: Vec<Vec2> = Vec::new();

    for &(i, j) in &edges {
        let p = verts[i];
        let q = verts[j];
        let (lp, lq) = (axis.level(p), axis.level(q));
        if (lp - level) * (lq - level) < 0.0 {
            // edge crosses the plane
            let t = (level - lp) / (lq - lp);
            pts.push(axis.project(Vec3::lerp(p, q, t)));
        } else if (lp - level).abs() < 1e-10 {
            pts.push(axis.project(p));
        }
    }

    // Deduplicate very close points
    pts.dedup_by(|a, b| Vec2::dist(*a, *b) < 1e-10);

    if pts.len() >= 2 {
        Some(Segment2::new(pts[0], pts[1]))
    } else {
        trace!(level, "triangle touches plane at a single point");
        None
    }
}

/// Chain loose segments into polylines by matching endpoints.
fn chain_segments(segments: Vec<Segment2>) -> Vec<Polyline> {
    let mut used = vec![false; segments.len()];
    let mut polylines = Vec::new();

    for start_idx in 0..segments.len() {
        if used[start_idx] {
            continue;
        }
        used[start_idx] = true;
        let mut chain = vec![segments[start_idx].a, segments[start_idx].b];
        let mut tail = segments[start_idx].b;

        loop {
            let next = segments.iter().enumerate().find_map(|(j, seg)| {
                if used[j] {
                    None
                } else if Vec2::dist(seg.a, tail) < CHAIN_EPSILON {
                    Some((j, seg.b))
                } else if Vec2::dist(seg.b, tail) < CHAIN_EPSILON {
                    Some((j, seg.a))
                } else {
                    None
                }
            });
            let Some((j, point)) = next else {
                break;
            };
            used[j] = true;
            chain.push(point);
            tail = point;
        }

        let closed = chain.len() > 3 && Vec2::dist(chain[0], tail) < CHAIN_EPSILON;
        if closed {
            // snap the closing point onto the first one
            let first = chain[0];
            if let Some(last) = chain.last_mut() {
                *last = first;
            }
        }
        polylines.push(Polyline::new(chain, closed));
    }
    polylines
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Axis-aligned box from (0,0,0) to (2,4,6), 12 triangles.
    fn box_mesh() -> Mesh {
        let (x, y, z) = (2.0, 4.0, 6.0);
        let v = |a: f64, b: f64, c: f64| Vec3::new(a, b, c);
        let quads = [
            [v(0.0, 0.0, 0.0), v(x, 0.0, 0.0), v(x, y, 0.0), v(0.0, y, 0.0)],
            [v(0.0, 0.0, z), v(x, 0.0, z), v(x, y, z), v(0.0, y, z)],
            [v(0.0, 0.0, 0.0), v(x, 0.0, 0.0), v(x, 0.0, z), v(0.0, 0.0, z)],
            [v(0.0, y, 0.0), v(x, y, 0.0), v(x, y, z), v(0.0, y, z)],
            [v(0.0, 0.0, 0.0), v(0.0, y, 0.0), v(0.0, y, z), v(0.0, 0.0, z)],
            [v(x, 0.0, 0.0), v(x, y, 0.0), v(x, y, z), v(x, 0.0, z)],
        ];
        let tris: Vec<Triangle> = quads
            .iter()
            .flat_map(|q| {
                [
                    Triangle {
                        v0: q[0],
                        v1: q[1],
                        v2: q[2],
                    },
                    Triangle {
                        v0: q[0],
                        v1: q[2],
                        v2: q[3],
                    },
                ]
            })
            .collect();
        Mesh::from_triangles(&tris)
    }

    #[test]
    fn test_slice_box_along_y() {
        let mesh = box_mesh();
        let layers = slice_layers(&mesh, SliceAxis::Y, 1.0, 4);
        assert_eq!(layers.len(), 4);
        assert!((layers[0].level - 0.5).abs() < 1e-12);
        assert!((layers[3].level - 3.5).abs() < 1e-12);
        for layer in &layers {
            assert_eq!(layer.polygons.len(), 1);
            let poly = &layer.polygons[0];
            assert!(poly.closed);
            assert_eq!(poly.points.first(), poly.points.last());
            let b = poly.bounds().unwrap();
            // projected onto (x, z)
            assert!((b.max.x - 2.0).abs() < 1e-9);
            assert!((b.max.y - 6.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_plane_outside_mesh_is_empty() {
        let mesh = box_mesh();
        let tris: Vec<Triangle> = mesh.triangles().collect();
        assert!(slice_at(&tris, SliceAxis::Z, 10.0).is_empty());
    }

    #[test]
    fn test_empty_mesh_has_no_layers() {
        assert!(slice_layers(&Mesh::default(), SliceAxis::Z, 1.0, 3).is_empty());
    }
}
