/// Indexed triangle mesh with a cached bounding box.
///
/// Swiss-cheese layer: **Geometry Input**
/// Every transform invalidates the cached AABB; the next `aabb()` call
/// recomputes it from the vertices.
use crate::geometry::{BoundingBox, Triangle, Vec3};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

/// Three vertex indices into `Mesh::vertices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub vertex_index: [usize; 3],
}

/// Plane whose normal becomes "up" (+Z) when a mesh is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plane {
    #[default]
    Xy,
    Xz,
    Yz,
}

/// Side of the part that faces the tool in multi-face rotary machining.
///
/// Faces are quarter turns about the Y (rotation) axis, in B order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshFace {
    Front,
    Right,
    Back,
    Left,
}

impl MeshFace {
    pub const ALL: [MeshFace; 4] = [
        MeshFace::Front,
        MeshFace::Right,
        MeshFace::Back,
        MeshFace::Left,
    ];
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    vertices: Vec<Vec3>,
    faces: Vec<Face>,
    aabb: OnceCell<Option<BoundingBox>>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Face>) -> Self {
        Self {
            vertices,
            faces,
            aabb: OnceCell::new(),
        }
    }

    /// Build an unindexed mesh, three fresh vertices per triangle.
    pub fn from_triangles(triangles: &[Triangle]) -> Self {
        let mut vertices = Vec::with_capacity(triangles.len() * 3);
        let mut faces = Vec::with_capacity(triangles.len());
        for t in triangles {
            let base = vertices.len();
            vertices.extend_from_slice(&t.vertices());
            faces.push(Face {
                vertex_index: [base, base + 1, base + 2],
            });
        }
        Self::new(vertices, faces)
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Axis-aligned bounding box of all vertices, cached until the next transform.
    pub fn aabb(&self) -> Option<&BoundingBox> {
        self.aabb
            .get_or_init(|| BoundingBox::from_points(&self.vertices))
            .as_ref()
    }

    /// Resolve faces into triangles. Faces with out-of-range indices are skipped.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.faces.iter().filter_map(|f| {
            let [a, b, c] = f.vertex_index;
            Some(Triangle {
                v0: *self.vertices.get(a)?,
                v1: *self.vertices.get(b)?,
                v2: *self.vertices.get(c)?,
            })
        })
    }

    fn map_vertices(&mut self, f: impl Fn(Vec3) -> Vec3) {
        for v in &mut self.vertices {
            *v = f(*v);
        }
        self.aabb = OnceCell::new();
    }

    pub fn offset(&mut self, by: Vec3) {
        self.map_vertices(|v| v + by);
    }

    /// Scale about the origin by per-axis factors.
    pub fn resize(&mut self, factors: Vec3) {
        self.map_vertices(|v| v.scale(factors));
    }

    /// Rotate so that the named plane's normal points along +Z.
    pub fn set_plane(&mut self, plane: Plane) {
        match plane {
            Plane::Xy => {}
            Plane::Xz => self.map_vertices(|v| Vec3::new(v.x, -v.z, v.y)),
            Plane::Yz => self.map_vertices(|v| Vec3::new(v.y, v.z, v.x)),
        }
    }

    /// Rotate about Y so that `face` looks up the +Z axis.
    ///
    /// Called on a freshly loaded mesh; rotations do not accumulate state.
    pub fn set_coordinate_system(&mut self, face: MeshFace) {
        match face {
            MeshFace::Front => {}
            MeshFace::Right => self.map_vertices(|v| Vec3::new(-v.z, v.y, v.x)),
            MeshFace::Back => self.map_vertices(|v| Vec3::new(-v.x, v.y, -v.z)),
            MeshFace::Left => self.map_vertices(|v| Vec3::new(v.z, v.y, -v.x)),
        }
    }

    /// Translate so the bounding box minimum sits at the origin.
    pub fn offset_to_origin(&mut self) {
        if let Some(b) = self.aabb().copied() {
            self.offset(Vec3::new(-b.min.x, -b.min.y, -b.min.z));
        }
    }
}
