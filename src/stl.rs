/// STL file parser — binary and ASCII formats.
///
/// Swiss-cheese layer: **Geometry Input**
/// Plug a different parser here (OBJ, 3MF, …) by producing a `Mesh`.
use crate::error::{ReliefError, Result};
use crate::geometry::{Triangle, Vec3};
use crate::mesh::{Mesh, Plane};
use tracing::debug;

/// Parse an STL file and rotate it so `plane` faces up.
pub fn load_stl(data: &[u8], plane: Plane) -> Result<Mesh> {
    let mut mesh = parse_stl(data)?;
    mesh.set_plane(plane);
    debug!(
        faces = mesh.faces().len(),
        ?plane,
        "loaded STL mesh"
    );
    Ok(mesh)
}

/// Detect format and parse an STL file from raw bytes.
pub fn parse_stl(data: &[u8]) -> Result<Mesh> {
    if data.len() < 84 {
        // Too short for binary; try ASCII
        return parse_ascii_stl(data);
    }
    // ASCII STL starts with "solid " (but some binary files also do)
    // Heuristic: if it starts with "solid" and the declared triangle count
    // doesn't match the file size, treat as ASCII.
    if data.starts_with(b"solid") && binary_len(data) != Some(data.len()) {
        return parse_ascii_stl(data);
    }
    parse_binary_stl(data)
}

fn triangle_count(data: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = data.get(80..84)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes) as usize)
}

fn binary_len(data: &[u8]) -> Option<usize> {
    triangle_count(data)?.checked_mul(50)?.checked_add(84)
}

fn read_f32_le(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_vec3(data: &[u8], offset: usize) -> Vec3 {
    Vec3::new(
        read_f32_le(data, offset) as f64,
        read_f32_le(data, offset + 4) as f64,
        read_f32_le(data, offset + 8) as f64,
    )
}

fn parse_binary_stl(data: &[u8]) -> Result<Mesh> {
    let (Some(tri_count), Some(expected)) = (triangle_count(data), binary_len(data)) else {
        return Err(ReliefError::MeshLoadFailed("Binary STL too short".into()));
    };
    if data.len() < expected {
        return Err(ReliefError::MeshLoadFailed(format!(
            "Binary STL truncated: expected {} bytes, got {}",
            expected,
            data.len()
        )));
    }
    let mut triangles = Vec::with_capacity(tri_count);
    for i in 0..tri_count {
        // 12 bytes of facet normal precede the vertices; normals are recomputed
        // from winding where needed, so they are not kept.
        let base = 84 + i * 50;
        triangles.push(Triangle {
            v0: read_vec3(data, base + 12),
            v1: read_vec3(data, base + 24),
            v2: read_vec3(data, base + 36),
        });
    }
    if triangles.is_empty() {
        return Err(ReliefError::MeshLoadFailed(
            "No triangles found in binary STL".into(),
        ));
    }
    Ok(Mesh::from_triangles(&triangles))
}

fn parse_ascii_stl(data: &[u8]) -> Result<Mesh> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ReliefError::MeshLoadFailed(format!("Invalid UTF-8: {e}")))?;
    let mut triangles = Vec::new();
    let mut lines = text.lines().map(str::trim).peekable();

    // Skip "solid <name>"
    if let Some(first) = lines.peek() {
        if first.starts_with("solid") {
            lines.next();
        }
    }

    while let Some(line) = lines.next() {
        if line.starts_with("facet normal") {
            parse_ascii_vec3(line, "facet normal")?;
            // expect "outer loop"
            lines.next();
            let v0 = parse_vertex_line(lines.next())?;
            let v1 = parse_vertex_line(lines.next())?;
            let v2 = parse_vertex_line(lines.next())?;
            // expect "endloop" then "endfacet"
            lines.next();
            lines.next();
            triangles.push(Triangle { v0, v1, v2 });
        }
    }

    if triangles.is_empty() {
        return Err(ReliefError::MeshLoadFailed(
            "No triangles found in ASCII STL".into(),
        ));
    }
    Ok(Mesh::from_triangles(&triangles))
}

fn parse_ascii_vec3(line: &str, prefix: &str) -> Result<Vec3> {
    let rest = line
        .strip_prefix(prefix)
        .ok_or_else(|| ReliefError::MeshLoadFailed(format!("Expected '{prefix}', got '{line}'")))?
        .trim();
    let nums: Vec<f64> = rest
        .split_whitespace()
        .map(|s| s.parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ReliefError::MeshLoadFailed(format!("Float parse error: {e}")))?;
    if nums.len() != 3 {
        return Err(ReliefError::MeshLoadFailed(format!(
            "Expected 3 floats, got {}",
            nums.len()
        )));
    }
    Ok(Vec3::new(nums[0], nums[1], nums[2]))
}

fn parse_vertex_line(line: Option<&str>) -> Result<Vec3> {
    let line = line
        .ok_or_else(|| ReliefError::MeshLoadFailed("Unexpected end of STL data".into()))?
        .trim();
    parse_ascii_vec3(line, "vertex")
}
