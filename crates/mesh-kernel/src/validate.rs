//! Mesh validation and manifold classification.

use tracing::warn;

use crate::Mesh;
use crate::adjacency::{EdgeKey, MeshAdjacency};
use crate::error::{MeshError, MeshResult};

/// An edge that does not border exactly two faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EdgeDefect {
    pub edge: EdgeKey,
    /// Number of faces using the edge: 1 for a boundary, >2 for a fin.
    pub face_count: usize,
}

impl EdgeDefect {
    /// True for an open boundary edge.
    pub fn is_boundary(&self) -> bool {
        self.face_count == 1
    }
}

/// Classify every edge of a closed-surface mesh.
///
/// Returns the edges that do not border exactly two faces, sorted by edge
/// key. Faces with a repeated vertex index are treated as defects too:
/// their collapsed edge is reported with the face count it carries.
pub fn manifold_defects(mesh: &Mesh) -> Vec<EdgeDefect> {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let mut defects: Vec<EdgeDefect> = adjacency
        .edges()
        .filter(|&((a, b), faces)| faces.len() != 2 || a == b)
        .map(|(edge, faces)| EdgeDefect {
            edge,
            face_count: faces.len(),
        })
        .collect();
    defects.sort_unstable();
    defects
}

/// Check face indices and coordinates, failing on the first problem found.
pub fn validate_mesh_data(mesh: &Mesh) -> MeshResult<()> {
    let vertex_count = mesh.vertices.len();

    for (face_index, face) in mesh.faces.iter().enumerate() {
        if let Some(&bad) = face.iter().find(|&&v| v as usize >= vertex_count) {
            warn!(face_index, vertex_index = bad, "Face references missing vertex");
            return Err(MeshError::invalid_vertex_index(face_index, bad, vertex_count));
        }
    }

    for (vertex_index, vertex) in mesh.vertices.iter().enumerate() {
        let p = &vertex.position;
        for (coordinate, value) in [("x", p.x), ("y", p.y), ("z", p.z)] {
            if !value.is_finite() {
                return Err(MeshError::invalid_coordinate(vertex_index, coordinate, value));
            }
        }
    }

    Ok(())
}
