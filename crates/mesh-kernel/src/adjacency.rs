//! Edge and vertex adjacency for indexed triangle meshes.

use hashbrown::HashMap;

/// Undirected edge key with the smaller vertex index first.
pub type EdgeKey = (u32, u32);

/// Normalize an edge so the smaller index comes first.
#[inline]
pub fn edge_key(a: u32, b: u32) -> EdgeKey {
    if a < b { (a, b) } else { (b, a) }
}

/// The three directed edges of a face, in winding order.
#[inline]
pub fn face_edges(face: &[u32; 3]) -> [(u32, u32); 3] {
    [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])]
}

/// Edge adjacency for a mesh.
///
/// Answers which faces touch an edge. An edge is
/// - a boundary edge when exactly one face uses it,
/// - an interior edge when exactly two faces use it,
/// - a non-manifold edge when more than two faces use it.
#[derive(Debug, Clone, Default)]
pub struct MeshAdjacency {
    edge_to_faces: HashMap<EdgeKey, Vec<usize>>,
}

impl MeshAdjacency {
    /// Build adjacency information from a list of faces.
    ///
    /// ```
    /// use mesh_kernel::MeshAdjacency;
    ///
    /// let faces = vec![[0, 1, 2], [1, 3, 2]];
    /// let adj = MeshAdjacency::build(&faces);
    ///
    /// assert_eq!(adj.edges().count(), 5);
    /// assert_eq!(adj.faces_for_edge(2, 1), Some(&[0, 1][..]));
    /// ```
    #[must_use]
    pub fn build(faces: &[[u32; 3]]) -> Self {
        let mut edge_to_faces: HashMap<EdgeKey, Vec<usize>> =
            HashMap::with_capacity(faces.len() * 3 / 2);

        for (face_idx, face) in faces.iter().enumerate() {
            for (a, b) in face_edges(face) {
                edge_to_faces.entry(edge_key(a, b)).or_default().push(face_idx);
            }
        }

        Self { edge_to_faces }
    }

    /// Faces adjacent to an edge, or `None` if the edge does not exist.
    #[must_use]
    pub fn faces_for_edge(&self, v0: u32, v1: u32) -> Option<&[usize]> {
        self.edge_to_faces.get(&edge_key(v0, v1)).map(Vec::as_slice)
    }

    /// Iterate over every edge with its face list.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeKey, &[usize])> + '_ {
        self.edge_to_faces.iter().map(|(&e, f)| (e, f.as_slice()))
    }

    /// Directed boundary half-edges, oriented as they appear in their face.
    ///
    /// Walking these head-to-tail traces the boundary loops of the surface.
    pub fn boundary_half_edges(&self, faces: &[[u32; 3]]) -> Vec<(u32, u32)> {
        let mut half_edges = Vec::new();
        for (edge, face_list) in &self.edge_to_faces {
            if let [face_idx] = face_list.as_slice()
                && let Some(directed) = face_edges(&faces[*face_idx])
                    .into_iter()
                    .find(|&(a, b)| edge_key(a, b) == *edge)
            {
                half_edges.push(directed);
            }
        }
        half_edges.sort_unstable();
        half_edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron_faces() -> Vec<[u32; 3]> {
        vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]]
    }

    #[test]
    fn test_closed_tetrahedron() {
        let adj = MeshAdjacency::build(&tetrahedron_faces());
        assert_eq!(adj.edges().count(), 6);
        assert!(adj.edges().all(|(_, faces)| faces.len() == 2));
        assert!(adj.boundary_half_edges(&tetrahedron_faces()).is_empty());
    }

    #[test]
    fn test_open_quad_boundary() {
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        let adj = MeshAdjacency::build(&faces);
        assert_eq!(adj.faces_for_edge(2, 0), Some(&[0, 1][..]));

        let half_edges = adj.boundary_half_edges(&faces);
        assert_eq!(half_edges, vec![(0, 1), (1, 2), (2, 3), (3, 0)]);
    }

    #[test]
    fn test_fin_edge_has_three_faces() {
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let adj = MeshAdjacency::build(&faces);
        assert_eq!(adj.faces_for_edge(1, 0).map(<[usize]>::len), Some(3));
        assert!(adj.boundary_half_edges(&faces).iter().all(|&(a, b)| edge_key(a, b) != (0, 1)));
    }

    #[test]
    fn test_unknown_edge() {
        let adj = MeshAdjacency::build(&tetrahedron_faces());
        assert!(adj.faces_for_edge(7, 8).is_none());
    }
}
