//! Sharp edge splitting.
//!
//! Splitting gives the faces on either side of a sharp edge their own copies
//! of the edge's vertices, so per-vertex normals no longer smooth across it.
//! The surface becomes open along every split edge.

use tracing::debug;

use crate::Mesh;
use crate::adjacency::MeshAdjacency;

/// Split every edge whose dihedral angle exceeds `angle_radians`.
///
/// Only edges shared by exactly two faces are considered. Returns the number
/// of edges that were split. Vertex normals are recomputed when anything was
/// split.
pub fn split_sharp_edges(mesh: &mut Mesh, angle_radians: f64) -> usize {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let normals: Vec<_> = (0..mesh.face_count())
        .map(|i| mesh.triangle(i).and_then(|t| t.normal()))
        .collect();
    let cos_limit = angle_radians.cos();

    // Face corners (face * 3 + slot) joined across smooth edges.
    let mut corners = UnionFind::new(mesh.faces.len() * 3);
    let mut sharp = 0;

    let mut edges: Vec<_> = adjacency.edges().collect();
    edges.sort_unstable_by_key(|(edge, _)| *edge);

    for ((a, b), faces) in edges {
        let [f, g] = faces[..] else {
            continue;
        };
        let smooth = match (normals[f], normals[g]) {
            (Some(nf), Some(ng)) => nf.dot(&ng) >= cos_limit,
            _ => true,
        };
        if !smooth {
            sharp += 1;
            continue;
        }
        for v in [a, b] {
            if let (Some(cf), Some(cg)) = (corner_of(mesh, f, v), corner_of(mesh, g, v)) {
                corners.union(cf, cg);
            }
        }
    }

    if sharp == 0 {
        return 0;
    }

    // The first group seen at each vertex keeps the original index.
    let mut owner: Vec<Option<usize>> = vec![None; mesh.vertices.len()];
    let mut assigned: hashbrown::HashMap<usize, u32> = hashbrown::HashMap::new();
    for fi in 0..mesh.faces.len() {
        for slot in 0..3 {
            let v = mesh.faces[fi][slot] as usize;
            let root = corners.find(fi * 3 + slot);
            let index = match assigned.get(&root) {
                Some(&index) => index,
                None => {
                    let index = match owner[v] {
                        None => {
                            owner[v] = Some(root);
                            v as u32
                        }
                        Some(_) => {
                            mesh.vertices.push(mesh.vertices[v].clone());
                            (mesh.vertices.len() - 1) as u32
                        }
                    };
                    assigned.insert(root, index);
                    index
                }
            };
            mesh.faces[fi][slot] = index;
        }
    }

    mesh.compute_vertex_normals();
    debug!(sharp_edges = sharp, vertices = mesh.vertex_count(), "Split sharp edges");
    sharp
}

fn corner_of(mesh: &Mesh, face: usize, vertex: u32) -> Option<usize> {
    mesh.faces[face]
        .iter()
        .position(|&v| v == vertex)
        .map(|slot| face * 3 + slot)
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;
    use crate::validate::manifold_defects;

    fn cube() -> Mesh {
        let mut mesh = Mesh::new();
        for p in [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ] {
            mesh.vertices.push(Vertex::from_coords(p[0], p[1], p[2]));
        }
        mesh.faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        mesh
    }

    #[test]
    fn test_cube_splits_every_crease() {
        let mut mesh = cube();
        let split = split_sharp_edges(&mut mesh, 30f64.to_radians());
        assert_eq!(split, 12);
        // Each corner now has one vertex per adjoining side.
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.face_count(), 12);
        assert!(mesh.vertices.iter().all(|v| v.normal.is_some()));
    }

    #[test]
    fn test_flat_threshold_leaves_mesh_alone() {
        let mut mesh = cube();
        let split = split_sharp_edges(&mut mesh, 100f64.to_radians());
        assert_eq!(split, 0);
        assert_eq!(mesh, cube());
        assert!(manifold_defects(&mesh).is_empty());
    }
}
