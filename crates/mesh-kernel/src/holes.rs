//! Boundary loop detection and hole filling.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

use crate::Mesh;
use crate::adjacency::MeshAdjacency;
use crate::error::{MeshError, MeshResult};

/// A closed chain of boundary edges.
///
/// Vertices are ordered the way the surrounding faces traverse them, so a
/// patch closing the hole must wind the opposite way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLoop {
    pub vertices: Vec<u32>,
}

impl BoundaryLoop {
    /// Number of edges (and vertices) in the loop.
    pub fn edge_count(&self) -> usize {
        self.vertices.len()
    }
}

/// Outcome of a hole filling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoleFillSummary {
    pub filled: usize,
    /// Loops larger than the configured limit.
    pub skipped: usize,
    /// Loops that could not be triangulated.
    pub failed: usize,
    pub faces_added: usize,
}

/// Trace all boundary loops of a mesh.
///
/// Open chains (boundaries that never return to their start, which only
/// happen next to non-manifold vertices) are dropped.
pub fn detect_holes(mesh: &Mesh, adjacency: &MeshAdjacency) -> Vec<BoundaryLoop> {
    let half_edges = adjacency.boundary_half_edges(&mesh.faces);
    if half_edges.is_empty() {
        return Vec::new();
    }

    let mut outgoing: HashMap<u32, Vec<u32>> = HashMap::new();
    for &(a, b) in &half_edges {
        outgoing.entry(a).or_default().push(b);
    }

    let mut loops = Vec::new();
    for &(start, first) in &half_edges {
        let Some(targets) = outgoing.get_mut(&start) else {
            continue;
        };
        let Some(pos) = targets.iter().position(|&t| t == first) else {
            continue;
        };
        targets.swap_remove(pos);

        let mut vertices = vec![start];
        let mut current = first;
        let closed = loop {
            if current == start {
                break true;
            }
            vertices.push(current);
            match outgoing.get_mut(&current).and_then(|t| t.pop()) {
                Some(next) => current = next,
                None => break false,
            }
        };

        if closed && vertices.len() >= 3 {
            loops.push(BoundaryLoop { vertices });
        } else if !closed {
            warn!(start, "Boundary chain is not closed");
        }
    }

    debug!(
        holes = loops.len(),
        boundary_edges = half_edges.len(),
        "Traced boundary loops"
    );
    loops
}

/// Triangulate one hole by ear clipping.
///
/// Returns faces wound opposite to the loop so they join the surrounding
/// surface consistently.
pub fn fill_hole(mesh: &Mesh, boundary: &BoundaryLoop) -> MeshResult<Vec<[u32; 3]>> {
    let ring: Vec<u32> = boundary.vertices.iter().rev().copied().collect();
    let n = ring.len();
    if n < 3 {
        return Err(MeshError::hole_fill_failed(format!("loop has only {} vertices", n)));
    }

    let positions: Vec<Point3<f64>> = ring.iter().map(|&v| mesh.vertices[v as usize].position).collect();
    let normal = newell_normal(&positions).ok_or_else(|| {
        MeshError::hole_fill_failed(format!("loop of {} vertices has no area", n))
    })?;

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut faces = Vec::with_capacity(n - 2);

    while remaining.len() > 3 {
        let len = remaining.len();
        let ear = (0..len).find(|&i| {
            let prev = remaining[(i + len - 1) % len];
            let next = remaining[(i + 1) % len];
            is_ear(&positions, &remaining, prev, remaining[i], next, &normal)
        });

        match ear {
            Some(i) => {
                let prev = remaining[(i + len - 1) % len];
                let next = remaining[(i + 1) % len];
                faces.push([ring[prev], ring[remaining[i]], ring[next]]);
                remaining.remove(i);
            }
            None => {
                debug!(remaining = len, "No ear left, closing with a fan");
                let anchor = remaining[0];
                for w in remaining[1..].windows(2) {
                    faces.push([ring[anchor], ring[w[0]], ring[w[1]]]);
                }
                return Ok(faces);
            }
        }
    }

    faces.push([ring[remaining[0]], ring[remaining[1]], ring[remaining[2]]]);
    Ok(faces)
}

/// Fill every boundary loop with at most `max_edges` edges (`None` for no limit).
pub fn fill_holes(mesh: &mut Mesh, max_edges: Option<usize>) -> HoleFillSummary {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let mut summary = HoleFillSummary::default();

    for boundary in detect_holes(mesh, &adjacency) {
        if max_edges.is_some_and(|limit| boundary.edge_count() > limit) {
            summary.skipped += 1;
            continue;
        }
        match fill_hole(mesh, &boundary) {
            Ok(faces) => {
                summary.filled += 1;
                summary.faces_added += faces.len();
                mesh.faces.extend(faces);
            }
            Err(e) => {
                warn!(error = %e, "Leaving hole open");
                summary.failed += 1;
            }
        }
    }

    summary
}

fn newell_normal(positions: &[Point3<f64>]) -> Option<Vector3<f64>> {
    let mut n = Vector3::zeros();
    for (i, p) in positions.iter().enumerate() {
        let q = positions[(i + 1) % positions.len()];
        n.x += (p.y - q.y) * (p.z + q.z);
        n.y += (p.z - q.z) * (p.x + q.x);
        n.z += (p.x - q.x) * (p.y + q.y);
    }
    n.try_normalize(1e-12)
}

fn is_ear(
    positions: &[Point3<f64>],
    remaining: &[usize],
    prev: usize,
    curr: usize,
    next: usize,
    normal: &Vector3<f64>,
) -> bool {
    let a = positions[prev];
    let b = positions[curr];
    let c = positions[next];

    if (b - a).cross(&(c - b)).dot(normal) <= 0.0 {
        return false;
    }

    remaining
        .iter()
        .filter(|&&i| i != prev && i != curr && i != next)
        .all(|&i| !point_in_triangle(&positions[i], &a, &b, &c, normal))
}

fn point_in_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    normal: &Vector3<f64>,
) -> bool {
    let s1 = (b - a).cross(&(p - a)).dot(normal);
    let s2 = (c - b).cross(&(p - b)).dot(normal);
    let s3 = (a - c).cross(&(p - c)).dot(normal);
    s1 >= 0.0 && s2 >= 0.0 && s3 >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;
    use crate::validate::manifold_defects;

    /// Unit cube with the top (z = 1) face missing.
    fn open_box() -> Mesh {
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
    fn test_detect_single_square_hole() {
        let mesh = open_box();
        let holes = detect_holes(&mesh, &MeshAdjacency::build(&mesh.faces));
        assert_eq!(holes.len(), 1);
        assert_eq!(holes[0].edge_count(), 4);
    }

    #[test]
    fn test_fill_closes_box() {
        let mut mesh = open_box();
        let summary = fill_holes(&mut mesh, None);
        assert_eq!(summary.filled, 1);
        assert_eq!(summary.faces_added, 2);
        assert!(manifold_defects(&mesh).is_empty());

        // Patch normals point up, out of the box.
        for idx in 10..mesh.face_count() {
            let n = mesh.triangle(idx).and_then(|t| t.normal()).unwrap();
            assert!(n.z > 0.9);
        }
    }

    #[test]
    fn test_hole_limit_skips_large_loops() {
        let mut mesh = open_box();
        let summary = fill_holes(&mut mesh, Some(3));
        assert_eq!(summary.skipped, 1);
        assert_eq!(mesh.face_count(), 10);
    }

    #[test]
    fn test_collinear_loop_fails() {
        let mut mesh = Mesh::new();
        for x in 0..3 {
            mesh.vertices.push(Vertex::from_coords(x as f64, 0.0, 0.0));
        }
        let boundary = BoundaryLoop {
            vertices: vec![0, 1, 2],
        };
        assert!(fill_hole(&mesh, &boundary).is_err());
    }
}
