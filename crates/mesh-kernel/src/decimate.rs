//! Mesh decimation using edge collapse with quadric error metrics.
//!
//! Each vertex accumulates the planes of its incident faces as a quadric;
//! collapsing an edge merges the two quadrics and places the surviving
//! vertex where the combined error is smallest. Edges are processed
//! cheapest first from a lazily invalidated priority queue.
//!
//! A collapse is rejected when it would
//! - touch an edge shared by more than two faces,
//! - violate the link condition (the two endpoints may only share the
//!   neighbors opposite the edge),
//! - create a face that duplicates an existing one,
//! - flip the orientation of a surrounding face.
//!
//! These checks keep a closed manifold closed and manifold.

use nalgebra::{Matrix3, Point3, Vector3};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

use crate::adjacency::edge_key;
use crate::tracing_ext::OperationTimer;
use crate::{Mesh, Vertex};

/// Parameters for mesh decimation.
#[derive(Debug, Clone)]
pub struct DecimateParams {
    /// Target number of triangles. If None, uses `target_ratio` instead.
    pub target_triangles: Option<usize>,
    /// Ratio of triangles to keep, in (0, 1]. Default: 0.5
    pub target_ratio: f64,
    /// Never move or remove boundary vertices. Default: false
    pub preserve_boundary: bool,
    /// Weight of the constraint planes that hold boundary edges in place
    /// when `preserve_boundary` is false. Default: 10.0
    pub boundary_penalty: f64,
    /// Stop once the cheapest collapse costs more than this. Default: None
    pub max_error: Option<f64>,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            target_triangles: None,
            target_ratio: 0.5,
            preserve_boundary: false,
            boundary_penalty: 10.0,
            max_error: None,
        }
    }
}

impl DecimateParams {
    /// Create params targeting a specific triangle count.
    pub fn with_target_triangles(count: usize) -> Self {
        Self {
            target_triangles: Some(count),
            ..Default::default()
        }
    }

    /// Create params targeting a ratio of the current triangle count.
    pub fn with_target_ratio(ratio: f64) -> Self {
        Self {
            target_ratio: ratio.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    fn target_for(&self, original: usize) -> usize {
        match self.target_triangles {
            Some(count) => count.min(original),
            None => ((original as f64) * self.target_ratio.clamp(0.0, 1.0)).round() as usize,
        }
    }
}

/// Result of mesh decimation.
#[derive(Debug, Clone)]
pub struct DecimateResult {
    /// The decimated mesh (the best reachable one if the target was missed).
    pub mesh: Mesh,
    /// Number of triangles in the input mesh.
    pub original_triangles: usize,
    /// Number of triangles requested.
    pub target_triangles: usize,
    /// Number of triangles in the decimated mesh.
    pub final_triangles: usize,
    /// Number of edge collapses performed.
    pub collapses_performed: usize,
    /// Number of candidate collapses rejected by the topology checks.
    pub collapses_rejected: usize,
}

impl DecimateResult {
    /// True if the mesh was reduced to the requested triangle count.
    pub fn reached_target(&self) -> bool {
        self.final_triangles <= self.target_triangles
    }

    /// Final triangle count relative to the input.
    pub fn achieved_ratio(&self) -> f64 {
        if self.original_triangles == 0 {
            1.0
        } else {
            self.final_triangles as f64 / self.original_triangles as f64
        }
    }
}

impl std::fmt::Display for DecimateResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} triangles (target {}, {} collapses, {} rejected)",
            self.original_triangles,
            self.final_triangles,
            self.target_triangles,
            self.collapses_performed,
            self.collapses_rejected
        )
    }
}

/// Symmetric quadric `Q(p) = pᵀAp + 2bᵀp + c`.
#[derive(Debug, Clone, Copy)]
struct Quadric {
    a: Matrix3<f64>,
    b: Vector3<f64>,
    c: f64,
}

impl Quadric {
    fn zero() -> Self {
        Self {
            a: Matrix3::zeros(),
            b: Vector3::zeros(),
            c: 0.0,
        }
    }

    /// Squared distance to the plane `n·p + d = 0`, scaled by `weight`.
    fn from_plane(n: &Vector3<f64>, d: f64, weight: f64) -> Self {
        Self {
            a: n * n.transpose() * weight,
            b: n * (d * weight),
            c: d * d * weight,
        }
    }

    fn add(&mut self, other: &Quadric) {
        self.a += other.a;
        self.b += other.b;
        self.c += other.c;
    }

    fn sum(&self, other: &Quadric) -> Quadric {
        let mut q = *self;
        q.add(other);
        q
    }

    fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let v = p.coords;
        (v.dot(&(self.a * v)) + 2.0 * self.b.dot(&v) + self.c).max(0.0)
    }

    fn optimal_point(&self) -> Option<Point3<f64>> {
        if self.a.determinant().abs() < 1e-12 {
            return None;
        }
        self.a.try_inverse().map(|inv| Point3::from(-(inv * self.b)))
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    u: u32,
    v: u32,
    stamp_u: u32,
    stamp_v: u32,
    target: Point3<f64>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed so BinaryHeap pops the cheapest candidate; ties break on
    // vertex ids and stamps so the order never depends on insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.u.cmp(&self.u))
            .then_with(|| other.v.cmp(&self.v))
            .then_with(|| other.stamp_u.cmp(&self.stamp_u))
            .then_with(|| other.stamp_v.cmp(&self.stamp_v))
    }
}

/// Working state for one decimation run.
struct Collapser<'a> {
    params: &'a DecimateParams,
    positions: Vec<Point3<f64>>,
    quadrics: Vec<Quadric>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<u32>>,
    stamps: Vec<u32>,
    live_faces: usize,
}

impl<'a> Collapser<'a> {
    fn new(mesh: &Mesh, params: &'a DecimateParams) -> Self {
        let vertex_count = mesh.vertices.len();
        let mut vertex_faces = vec![Vec::new(); vertex_count];
        for (fi, face) in mesh.faces.iter().enumerate() {
            for (slot, &v) in face.iter().enumerate() {
                // Degenerate faces list a repeated vertex only once.
                if !face[..slot].contains(&v) {
                    vertex_faces[v as usize].push(fi as u32);
                }
            }
        }

        let mut state = Self {
            params,
            positions: mesh.vertices.iter().map(|v| v.position).collect(),
            quadrics: vec![Quadric::zero(); vertex_count],
            faces: mesh.faces.clone(),
            face_alive: vec![true; mesh.faces.len()],
            vertex_faces,
            stamps: vec![0; vertex_count],
            live_faces: mesh.faces.len(),
        };
        state.init_quadrics();
        state
    }

    fn init_quadrics(&mut self) {
        for face in &self.faces {
            let [p0, p1, p2] = face.map(|v| self.positions[v as usize]);
            let cross = (p1 - p0).cross(&(p2 - p0));
            let area = cross.norm() * 0.5;
            let Some(n) = cross.try_normalize(f64::EPSILON) else {
                continue;
            };
            let q = Quadric::from_plane(&n, -n.dot(&p0.coords), area);
            for &v in face {
                self.quadrics[v as usize].add(&q);
            }
        }

        if self.params.preserve_boundary || self.params.boundary_penalty <= 0.0 {
            return;
        }

        // Planes perpendicular to each boundary face through its open edge.
        for fi in 0..self.faces.len() {
            let face = self.faces[fi];
            let [p0, p1, p2] = face.map(|v| self.positions[v as usize]);
            let Some(n) = (p1 - p0).cross(&(p2 - p0)).try_normalize(f64::EPSILON) else {
                continue;
            };
            for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                if self.edge_faces(a, b).len() != 1 {
                    continue;
                }
                let pa = self.positions[a as usize];
                let edge = self.positions[b as usize] - pa;
                let Some(side) = edge.cross(&n).try_normalize(f64::EPSILON) else {
                    continue;
                };
                let weight = self.params.boundary_penalty * edge.norm_squared();
                let q = Quadric::from_plane(&side, -side.dot(&pa.coords), weight);
                self.quadrics[a as usize].add(&q);
                self.quadrics[b as usize].add(&q);
            }
        }
    }

    fn live_faces_of(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .copied()
            .filter(|&f| self.face_alive[f as usize])
    }

    fn edge_faces(&self, a: u32, b: u32) -> Vec<u32> {
        self.live_faces_of(a)
            .filter(|&f| self.faces[f as usize].contains(&b))
            .collect()
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .live_faces_of(v)
            .flat_map(|f| self.faces[f as usize])
            .filter(|&w| w != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn is_boundary_vertex(&self, v: u32) -> bool {
        self.neighbors(v)
            .into_iter()
            .any(|w| self.edge_faces(v, w).len() == 1)
    }

    fn candidate(&self, a: u32, b: u32) -> Candidate {
        let (u, v) = edge_key(a, b);
        let q = self.quadrics[u as usize].sum(&self.quadrics[v as usize]);
        let pu = self.positions[u as usize];
        let pv = self.positions[v as usize];
        let mid = Point3::from((pu.coords + pv.coords) * 0.5);

        let reach = (pv - pu).norm() * 2.0;
        let optimal = q
            .optimal_point()
            .filter(|p| (p - mid).norm() <= reach);

        let (target, cost) = optimal
            .into_iter()
            .chain([pu, pv, mid])
            .map(|p| (p, q.evaluate(&p)))
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .unwrap_or((mid, 0.0));

        Candidate {
            cost,
            u,
            v,
            stamp_u: self.stamps[u as usize],
            stamp_v: self.stamps[v as usize],
            target,
        }
    }

    fn is_collapse_valid(&self, c: &Candidate) -> bool {
        let (u, v) = (c.u, c.v);
        let shared = self.edge_faces(u, v);
        if shared.is_empty() || shared.len() > 2 {
            return false;
        }

        if self.params.preserve_boundary && (self.is_boundary_vertex(u) || self.is_boundary_vertex(v))
        {
            return false;
        }
        // An interior edge joining two boundary vertices would pinch the surface.
        if shared.len() == 2 && self.is_boundary_vertex(u) && self.is_boundary_vertex(v) {
            return false;
        }

        // Link condition: common neighbors are exactly the opposite vertices.
        let nu = self.neighbors(u);
        let nv = self.neighbors(v);
        let common = nu.iter().filter(|w| nv.binary_search(w).is_ok()).count();
        if common != shared.len() {
            return false;
        }

        // Faces around v that survive become [u, x, y]; none may duplicate a
        // face u already has.
        for f in self.live_faces_of(v) {
            if shared.contains(&f) {
                continue;
            }
            let mut moved = self.faces[f as usize].map(|w| if w == v { u } else { w });
            moved.sort_unstable();
            let duplicate = self.live_faces_of(u).any(|g| {
                let mut existing = self.faces[g as usize];
                existing.sort_unstable();
                existing == moved
            });
            if duplicate {
                return false;
            }
        }

        // Orientation must survive for every face that is not removed.
        for f in self.live_faces_of(u).chain(self.live_faces_of(v)) {
            if shared.contains(&f) {
                continue;
            }
            let face = self.faces[f as usize];
            let before = face.map(|w| self.positions[w as usize]);
            let after = face.map(|w| {
                if w == u || w == v {
                    c.target
                } else {
                    self.positions[w as usize]
                }
            });
            let n_before = (before[1] - before[0]).cross(&(before[2] - before[0]));
            let n_after = (after[1] - after[0]).cross(&(after[2] - after[0]));
            if n_after.norm_squared() <= f64::EPSILON * n_before.norm_squared()
                || n_before.dot(&n_after) <= 0.0
            {
                return false;
            }
        }

        true
    }

    fn collapse(&mut self, c: &Candidate) {
        let (u, v) = (c.u, c.v);
        for f in self.edge_faces(u, v) {
            self.face_alive[f as usize] = false;
            self.live_faces -= 1;
        }

        let moved: Vec<u32> = self.live_faces_of(v).collect();
        for f in moved {
            for w in self.faces[f as usize].iter_mut() {
                if *w == v {
                    *w = u;
                }
            }
            self.vertex_faces[u as usize].push(f);
        }
        self.vertex_faces[v as usize].clear();

        let alive = &self.face_alive;
        self.vertex_faces[u as usize].retain(|&f| alive[f as usize]);

        self.positions[u as usize] = c.target;
        let qv = self.quadrics[v as usize];
        self.quadrics[u as usize].add(&qv);
        self.stamps[u as usize] += 1;
        self.stamps[v as usize] += 1;
    }

    fn run(&mut self, target: usize) -> (usize, usize) {
        let mut edges: Vec<(u32, u32)> = self
            .faces
            .iter()
            .flat_map(|f| [edge_key(f[0], f[1]), edge_key(f[1], f[2]), edge_key(f[2], f[0])])
            .filter(|(a, b)| a != b)
            .collect();
        edges.sort_unstable();
        edges.dedup();

        let mut heap: BinaryHeap<Candidate> =
            edges.into_iter().map(|(a, b)| self.candidate(a, b)).collect();

        let mut performed = 0;
        let mut rejected = 0;

        while self.live_faces > target {
            let Some(c) = heap.pop() else {
                break;
            };
            if c.stamp_u != self.stamps[c.u as usize] || c.stamp_v != self.stamps[c.v as usize] {
                continue;
            }
            if self.params.max_error.is_some_and(|limit| c.cost > limit) {
                break;
            }
            if !self.is_collapse_valid(&c) {
                rejected += 1;
                continue;
            }

            self.collapse(&c);
            performed += 1;

            for w in self.neighbors(c.u) {
                heap.push(self.candidate(c.u, w));
            }
        }

        (performed, rejected)
    }

    fn into_mesh(self) -> Mesh {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut mesh = Mesh::with_capacity(self.positions.len(), self.live_faces);

        for (face, _) in self
            .faces
            .iter()
            .zip(&self.face_alive)
            .filter(|(_, alive)| **alive)
        {
            let mapped = face.map(|v| {
                let slot = &mut remap[v as usize];
                if *slot == u32::MAX {
                    *slot = mesh.vertices.len() as u32;
                    mesh.vertices.push(Vertex::new(self.positions[v as usize]));
                }
                *slot
            });
            mesh.faces.push(mapped);
        }
        mesh
    }
}

/// Decimate a mesh with quadric error edge collapse.
///
/// A ratio of 1.0 (or a target at or above the current count) returns the
/// mesh unchanged. When the checks leave no valid collapse before the
/// target is met, the result carries the reduced mesh and
/// [`DecimateResult::reached_target`] is false.
pub fn decimate_mesh(mesh: &Mesh, params: &DecimateParams) -> DecimateResult {
    let original = mesh.face_count();
    let target = params.target_for(original);

    if original == 0 || target >= original {
        return DecimateResult {
            mesh: mesh.clone(),
            original_triangles: original,
            target_triangles: target,
            final_triangles: original,
            collapses_performed: 0,
            collapses_rejected: 0,
        };
    }

    let _timer = OperationTimer::with_context("decimate", original, mesh.vertex_count());

    let mut collapser = Collapser::new(mesh, params);
    let (performed, rejected) = collapser.run(target);
    let result_mesh = collapser.into_mesh();

    let result = DecimateResult {
        final_triangles: result_mesh.face_count(),
        mesh: result_mesh,
        original_triangles: original,
        target_triangles: target,
        collapses_performed: performed,
        collapses_rejected: rejected,
    };
    debug!(%result, "Decimation finished");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{manifold_defects, validate_mesh_data};
    use std::f64::consts::PI;

    fn uv_sphere(segments: u32, rings: u32) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
        for r in 1..rings {
            let theta = PI * r as f64 / rings as f64;
            for s in 0..segments {
                let phi = 2.0 * PI * s as f64 / segments as f64;
                mesh.vertices.push(Vertex::from_coords(
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ));
            }
        }
        let south = mesh.vertices.len() as u32;
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, -1.0));

        let ring = |r: u32, s: u32| 1 + (r - 1) * segments + (s % segments);
        for s in 0..segments {
            mesh.faces.push([0, ring(1, s), ring(1, s + 1)]);
            mesh.faces.push([south, ring(rings - 1, s + 1), ring(rings - 1, s)]);
        }
        for r in 1..rings - 1 {
            for s in 0..segments {
                let (a, b) = (ring(r, s), ring(r, s + 1));
                let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
                mesh.faces.push([a, c, d]);
                mesh.faces.push([a, d, b]);
            }
        }
        mesh
    }

    fn tetrahedron() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 0.5, 1.0));
        mesh.faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        mesh
    }

    #[test]
    fn test_sphere_fixture_is_closed() {
        let sphere = uv_sphere(24, 12);
        assert_eq!(sphere.face_count(), 2 * 24 * 11);
        assert!(manifold_defects(&sphere).is_empty());
    }

    #[test]
    fn test_decimate_sphere_to_half() {
        let sphere = uv_sphere(24, 12);
        let result = decimate_mesh(&sphere, &DecimateParams::with_target_ratio(0.5));

        assert!(result.reached_target(), "{}", result);
        assert!(result.final_triangles <= 264);
        assert!(result.final_triangles >= 262);
        assert!(manifold_defects(&result.mesh).is_empty());
        validate_mesh_data(&result.mesh).unwrap();
    }

    #[test]
    fn test_ratio_one_is_identity() {
        let sphere = uv_sphere(12, 6);
        let result = decimate_mesh(&sphere, &DecimateParams::with_target_ratio(1.0));
        assert_eq!(result.mesh, sphere);
        assert_eq!(result.collapses_performed, 0);
        assert!(result.reached_target());
    }

    #[test]
    fn test_tetrahedron_cannot_shrink() {
        let result = decimate_mesh(&tetrahedron(), &DecimateParams::with_target_ratio(0.5));
        assert!(!result.reached_target());
        assert_eq!(result.final_triangles, 4);
        assert!(manifold_defects(&result.mesh).is_empty());
    }

    #[test]
    fn test_decimate_to_target_count() {
        let sphere = uv_sphere(16, 8);
        let result = decimate_mesh(&sphere, &DecimateParams::with_target_triangles(100));
        assert!(result.final_triangles <= 100);
        assert_eq!(result.target_triangles, 100);
    }

    #[test]
    fn test_preserve_boundary_keeps_open_rim() {
        // Hemisphere: drop the southern half of the faces.
        let mut mesh = uv_sphere(16, 8);
        let heights: Vec<f64> = mesh.vertices.iter().map(|v| v.position.z).collect();
        mesh.faces
            .retain(|f| f.iter().all(|&v| heights[v as usize] >= -1e-9));
        let boundary_before = manifold_defects(&mesh).len();
        assert!(boundary_before > 0);

        let params = DecimateParams {
            preserve_boundary: true,
            ..DecimateParams::with_target_ratio(0.5)
        };
        let result = decimate_mesh(&mesh, &params);
        assert_eq!(manifold_defects(&result.mesh).len(), boundary_before);
    }

    #[test]
    fn test_quadric_optimal_point() {
        let mut q = Quadric::zero();
        q.add(&Quadric::from_plane(&Vector3::x(), -1.0, 1.0));
        q.add(&Quadric::from_plane(&Vector3::y(), -2.0, 1.0));
        q.add(&Quadric::from_plane(&Vector3::z(), -3.0, 1.0));
        let p = q.optimal_point().unwrap();
        assert!((p - Point3::new(1.0, 2.0, 3.0)).norm() < 1e-9);
        assert!(q.evaluate(&p) < 1e-12);
    }
}
