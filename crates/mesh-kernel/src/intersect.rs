//! Self-intersection detection.
//!
//! Two faces self-intersect when they are not adjacent (share no vertex)
//! and their interiors overlap. Candidate pairs come from a sweep over face
//! bounding boxes sorted along X; each candidate is confirmed with a
//! separating-axis test. The sweep runs in parallel with rayon.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

use crate::types::{Mesh, Triangle};

/// Result of self-intersection detection.
#[derive(Debug, Clone, Default)]
pub struct SelfIntersectionResult {
    /// Number of intersecting face pairs found.
    pub intersection_count: usize,
    /// Intersecting face pairs as (lower, higher) face index, sorted.
    /// Limited to `max_reported` pairs.
    pub intersecting_pairs: Vec<(u32, u32)>,
    /// Total faces checked.
    pub faces_checked: usize,
    /// Whether the search stopped early after reaching `max_reported`.
    pub truncated: bool,
}

impl SelfIntersectionResult {
    /// True if no intersecting pair was found.
    pub fn is_clean(&self) -> bool {
        self.intersection_count == 0
    }
}

impl std::fmt::Display for SelfIntersectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            write!(f, "No self-intersections detected")
        } else {
            write!(
                f,
                "Self-intersections found: {} pair(s){}",
                self.intersection_count,
                if self.truncated { " (truncated)" } else { "" }
            )
        }
    }
}

/// Parameters for self-intersection detection.
#[derive(Debug, Clone)]
pub struct IntersectionParams {
    /// Stop after this many pairs. 0 means report every pair.
    ///
    /// Default: 100
    pub max_reported: usize,
    /// Overlap below this distance counts as touching, not intersecting.
    ///
    /// Default: 1e-9
    pub epsilon: f64,
}

impl Default for IntersectionParams {
    fn default() -> Self {
        Self {
            max_reported: 100,
            epsilon: 1e-9,
        }
    }
}

impl IntersectionParams {
    /// Params that stop at the first intersecting pair.
    ///
    /// Enough to classify a part as self-intersecting or not.
    pub fn first_hit() -> Self {
        Self {
            max_reported: 1,
            ..Self::default()
        }
    }
}

/// Detect self-intersecting face pairs.
///
/// # Example
/// ```
/// use mesh_kernel::{Mesh, Vertex};
/// use mesh_kernel::intersect::{detect_self_intersections, IntersectionParams};
///
/// let mut mesh = Mesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// let result = detect_self_intersections(&mesh, &IntersectionParams::default());
/// assert!(result.is_clean());
/// ```
pub fn detect_self_intersections(
    mesh: &Mesh,
    params: &IntersectionParams,
) -> SelfIntersectionResult {
    let face_count = mesh.faces.len();
    if face_count < 2 {
        return SelfIntersectionResult {
            faces_checked: face_count,
            ..Default::default()
        };
    }

    let triangles: Vec<Triangle> = mesh.triangles().collect();
    let boxes: Vec<(Point3<f64>, Point3<f64>)> = triangles
        .iter()
        .map(|t| {
            let (min, max) = t.aabb();
            let pad = Vector3::repeat(params.epsilon);
            (min - pad, max + pad)
        })
        .collect();

    let mut order: Vec<usize> = (0..face_count).collect();
    order.sort_unstable_by(|&a, &b| boxes[a].0.x.total_cmp(&boxes[b].0.x));

    let max_pairs = if params.max_reported == 0 {
        usize::MAX
    } else {
        params.max_reported
    };
    let found = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);

    let mut pairs: Vec<(u32, u32)> = (0..face_count)
        .into_par_iter()
        .flat_map_iter(|slot| {
            let mut local = Vec::new();
            let i = order[slot];
            let (min_i, max_i) = boxes[i];

            for &j in &order[slot + 1..] {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let (min_j, max_j) = boxes[j];
                if min_j.x > max_i.x {
                    break;
                }
                if min_j.y > max_i.y
                    || max_j.y < min_i.y
                    || min_j.z > max_i.z
                    || max_j.z < min_i.z
                {
                    continue;
                }
                if shares_vertex(&mesh.faces[i], &mesh.faces[j]) {
                    continue;
                }
                if triangles_intersect(&triangles[i], &triangles[j], params.epsilon) {
                    let count = found.fetch_add(1, Ordering::Relaxed);
                    if count < max_pairs {
                        local.push(if i < j {
                            (i as u32, j as u32)
                        } else {
                            (j as u32, i as u32)
                        });
                    }
                    if count + 1 >= max_pairs {
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
            local
        })
        .collect();

    pairs.sort_unstable();
    pairs.truncate(max_pairs);

    let intersection_count = found.load(Ordering::Relaxed);
    let truncated = params.max_reported > 0 && intersection_count >= max_pairs;

    debug!(
        faces = face_count,
        pairs = intersection_count,
        truncated,
        "Self-intersection sweep finished"
    );

    SelfIntersectionResult {
        intersection_count,
        intersecting_pairs: pairs,
        faces_checked: face_count,
        truncated,
    }
}

#[inline]
fn shares_vertex(a: &[u32; 3], b: &[u32; 3]) -> bool {
    a.iter().any(|v| b.contains(v))
}

/// Separating-axis test for two triangles.
///
/// Triangles that only touch (overlap within `epsilon`) do not count.
pub fn triangles_intersect(t1: &Triangle, t2: &Triangle, epsilon: f64) -> bool {
    let (Some(n1), Some(n2)) = (t1.normal(), t2.normal()) else {
        return false;
    };
    let p1 = t1.points();
    let p2 = t2.points();
    let edges1 = [p1[1] - p1[0], p1[2] - p1[1], p1[0] - p1[2]];
    let edges2 = [p2[1] - p2[0], p2[2] - p2[1], p2[0] - p2[2]];

    if n1.cross(&n2).norm_squared() < 1e-12 {
        if n1.dot(&(p2[0] - p1[0])).abs() > epsilon {
            return false;
        }
        // Coplanar: only the in-plane edge normals can separate.
        return !edges1
            .iter()
            .chain(edges2.iter())
            .filter_map(|e| n1.cross(e).try_normalize(f64::EPSILON))
            .any(|axis| separated_on(&axis, &p1, &p2, epsilon));
    }

    if separated_on(&n1, &p1, &p2, epsilon) || separated_on(&n2, &p1, &p2, epsilon) {
        return false;
    }

    for e1 in &edges1 {
        for e2 in &edges2 {
            if let Some(axis) = e1.cross(e2).try_normalize(1e-12)
                && separated_on(&axis, &p1, &p2, epsilon)
            {
                return false;
            }
        }
    }
    true
}

fn separated_on(axis: &Vector3<f64>, a: &[Point3<f64>; 3], b: &[Point3<f64>; 3], eps: f64) -> bool {
    let (a_min, a_max) = project(axis, a);
    let (b_min, b_max) = project(axis, b);
    a_max <= b_min + eps || b_max <= a_min + eps
}

fn project(axis: &Vector3<f64>, pts: &[Point3<f64>; 3]) -> (f64, f64) {
    pts.iter()
        .map(|p| axis.dot(&p.coords))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    fn tri(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> Triangle {
        Triangle::new(
            Point3::new(a[0], a[1], a[2]),
            Point3::new(b[0], b[1], b[2]),
            Point3::new(c[0], c[1], c[2]),
        )
    }

    #[test]
    fn test_crossing_triangles_intersect() {
        let a = tri([0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]);
        let b = tri([0.5, 0.5, -1.0], [0.5, 0.5, 1.0], [1.5, -0.5, 0.0]);
        assert!(triangles_intersect(&a, &b, 1e-9));
    }

    #[test]
    fn test_parallel_triangles_do_not_intersect() {
        let a = tri([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let b = tri([0.0, 0.0, 0.5], [1.0, 0.0, 0.5], [0.0, 1.0, 0.5]);
        assert!(!triangles_intersect(&a, &b, 1e-9));
    }

    #[test]
    fn test_coplanar_overlap_intersects() {
        let a = tri([0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]);
        let b = tri([0.5, 0.5, 0.0], [2.5, 0.5, 0.0], [0.5, 2.5, 0.0]);
        assert!(triangles_intersect(&a, &b, 1e-9));

        let far = tri([5.0, 5.0, 0.0], [6.0, 5.0, 0.0], [5.0, 6.0, 0.0]);
        assert!(!triangles_intersect(&a, &far, 1e-9));
    }

    #[test]
    fn test_mesh_with_piercing_face() {
        let mut mesh = Mesh::new();
        for p in [
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.5, 0.5, -1.0],
            [0.5, 0.5, 1.0],
            [1.5, -0.5, 0.0],
        ] {
            mesh.vertices.push(Vertex::from_coords(p[0], p[1], p[2]));
        }
        mesh.faces = vec![[0, 1, 2], [3, 4, 5]];

        let result = detect_self_intersections(&mesh, &IntersectionParams::default());
        assert_eq!(result.intersection_count, 1);
        assert_eq!(result.intersecting_pairs, vec![(0, 1)]);
        assert!(!result.truncated);
    }

    #[test]
    fn test_adjacent_faces_are_skipped() {
        let mut mesh = Mesh::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]] {
            mesh.vertices.push(Vertex::from_coords(p[0], p[1], p[2]));
        }
        mesh.faces = vec![[0, 1, 2], [1, 3, 2]];
        let result = detect_self_intersections(&mesh, &IntersectionParams::default());
        assert!(result.is_clean());
        assert_eq!(result.faces_checked, 2);
    }
}
