//! Vertex welding, face clean-up and the combined repair pass.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::Mesh;
use crate::adjacency::{MeshAdjacency, face_edges};
use crate::holes::{HoleFillSummary, fill_holes};

/// Which defect classes a repair pass attempts to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairMode {
    /// Merge coincident vertices and drop the interior faces this exposes.
    /// Leaves intentional openings alone.
    WeldOnly,
    /// Everything `WeldOnly` does, then close boundary loops.
    FillHolesAndWeld,
}

/// Parameters for a repair pass.
#[derive(Debug, Clone)]
pub struct RepairParams {
    pub mode: RepairMode,

    /// Vertices closer than this are merged.
    ///
    /// Default: 1e-4
    pub weld_distance: f64,

    /// Largest boundary loop (in edges) that hole filling will close.
    /// `None` closes every loop.
    ///
    /// Default: None
    pub max_hole_edges: Option<usize>,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self {
            mode: RepairMode::WeldOnly,
            weld_distance: 1e-4,
            max_hole_edges: None,
        }
    }
}

impl RepairParams {
    /// Full repair for meshes that should be closed solids.
    pub fn for_closed_solids() -> Self {
        Self {
            mode: RepairMode::FillHolesAndWeld,
            ..Self::default()
        }
    }

    /// Weld-only repair for meshes with intentional openings.
    pub fn weld_only() -> Self {
        Self::default()
    }
}

/// What a repair pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub vertices_welded: usize,
    pub degenerate_faces_removed: usize,
    pub duplicate_faces_removed: usize,
    pub interior_faces_removed: usize,
    pub holes: HoleFillSummary,
    pub unreferenced_vertices_removed: usize,
}

impl RepairSummary {
    /// True if the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

impl std::fmt::Display for RepairSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "welded {} vertices, removed {} degenerate / {} duplicate / {} interior faces, filled {} holes ({} skipped, {} failed)",
            self.vertices_welded,
            self.degenerate_faces_removed,
            self.duplicate_faces_removed,
            self.interior_faces_removed,
            self.holes.filled,
            self.holes.skipped,
            self.holes.failed
        )
    }
}

/// Run a repair pass on a mesh in place.
pub fn repair_mesh(mesh: &mut Mesh, params: &RepairParams) -> RepairSummary {
    let mut summary = RepairSummary::default();

    let faces_before = mesh.face_count();
    summary.vertices_welded = weld_vertices(mesh, params.weld_distance);
    summary.degenerate_faces_removed = faces_before - mesh.face_count();
    summary.degenerate_faces_removed += remove_degenerate_faces(mesh);
    summary.duplicate_faces_removed = remove_duplicate_faces(mesh);
    summary.interior_faces_removed = remove_interior_faces(mesh);

    if params.mode == RepairMode::FillHolesAndWeld {
        summary.holes = fill_holes(mesh, params.max_hole_edges);
    }

    summary.unreferenced_vertices_removed = remove_unreferenced_vertices(mesh);

    info!(mode = ?params.mode, "Repair pass: {}", summary);
    summary
}

/// Merge vertices closer than `epsilon` using a spatial hash.
///
/// Faces that collapse to a line or point are removed. Returns the number
/// of vertices merged away (they stay in the vertex array, unreferenced).
pub fn weld_vertices(mesh: &mut Mesh, epsilon: f64) -> usize {
    if mesh.vertices.is_empty() || epsilon <= 0.0 {
        return 0;
    }

    let cell_size = epsilon * 2.0;
    let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        grid.entry(cell_of(&vertex.position, cell_size))
            .or_default()
            .push(idx as u32);
    }

    let mut remap: Vec<u32> = (0..mesh.vertices.len() as u32).collect();
    let mut merged = 0;

    for (idx, vertex) in mesh.vertices.iter().enumerate() {
        let idx = idx as u32;
        if remap[idx as usize] != idx {
            continue;
        }
        let (cx, cy, cz) = cell_of(&vertex.position, cell_size);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(candidates) = grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &other in candidates {
                        if other <= idx || remap[other as usize] != other {
                            continue;
                        }
                        let d = (vertex.position - mesh.vertices[other as usize].position).norm();
                        if d < epsilon {
                            remap[other as usize] = idx;
                            merged += 1;
                        }
                    }
                }
            }
        }
    }

    if merged == 0 {
        return 0;
    }

    for face in &mut mesh.faces {
        for v in face.iter_mut() {
            *v = remap[*v as usize];
        }
    }
    mesh.faces.retain(|&[a, b, c]| a != b && b != c && a != c);

    debug!(merged, epsilon, "Welded vertices");
    merged
}

fn cell_of(p: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        (p.x / cell_size).floor() as i64,
        (p.y / cell_size).floor() as i64,
        (p.z / cell_size).floor() as i64,
    )
}

/// Remove faces with repeated vertex indices or zero area.
pub fn remove_degenerate_faces(mesh: &mut Mesh) -> usize {
    let before = mesh.faces.len();
    let vertices = &mesh.vertices;
    mesh.faces.retain(|&[a, b, c]| {
        if a == b || b == c || a == c {
            return false;
        }
        let pa = vertices[a as usize].position;
        let pb = vertices[b as usize].position;
        let pc = vertices[c as usize].position;
        (pb - pa).cross(&(pc - pa)).norm_squared() > 0.0
    });
    before - mesh.faces.len()
}

/// Remove faces that use the same three vertices as an earlier face,
/// regardless of winding.
pub fn remove_duplicate_faces(mesh: &mut Mesh) -> usize {
    let before = mesh.faces.len();
    let mut seen: HashSet<[u32; 3]> = HashSet::with_capacity(before);
    mesh.faces.retain(|face| {
        let mut key = *face;
        key.sort_unstable();
        seen.insert(key)
    });
    before - mesh.faces.len()
}

/// Remove interior faces: walls enclosed by non-manifold edges.
///
/// A face is interior when each of its edges is either shared by more than
/// two faces or shared with exactly one other interior face lying in the
/// same plane (the other half of a triangulated wall polygon). These are
/// the walls left inside a solid after welding touching shells together.
pub fn remove_interior_faces(mesh: &mut Mesh) -> usize {
    let adjacency = MeshAdjacency::build(&mesh.faces);
    let normals: Vec<Option<Vector3<f64>>> = mesh.triangles().map(|t| t.normal()).collect();

    let mut interior: Vec<bool> = mesh
        .faces
        .iter()
        .map(|face| {
            face_edges(face).iter().any(|&(a, b)| {
                adjacency
                    .faces_for_edge(a, b)
                    .is_some_and(|faces| faces.len() > 2)
            })
        })
        .collect();

    loop {
        let mut changed = false;
        for idx in 0..mesh.faces.len() {
            if !interior[idx] {
                continue;
            }
            let enclosed = face_edges(&mesh.faces[idx]).iter().all(|&(a, b)| {
                match adjacency.faces_for_edge(a, b).unwrap_or(&[]) {
                    faces if faces.len() > 2 => true,
                    &[f0, f1] => {
                        let other = if f0 == idx { f1 } else { f0 };
                        interior[other] && coplanar(&normals[idx], &normals[other])
                    }
                    _ => false,
                }
            });
            if !enclosed {
                interior[idx] = false;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let removed = interior.iter().filter(|&&i| i).count();
    if removed == 0 {
        return 0;
    }

    let mut idx = 0;
    mesh.faces.retain(|_| {
        let keep = !interior[idx];
        idx += 1;
        keep
    });
    debug!(removed, "Removed interior faces");
    removed
}

fn coplanar(a: &Option<Vector3<f64>>, b: &Option<Vector3<f64>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.dot(b).abs() > 1.0 - 1e-6,
        _ => false,
    }
}

/// Drop vertices no face references and compact the index space.
pub fn remove_unreferenced_vertices(mesh: &mut Mesh) -> usize {
    let mut used = vec![false; mesh.vertices.len()];
    for face in &mesh.faces {
        for &v in face {
            used[v as usize] = true;
        }
    }

    let removed = used.iter().filter(|&&u| !u).count();
    if removed == 0 {
        return 0;
    }

    let mut remap = vec![u32::MAX; mesh.vertices.len()];
    let mut next = 0u32;
    for (old, &keep) in used.iter().enumerate() {
        if keep {
            remap[old] = next;
            next += 1;
        }
    }

    let mut old_idx = 0;
    mesh.vertices.retain(|_| {
        let keep = used[old_idx];
        old_idx += 1;
        keep
    });
    for face in &mut mesh.faces {
        for v in face.iter_mut() {
            *v = remap[*v as usize];
        }
    }

    removed
}
