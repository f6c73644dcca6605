//! One decimation step.

use rayon::prelude::*;
use tracing::{debug, warn};

use mesh_kernel::Scene;

use crate::handle::MeshHandle;
use crate::kernel::GeometryKernel;

/// A step that could not reach its ratio.
///
/// `handle` holds the best-effort snapshot, which the orchestrator exports
/// in place of the requested level.
#[derive(Debug, Clone)]
pub struct DecimationShortfall {
    pub handle: MeshHandle,
    pub ratio: f64,
    pub target_polygons: usize,
    pub achieved_polygons: usize,
}

/// Apply `ratio` to every part of `handle`.
///
/// Parts are simplified independently and in parallel. When some parts
/// cannot shrink far enough, the parts that did are simplified again to
/// absorb the difference, and the step falls short only if the scene total
/// still exceeds `round(polygons * ratio)`.
/// A ratio of exactly 1.0 is the identity.
pub fn decimate(
    handle: &MeshHandle,
    ratio: f64,
    kernel: &dyn GeometryKernel,
) -> Result<MeshHandle, DecimationShortfall> {
    if ratio == 1.0 {
        return Ok(handle.successor(handle.scene().clone()));
    }
    if !(ratio > 0.0 && ratio < 1.0) {
        warn!(ratio, "Decimation ratio outside (0, 1], mesh left unchanged");
        return Err(DecimationShortfall {
            handle: handle.successor(handle.scene().clone()),
            ratio,
            target_polygons: handle.polygon_count(),
            achieved_polygons: handle.polygon_count(),
        });
    }

    let scene = handle.scene();
    let target_polygons = ((handle.polygon_count() as f64) * ratio).round() as usize;
    let outcomes: Vec<_> = scene
        .parts
        .par_iter()
        .map(|part| match kernel.simplify(&part.mesh, ratio) {
            Ok(mesh) => (mesh, true),
            Err(unreachable) => (unreachable.mesh, false),
        })
        .collect();

    let mut next = scene.clone();
    let mut stuck = Vec::with_capacity(outcomes.len());
    for (part, (mesh, ok)) in next.parts.iter_mut().zip(outcomes) {
        if !ok {
            debug!(part = %part.name, achieved = mesh.face_count(), "Part fell short");
        }
        part.mesh = mesh;
        stuck.push(!ok);
    }

    let any_stuck = stuck.contains(&true);
    let achieved: usize = next.parts.iter().map(|p| p.mesh.face_count()).sum();
    if any_stuck && achieved > target_polygons {
        compensate(&mut next, &stuck, achieved - target_polygons, kernel);
    }

    let next = handle.successor(next);
    debug!(
        ratio,
        before = handle.polygon_count(),
        after = next.polygon_count(),
        target = target_polygons,
        "Decimation step"
    );

    if !any_stuck || next.polygon_count() <= target_polygons {
        Ok(next)
    } else {
        Err(DecimationShortfall {
            ratio,
            target_polygons,
            achieved_polygons: next.polygon_count(),
            handle: next,
        })
    }
}

/// Spread `excess` polygons over the parts not flagged in `stuck`, in
/// proportion to their size, and simplify those parts again.
fn compensate(scene: &mut Scene, stuck: &[bool], excess: usize, kernel: &dyn GeometryKernel) {
    let movable: usize = scene
        .parts
        .iter()
        .zip(stuck)
        .filter(|(_, stuck)| !**stuck)
        .map(|(p, _)| p.mesh.face_count())
        .sum();
    if movable == 0 {
        return;
    }

    scene
        .parts
        .par_iter_mut()
        .zip(stuck.par_iter())
        .filter(|(p, stuck)| !**stuck && p.mesh.face_count() > 0)
        .for_each(|(part, _)| {
            let faces = part.mesh.face_count();
            let share = (excess * faces).div_ceil(movable).min(faces - 1);
            let ratio = (faces - share) as f64 / faces as f64;
            part.mesh = match kernel.simplify(&part.mesh, ratio) {
                Ok(mesh) => mesh,
                Err(unreachable) => unreachable.mesh,
            };
        });
    debug!(excess, movable, "Compensated for parts that fell short");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{DefaultKernel, KernelConfig};
    use mesh_kernel::{Mesh, MeshPart, Scene, Vertex};

    fn grid(n: u32) -> Mesh {
        let mut mesh = Mesh::new();
        for y in 0..=n {
            for x in 0..=n {
                let z = ((x as f64) * 0.7).sin() * ((y as f64) * 0.5).cos() * 0.3;
                mesh.vertices.push(Vertex::from_coords(x as f64, y as f64, z));
            }
        }
        let idx = |x: u32, y: u32| y * (n + 1) + x;
        for y in 0..n {
            for x in 0..n {
                mesh.faces.push([idx(x, y), idx(x + 1, y), idx(x + 1, y + 1)]);
                mesh.faces.push([idx(x, y), idx(x + 1, y + 1), idx(x, y + 1)]);
            }
        }
        mesh
    }

    fn strip() -> Mesh {
        let mut mesh = Mesh::new();
        for i in 0..4 {
            mesh.vertices.push(Vertex::from_coords(i as f64, 0.0, 0.0));
            mesh.vertices.push(Vertex::from_coords(i as f64, 1.0, 0.0));
        }
        for i in 0..3u32 {
            let a = 2 * i;
            mesh.faces.push([a, a + 2, a + 1]);
            mesh.faces.push([a + 1, a + 2, a + 3]);
        }
        mesh
    }

    #[test]
    fn test_identity_ratio() {
        let handle = MeshHandle::new(Scene::from_mesh("grid", grid(6)));
        let next = decimate(&handle, 1.0, &DefaultKernel::default()).unwrap();
        assert_eq!(next.generation(), 1);
        assert_eq!(next.scene(), handle.scene());
    }

    #[test]
    fn test_halves_each_part() {
        let mut scene = Scene::from_mesh("a", grid(8));
        scene.parts.push(MeshPart::new("b", grid(6)));
        let handle = MeshHandle::new(scene);

        let next = decimate(&handle, 0.5, &DefaultKernel::default()).unwrap();
        let (a, b) = (&next.scene().parts[0].mesh, &next.scene().parts[1].mesh);
        assert!((60..=64).contains(&a.face_count()), "{}", a.face_count());
        assert!((32..=36).contains(&b.face_count()), "{}", b.face_count());
        assert_eq!(next.scene().parts[1].name, "b");
    }

    #[test]
    fn test_shortfall_keeps_best_effort() {
        let kernel = DefaultKernel::new(KernelConfig {
            preserve_boundary: true,
            ..KernelConfig::default()
        });
        let mut scene = Scene::from_mesh("stuck", strip());
        scene.parts.push(MeshPart::new("also_stuck", strip()));
        let handle = MeshHandle::new(scene);

        let shortfall = decimate(&handle, 0.5, &kernel).unwrap_err();
        assert_eq!(shortfall.target_polygons, 6);
        assert_eq!(shortfall.achieved_polygons, 12);
        assert_eq!(shortfall.handle.polygon_count(), 12);
        assert_eq!(shortfall.handle.generation(), 1);
    }

    #[test]
    fn test_stuck_small_part_is_absorbed_by_the_rest() {
        let mut tetrahedron = Mesh::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, 1.0, 0.0], [0.5, 0.5, 1.0]] {
            tetrahedron.vertices.push(Vertex::from_coords(p[0], p[1], p[2]));
        }
        tetrahedron.faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];

        let mut scene = Scene::from_mesh("body", grid(8));
        scene.parts.push(MeshPart::new("rivet", tetrahedron));
        let handle = MeshHandle::new(scene);

        let next = decimate(&handle, 0.5, &DefaultKernel::default()).unwrap();
        assert_eq!(next.scene().parts[1].mesh.face_count(), 4);
        assert!(next.polygon_count() <= 66, "{}", next.polygon_count());
    }

    #[test]
    fn test_invalid_ratio_is_shortfall() {
        let handle = MeshHandle::new(Scene::from_mesh("grid", grid(2)));
        for ratio in [0.0, -0.5, 1.5, f64::NAN] {
            let shortfall = decimate(&handle, ratio, &DefaultKernel::default()).unwrap_err();
            assert_eq!(shortfall.achieved_polygons, 8);
        }
    }
}
