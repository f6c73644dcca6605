//! End-to-end kernel tests through real files.

use approx::assert_relative_eq;
use mesh_kernel::{
    Camera, DecimateParams, ExportOptions, IntersectionParams, Material, Mesh, MeshFormat,
    MeshPart, RepairParams, Scene, Vertex, decimate_mesh, detect_self_intersections, load_scene,
    manifold_defects, repair_mesh, save_scene, split_sharp_edges,
};
use nalgebra::{Point3, Vector3};
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

fn cube_at(offset: [f64; 3]) -> Mesh {
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
        mesh.vertices.push(Vertex::from_coords(
            p[0] + offset[0],
            p[1] + offset[1],
            p[2] + offset[2],
        ));
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

fn two_part_scene() -> Scene {
    let mut scene = Scene::from_mesh("left", cube_at([0.0, 0.0, 0.0]));
    scene.parts.push(MeshPart {
        name: "right".to_string(),
        mesh: cube_at([3.0, 0.0, 0.0]),
        material: Some(Material {
            name: Some("red".to_string()),
            base_color: [1.0, 0.0, 0.0, 1.0],
            metallic: 0.25,
            roughness: 0.75,
        }),
    });
    scene.camera = Some(Camera {
        position: Point3::new(2.0, -6.0, 2.0),
        target: Point3::new(2.0, 0.5, 0.5),
        up: Vector3::z(),
        yfov: 0.7,
        znear: 0.05,
        zfar: 50.0,
    });
    scene
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn test_glb_round_trip_keeps_parts_and_materials() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scene.glb");
    let scene = two_part_scene();

    save_scene(&scene, &path, MeshFormat::Glb, &ExportOptions { include_cameras: true }).unwrap();
    let loaded = load_scene(&path).unwrap();

    assert_eq!(loaded.parts.len(), 2);
    assert_eq!(loaded.parts[0].name, "left");
    assert_eq!(loaded.parts[1].name, "right");
    assert_eq!(loaded.face_count(), 24);
    assert!(loaded.parts[0].material.is_none());

    let material = loaded.parts[1].material.as_ref().unwrap();
    assert_eq!(material.base_color, [1.0, 0.0, 0.0, 1.0]);
    assert_relative_eq!(material.roughness, 0.75);

    let (min, max) = loaded.bounds().unwrap();
    assert_relative_eq!(min.x, 0.0, epsilon = 1e-6);
    assert_relative_eq!(max.x, 4.0, epsilon = 1e-6);

    for part in &loaded.parts {
        assert!(manifold_defects(&part.mesh).is_empty());
    }
}

#[test]
fn test_glb_header_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tri.glb");
    save_scene(&two_part_scene(), &path, MeshFormat::Glb, &ExportOptions::default()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], b"glTF");
    assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 2);
    let total = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    assert_eq!(total, bytes.len());
    assert_eq!(bytes.len() % 4, 0);
    assert_eq!(&bytes[16..20], b"JSON");
}

#[test]
fn test_obj_round_trip_keeps_objects() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scene.obj");

    save_scene(&two_part_scene(), &path, MeshFormat::Obj, &ExportOptions::default()).unwrap();
    let loaded = load_scene(&path).unwrap();

    assert_eq!(loaded.parts.len(), 2);
    assert_eq!(loaded.face_count(), 24);
    assert!(loaded.parts.iter().any(|p| p.name == "right"));
}

#[test]
fn test_stl_round_trip_merges_parts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scene.stl");

    save_scene(&two_part_scene(), &path, MeshFormat::Stl, &ExportOptions::default()).unwrap();
    let loaded = load_scene(&path).unwrap();

    assert_eq!(loaded.parts.len(), 1);
    assert_eq!(loaded.parts[0].name, "scene");
    assert_eq!(loaded.face_count(), 24);
    assert_eq!(loaded.vertex_count(), 16);
    assert!(manifold_defects(&loaded.parts[0].mesh).is_empty());
}

#[test]
fn test_corrupt_glb_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.glb");
    std::fs::write(&path, b"glTF\x02\x00\x00\x00garbage").unwrap();

    let err = load_scene(&path).unwrap_err();
    assert_eq!(err.code().as_str(), "MESH-1003");
}

#[test]
fn test_export_into_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("out.glb");
    let err = save_scene(&two_part_scene(), &path, MeshFormat::Glb, &ExportOptions::default())
        .unwrap_err();
    assert_eq!(err.code().as_str(), "MESH-1002");
}

// =============================================================================
// Processing chains
// =============================================================================

#[test]
fn test_split_cube_is_welded_back_by_repair() {
    let mut mesh = cube_at([0.0, 0.0, 0.0]);
    split_sharp_edges(&mut mesh, 0.5);
    assert!(!manifold_defects(&mesh).is_empty());

    repair_mesh(&mut mesh, &RepairParams::weld_only());
    assert!(manifold_defects(&mesh).is_empty());
    assert_eq!(mesh.vertex_count(), 8);
}

#[test]
fn test_decimated_glb_reloads_clean() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sphere.glb");

    // Latitude/longitude sphere, 2 * 32 * 15 triangles.
    let (segments, rings) = (32u32, 16u32);
    let mut mesh = Mesh::new();
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
    for r in 1..rings {
        let theta = std::f64::consts::PI * r as f64 / rings as f64;
        for s in 0..segments {
            let phi = std::f64::consts::TAU * s as f64 / segments as f64;
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
            mesh.faces.push([ring(r, s), ring(r + 1, s), ring(r + 1, s + 1)]);
            mesh.faces.push([ring(r, s), ring(r + 1, s + 1), ring(r, s + 1)]);
        }
    }

    let result = decimate_mesh(&mesh, &DecimateParams::with_target_ratio(0.4));
    assert!(result.reached_target());

    let scene = Scene::from_mesh("sphere", result.mesh);
    save_scene(&scene, &path, MeshFormat::Glb, &ExportOptions::default()).unwrap();
    let loaded = load_scene(&path).unwrap();

    assert_eq!(loaded.face_count(), result.final_triangles);
    assert!(manifold_defects(&loaded.parts[0].mesh).is_empty());
    let intersections =
        detect_self_intersections(&loaded.parts[0].mesh, &IntersectionParams::first_hit());
    assert!(intersections.is_clean());
}
