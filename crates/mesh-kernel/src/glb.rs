//! Binary glTF (GLB) import and export.
//!
//! Import goes through the `gltf` crate. Export writes the container by hand:
//! a 12 byte header, a JSON chunk and a little-endian binary chunk, each
//! padded to four bytes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{MeshError, MeshResult};
use crate::io::ExportOptions;
use crate::{Camera, Material, Mesh, MeshPart, Scene, Vertex};

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UNSIGNED_INT: u32 = 5125;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const MODE_TRIANGLES: u32 = 4;

/// Load a GLB (or glTF) file as a scene.
///
/// The default scene is walked (the first scene if none is marked default),
/// node transforms are baked into positions, and each node carrying a mesh
/// becomes one part per material, so multi-material meshes keep every
/// material on re-export. Only triangle-list primitives are read.
pub fn import_glb(path: &Path) -> MeshResult<Scene> {
    let gltf::Gltf { document, blob } =
        gltf::Gltf::open(path).map_err(|e| MeshError::parse_error(path, e.to_string()))?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob)
        .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let mut scene = Scene::new();
    let Some(root) = document.default_scene().or_else(|| document.scenes().next()) else {
        warn!(path = %path.display(), "File contains no scene");
        return Ok(scene);
    };

    for node in root.nodes() {
        collect_node(&node, &Matrix4::identity(), &buffers, &mut scene, path)?;
    }

    debug!(
        path = %path.display(),
        parts = scene.parts.len(),
        faces = scene.face_count(),
        "Imported GLB"
    );
    Ok(scene)
}

fn collect_node(
    node: &gltf::Node<'_>,
    parent: &Matrix4<f64>,
    buffers: &[gltf::buffer::Data],
    scene: &mut Scene,
    path: &Path,
) -> MeshResult<()> {
    let local = Matrix4::<f32>::from(node.transform().matrix()).cast::<f64>();
    let world = parent * local;

    if let Some(gltf_mesh) = node.mesh() {
        // One group per material, in first-seen order.
        let mut groups: Vec<(Option<usize>, Mesh, Option<Material>)> = Vec::new();

        for primitive in gltf_mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                debug!(mode = ?primitive.mode(), "Skipping non-triangle primitive");
                continue;
            }
            let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };

            let material_index = primitive.material().index();
            let group = match groups.iter().position(|(index, ..)| *index == material_index) {
                Some(group) => group,
                None => {
                    groups.push((material_index, Mesh::new(), read_material(&primitive.material())));
                    groups.len() - 1
                }
            };
            let mesh = &mut groups[group].1;

            let offset = mesh.vertices.len() as u32;
            for p in positions {
                let local_point = Point3::new(p[0] as f64, p[1] as f64, p[2] as f64);
                mesh.vertices.push(Vertex::new(world.transform_point(&local_point)));
            }
            let added = mesh.vertices.len() as u32 - offset;

            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..added).collect(),
            };
            for tri in indices.chunks_exact(3) {
                if let Some(&bad) = tri.iter().find(|&&i| i >= added) {
                    return Err(MeshError::parse_error(
                        path,
                        format!("primitive index {} out of range ({} vertices)", bad, added),
                    ));
                }
                mesh.faces.push([tri[0] + offset, tri[1] + offset, tri[2] + offset]);
            }
        }
        if groups.is_empty() {
            groups.push((None, Mesh::new(), None));
        }

        let name = node
            .name()
            .or_else(|| gltf_mesh.name())
            .map(String::from)
            .unwrap_or_else(|| format!("part_{}", scene.parts.len()));
        let split = groups.len() > 1;
        for (i, (_, mut mesh, material)) in groups.into_iter().enumerate() {
            // Mirroring transforms flip the winding.
            if world.determinant() < 0.0 {
                for face in &mut mesh.faces {
                    face.swap(1, 2);
                }
            }
            scene.parts.push(MeshPart {
                name: if split { format!("{}_{}", name, i) } else { name.clone() },
                mesh,
                material,
            });
        }
    }

    for child in node.children() {
        collect_node(&child, &world, buffers, scene, path)?;
    }
    Ok(())
}

fn read_material(material: &gltf::Material<'_>) -> Option<Material> {
    material.index()?;
    let pbr = material.pbr_metallic_roughness();
    Some(Material {
        name: material.name().map(String::from),
        base_color: pbr.base_color_factor(),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
    })
}

/// Accumulates the binary chunk and the JSON objects that describe it.
#[derive(Default)]
struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
}

impl GlbBuilder {
    fn push_view(&mut self, bytes: &[u8], target: u32) -> usize {
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        self.buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": bytes.len(),
            "target": target,
        }));
        self.buffer_views.len() - 1
    }

    fn push_vec3(&mut self, values: &[[f32; 3]]) -> usize {
        let mut bytes = Vec::with_capacity(values.len() * 12);
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for v in values {
            for axis in 0..3 {
                bytes.extend_from_slice(&v[axis].to_le_bytes());
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        let view = self.push_view(&bytes, TARGET_ARRAY_BUFFER);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_FLOAT,
            "count": values.len(),
            "type": "VEC3",
            "min": min,
            "max": max,
        }));
        self.accessors.len() - 1
    }

    fn push_indices(&mut self, faces: &[[u32; 3]]) -> usize {
        let bytes: Vec<u8> = faces
            .iter()
            .flatten()
            .flat_map(|i| i.to_le_bytes())
            .collect();
        let view = self.push_view(&bytes, TARGET_ELEMENT_ARRAY_BUFFER);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": COMPONENT_UNSIGNED_INT,
            "count": faces.len() * 3,
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }
}

fn to_f32(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

fn normal_to_f32(n: &Vector3<f64>) -> [f32; 3] {
    [n.x as f32, n.y as f32, n.z as f32]
}

/// Build the JSON document and binary chunk for a scene.
fn build_document(scene: &Scene, options: &ExportOptions) -> (Value, Vec<u8>) {
    let mut builder = GlbBuilder::default();
    let mut meshes = Vec::new();
    let mut materials = Vec::new();
    let mut nodes = Vec::new();

    for part in &scene.parts {
        let mut node = json!({ "name": part.name });

        if !part.mesh.faces.is_empty() {
            let positions: Vec<[f32; 3]> =
                part.mesh.vertices.iter().map(|v| to_f32(&v.position)).collect();
            let mut attributes = json!({ "POSITION": builder.push_vec3(&positions) });

            let normals: Option<Vec<[f32; 3]>> = part
                .mesh
                .vertices
                .iter()
                .map(|v| v.normal.as_ref().map(normal_to_f32))
                .collect();
            if let Some(normals) = normals {
                attributes["NORMAL"] = json!(builder.push_vec3(&normals));
            }

            let mut primitive = json!({
                "attributes": attributes,
                "indices": builder.push_indices(&part.mesh.faces),
                "mode": MODE_TRIANGLES,
            });

            if let Some(material) = &part.material {
                let mut entry = json!({
                    "pbrMetallicRoughness": {
                        "baseColorFactor": material.base_color,
                        "metallicFactor": material.metallic,
                        "roughnessFactor": material.roughness,
                    }
                });
                if let Some(name) = &material.name {
                    entry["name"] = json!(name);
                }
                materials.push(entry);
                primitive["material"] = json!(materials.len() - 1);
            }

            meshes.push(json!({ "name": part.name, "primitives": [primitive] }));
            node["mesh"] = json!(meshes.len() - 1);
        }
        nodes.push(node);
    }

    let mut cameras = Vec::new();
    if options.include_cameras
        && let Some(camera) = &scene.camera
    {
        cameras.push(json!({
            "type": "perspective",
            "perspective": {
                "yfov": camera.yfov,
                "znear": camera.znear,
                "zfar": camera.zfar,
            }
        }));
        nodes.push(camera_node(camera));
    }

    let mut scene_json = json!({ "nodes": (0..nodes.len()).collect::<Vec<_>>() });
    if let Some(environment) = &scene.environment {
        scene_json["extras"] = json!({ "environment": environment.to_string_lossy() });
    }

    let mut doc = json!({
        "asset": { "version": "2.0", "generator": concat!("mesh-kernel ", env!("CARGO_PKG_VERSION")) },
        "scene": 0,
        "scenes": [scene_json],
        "nodes": nodes,
    });
    if !meshes.is_empty() {
        doc["meshes"] = json!(meshes);
        doc["accessors"] = json!(builder.accessors);
        doc["bufferViews"] = json!(builder.buffer_views);
        doc["buffers"] = json!([{ "byteLength": builder.bin.len() }]);
    }
    if !materials.is_empty() {
        doc["materials"] = json!(materials);
    }
    if !cameras.is_empty() {
        doc["cameras"] = json!(cameras);
    }

    (doc, builder.bin)
}

fn camera_node(camera: &Camera) -> Value {
    // glTF cameras look down their local -Z axis.
    let rotation = UnitQuaternion::face_towards(&(camera.position - camera.target), &camera.up);
    let q = rotation.coords;
    json!({
        "name": "Camera",
        "camera": 0,
        "translation": [camera.position.x, camera.position.y, camera.position.z],
        "rotation": [q.x, q.y, q.z, q.w],
    })
}

/// Write a scene as a GLB file.
pub fn export_glb(scene: &Scene, path: &Path, options: &ExportOptions) -> MeshResult<()> {
    let (doc, bin) = build_document(scene, options);
    write_glb(path, &doc, &bin)
}

fn write_glb(path: &Path, doc: &Value, bin: &[u8]) -> MeshResult<()> {
    let mut json_bytes = serde_json::to_vec(doc)
        .map_err(|e| MeshError::io_write(path, std::io::Error::other(e)))?;
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }

    let mut total = 12 + 8 + json_bytes.len();
    if !bin.is_empty() {
        total += 8 + bin.len();
    }

    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    let write = |writer: &mut BufWriter<File>, bytes: &[u8]| {
        writer.write_all(bytes).map_err(|e| MeshError::io_write(path, e))
    };

    write(&mut writer, &GLB_MAGIC.to_le_bytes())?;
    write(&mut writer, &GLB_VERSION.to_le_bytes())?;
    write(&mut writer, &(total as u32).to_le_bytes())?;
    write(&mut writer, &(json_bytes.len() as u32).to_le_bytes())?;
    write(&mut writer, &CHUNK_JSON.to_le_bytes())?;
    write(&mut writer, &json_bytes)?;
    if !bin.is_empty() {
        write(&mut writer, &(bin.len() as u32).to_le_bytes())?;
        write(&mut writer, &CHUNK_BIN.to_le_bytes())?;
        write(&mut writer, bin)?;
    }
    writer.flush().map_err(|e| MeshError::io_write(path, e))?;

    debug!(path = %path.display(), bytes = total, "Wrote GLB");
    Ok(())
}
