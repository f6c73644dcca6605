//! Scene file I/O for GLB, OBJ and STL.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::glb::{export_glb, import_glb};
use crate::tracing_ext::OperationTimer;
use crate::validate::validate_mesh_data;
use crate::{Material, Mesh, MeshPart, Scene, Vertex};

/// Supported scene file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    /// Binary glTF. `.gltf` files are accepted on import.
    Glb,
    Obj,
    Stl,
}

impl MeshFormat {
    /// Detect format from a bare extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "glb" | "gltf" => Some(MeshFormat::Glb),
            "obj" => Some(MeshFormat::Obj),
            "stl" => Some(MeshFormat::Stl),
            _ => None,
        }
    }

    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Extension used when naming exported files.
    pub fn extension(&self) -> &'static str {
        match self {
            MeshFormat::Glb => "glb",
            MeshFormat::Obj => "obj",
            MeshFormat::Stl => "stl",
        }
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MeshFormat {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim().trim_start_matches('.'))
            .ok_or_else(|| MeshError::unsupported_format(Some(s.to_string())))
    }
}

/// Options applied when writing a scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Write the scene camera (GLB only). Default: false
    #[serde(default)]
    pub include_cameras: bool,
}

/// Load a scene, detecting the format from the extension.
///
/// Every part is checked for out-of-range indices and non-finite
/// coordinates. A file with no triangles loads as an empty scene.
pub fn load_scene(path: &Path) -> MeshResult<Scene> {
    let format = MeshFormat::from_path(path).ok_or_else(|| {
        MeshError::unsupported_format(path.extension().and_then(|e| e.to_str()).map(String::from))
    })?;

    if !path.is_file() {
        return Err(MeshError::io_read(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a file"),
        ));
    }

    let _timer = OperationTimer::new("load_scene");
    info!(path = %path.display(), %format, "Loading scene");

    let scene = match format {
        MeshFormat::Glb => import_glb(path)?,
        MeshFormat::Obj => load_obj(path)?,
        MeshFormat::Stl => load_stl(path)?,
    };

    for part in &scene.parts {
        validate_mesh_data(&part.mesh)?;
    }

    if scene.face_count() == 0 {
        warn!(path = %path.display(), "Scene has no triangles");
    } else if let Some((min, max)) = scene.bounds() {
        let dims = max - min;
        debug!(
            parts = scene.parts.len(),
            vertices = scene.vertex_count(),
            faces = scene.face_count(),
            dimensions = format!("{:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z),
            "Loaded scene"
        );
    }

    Ok(scene)
}

/// Write a scene in the given format.
///
/// OBJ keeps one object per part. STL has no notion of parts, so all parts
/// are merged, and neither format carries cameras.
pub fn save_scene(
    scene: &Scene,
    path: &Path,
    format: MeshFormat,
    options: &ExportOptions,
) -> MeshResult<()> {
    let _timer = OperationTimer::with_context("save_scene", scene.face_count(), scene.vertex_count());
    info!(path = %path.display(), %format, "Saving scene");

    match format {
        MeshFormat::Glb => export_glb(scene, path, options),
        MeshFormat::Obj => save_obj(scene, path),
        MeshFormat::Stl => save_stl(scene, path),
    }
}

fn load_stl(path: &Path) -> MeshResult<Scene> {
    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);
    let stl = stl_io::read_stl(&mut reader).map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    for v in &stl.vertices {
        mesh.vertices
            .push(Vertex::from_coords(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64));
    }
    for face in &stl.faces {
        let [a, b, c] = face.vertices.map(|i| i as u32);
        if a != b && b != c && a != c {
            mesh.faces.push([a, b, c]);
        }
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mesh")
        .to_string();
    Ok(Scene::from_mesh(name, mesh))
}

fn load_obj(path: &Path) -> MeshResult<Scene> {
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let materials = materials.unwrap_or_else(|e| {
        debug!(error = %e, "OBJ materials unavailable");
        Vec::new()
    });

    let mut scene = Scene::new();
    for model in models {
        let obj = &model.mesh;
        let mut mesh = Mesh::with_capacity(obj.positions.len() / 3, obj.indices.len() / 3);
        for p in obj.positions.chunks_exact(3) {
            mesh.vertices
                .push(Vertex::from_coords(p[0] as f64, p[1] as f64, p[2] as f64));
        }
        for tri in obj.indices.chunks_exact(3) {
            mesh.faces.push([tri[0], tri[1], tri[2]]);
        }

        let material = obj
            .material_id
            .and_then(|id| materials.get(id))
            .map(|m| Material {
                name: Some(m.name.clone()),
                base_color: m
                    .diffuse
                    .map(|d| [d[0], d[1], d[2], m.dissolve.unwrap_or(1.0)])
                    .unwrap_or(Material::default().base_color),
                ..Material::default()
            });

        scene.parts.push(MeshPart {
            name: model.name,
            mesh,
            material,
        });
    }
    Ok(scene)
}

fn save_obj(scene: &Scene, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    write_obj(scene, &mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| MeshError::io_write(path, e))
}

fn write_obj<W: Write>(scene: &Scene, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "# mesh-kernel OBJ export")?;
    writeln!(
        writer,
        "# parts: {} vertices: {} faces: {}",
        scene.parts.len(),
        scene.vertex_count(),
        scene.face_count()
    )?;

    let mut offset = 1u32;
    for part in &scene.parts {
        writeln!(writer, "o {}", part.name)?;
        for v in &part.mesh.vertices {
            let p = v.position;
            writeln!(writer, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z)?;
        }
        for f in &part.mesh.faces {
            writeln!(writer, "f {} {} {}", f[0] + offset, f[1] + offset, f[2] + offset)?;
        }
        offset += part.mesh.vertices.len() as u32;
    }
    Ok(())
}

fn save_stl(scene: &Scene, path: &Path) -> MeshResult<()> {
    let mesh = scene.merged_mesh();
    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|tri| {
            let n = tri.normal().unwrap_or_else(Vector3::zeros);
            let [v0, v1, v2] = tri
                .points()
                .map(|p| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]));
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [v0, v1, v2],
            }
        })
        .collect();

    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| MeshError::io_write(path, e))?;
    writer.flush().map_err(|e| MeshError::io_write(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(MeshFormat::from_path(Path::new("a/b.GLB")), Some(MeshFormat::Glb));
        assert_eq!(MeshFormat::from_path(Path::new("scene.gltf")), Some(MeshFormat::Glb));
        assert_eq!(MeshFormat::from_path(Path::new("x.obj")), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_path(Path::new("x.ply")), None);
        assert_eq!(MeshFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(".stl".parse::<MeshFormat>().unwrap(), MeshFormat::Stl);
        assert!("fbx".parse::<MeshFormat>().is_err());
        assert_eq!(MeshFormat::Obj.to_string(), "obj");
    }

    #[test]
    fn test_obj_groups_per_part() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);

        let mut scene = Scene::from_mesh("a", mesh.clone());
        scene.parts.push(MeshPart::new("b", mesh));

        let mut out = Vec::new();
        write_obj(&scene, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("o a\n"));
        assert!(text.contains("o b\n"));
        assert!(text.contains("f 4 5 6"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_scene(Path::new("/definitely/not/here.glb")).unwrap_err();
        assert!(matches!(err, MeshError::IoRead { .. }));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = load_scene(Path::new("model.fbx")).unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { .. }));
    }
}
