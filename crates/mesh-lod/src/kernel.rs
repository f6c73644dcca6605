//! Capabilities the pipeline consumes, and their default implementations.
//!
//! The orchestrator only talks to scenes and meshes through three traits:
//!
//! - [`SceneIo`]: import and export of whole scenes
//! - [`GeometryKernel`]: simplify, manifold test, self-intersection test,
//!   repair and hardening of one mesh
//! - [`SceneSetup`]: camera and lighting, run once per file
//!
//! [`DefaultKernel`], [`FileSceneIo`] and [`StudioSetup`] implement them on
//! top of `mesh-kernel`. Tests swap in their own implementations to inject
//! failures.

use std::path::Path;

use mesh_kernel::{
    Camera, DecimateParams, EdgeDefect, ExportOptions, IntersectionParams, Mesh, MeshFormat,
    MeshResult, RepairMode, RepairParams, RepairSummary, Scene, decimate_mesh,
    detect_self_intersections, load_scene, manifold_defects, repair_mesh, save_scene,
    split_sharp_edges,
};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Scene import and export.
pub trait SceneIo: Send + Sync {
    fn import(&self, path: &Path) -> MeshResult<Scene>;

    fn export(
        &self,
        scene: &Scene,
        path: &Path,
        format: MeshFormat,
        options: &ExportOptions,
    ) -> MeshResult<()>;
}

/// Per-mesh geometric operations.
pub trait GeometryKernel: Send + Sync {
    /// Reduce `mesh` to `ratio` of its polygons.
    ///
    /// When the ratio cannot be reached the best-effort mesh is returned
    /// inside [`Unreachable`].
    fn simplify(&self, mesh: &Mesh, ratio: f64) -> Result<Mesh, Unreachable>;

    /// Edges not shared by exactly two faces.
    fn manifold_defects(&self, mesh: &Mesh) -> Vec<EdgeDefect>;

    /// True if any two non-adjacent faces intersect.
    fn self_intersects(&self, mesh: &Mesh) -> bool;

    fn repair(&self, mesh: &mut Mesh, mode: RepairMode) -> RepairSummary;

    /// Edge-split pass run once per file before analysis. Returns the
    /// number of edges split.
    fn harden(&self, mesh: &mut Mesh) -> usize;
}

/// Camera, lighting and render settings.
pub trait SceneSetup: Send + Sync {
    fn prepare(&self, scene: &mut Scene, lighting: Option<&Path>);
}

/// A simplification that stopped short of its target.
#[derive(Debug, Clone)]
pub struct Unreachable {
    /// The smallest mesh the simplifier could produce.
    pub mesh: Mesh,
    pub target_polygons: usize,
    pub achieved_polygons: usize,
}

/// Tuning for [`DefaultKernel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Vertices closer than this are merged by repair.
    ///
    /// Default: 1e-4
    pub weld_distance: f64,

    /// Largest boundary loop hole filling will close. `None` closes all.
    ///
    /// Default: None
    pub max_hole_edges: Option<usize>,

    /// Dihedral angle above which hardening splits an edge. `None`
    /// disables hardening.
    ///
    /// Default: None
    pub crease_angle_degrees: Option<f64>,

    /// Keep open boundaries fixed during simplification.
    ///
    /// Default: false
    pub preserve_boundary: bool,

    /// Intersecting pairs to collect before a part is classified.
    ///
    /// Default: 1
    pub max_intersection_reports: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            weld_distance: 1e-4,
            max_hole_edges: None,
            crease_angle_degrees: None,
            preserve_boundary: false,
            max_intersection_reports: 1,
        }
    }
}

/// [`GeometryKernel`] backed by `mesh-kernel`.
#[derive(Debug, Clone, Default)]
pub struct DefaultKernel {
    config: KernelConfig,
}

impl DefaultKernel {
    pub fn new(config: KernelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

impl GeometryKernel for DefaultKernel {
    fn simplify(&self, mesh: &Mesh, ratio: f64) -> Result<Mesh, Unreachable> {
        let params = DecimateParams {
            preserve_boundary: self.config.preserve_boundary,
            ..DecimateParams::with_target_ratio(ratio)
        };
        let result = decimate_mesh(mesh, &params);
        if result.reached_target() {
            Ok(result.mesh)
        } else {
            Err(Unreachable {
                target_polygons: result.target_triangles,
                achieved_polygons: result.final_triangles,
                mesh: result.mesh,
            })
        }
    }

    fn manifold_defects(&self, mesh: &Mesh) -> Vec<EdgeDefect> {
        manifold_defects(mesh)
    }

    fn self_intersects(&self, mesh: &Mesh) -> bool {
        let params = IntersectionParams {
            max_reported: self.config.max_intersection_reports.max(1),
            ..IntersectionParams::default()
        };
        !detect_self_intersections(mesh, &params).is_clean()
    }

    fn repair(&self, mesh: &mut Mesh, mode: RepairMode) -> RepairSummary {
        let params = RepairParams {
            mode,
            weld_distance: self.config.weld_distance,
            max_hole_edges: self.config.max_hole_edges,
        };
        repair_mesh(mesh, &params)
    }

    fn harden(&self, mesh: &mut Mesh) -> usize {
        match self.config.crease_angle_degrees {
            Some(degrees) => split_sharp_edges(mesh, degrees.to_radians()),
            None => 0,
        }
    }
}

/// [`SceneIo`] over the file formats `mesh-kernel` reads and writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSceneIo;

impl SceneIo for FileSceneIo {
    fn import(&self, path: &Path) -> MeshResult<Scene> {
        load_scene(path)
    }

    fn export(
        &self,
        scene: &Scene,
        path: &Path,
        format: MeshFormat,
        options: &ExportOptions,
    ) -> MeshResult<()> {
        save_scene(scene, path, format, options)
    }
}

/// Frames the scene with a camera and records the lighting asset.
#[derive(Debug, Clone, Copy)]
pub struct StudioSetup {
    /// Vertical field of view in radians.
    ///
    /// Default: 0.8
    pub yfov: f64,
}

impl Default for StudioSetup {
    fn default() -> Self {
        Self { yfov: 0.8 }
    }
}

impl StudioSetup {
    /// A camera looking at the bounds from above and in front, far enough
    /// back that the bounding sphere fits the vertical field of view.
    pub fn framing_camera(&self, min: Point3<f64>, max: Point3<f64>) -> Camera {
        let center = nalgebra::center(&min, &max);
        let radius = ((max - min).norm() * 0.5).max(1e-3);
        let distance = radius / (self.yfov * 0.5).sin() * 1.1;
        let direction = Vector3::new(0.6, 0.5, 1.0).normalize();

        Camera {
            position: center + direction * distance,
            target: center,
            up: Vector3::y(),
            yfov: self.yfov,
            znear: (distance - radius).max(distance * 0.01),
            zfar: distance + radius * 2.0,
        }
    }
}

impl SceneSetup for StudioSetup {
    fn prepare(&self, scene: &mut Scene, lighting: Option<&Path>) {
        if let Some((min, max)) = scene.bounds() {
            scene.camera = Some(self.framing_camera(min, max));
        }

        if let Some(path) = lighting {
            if path.is_file() {
                scene.environment = Some(path.to_path_buf());
            } else {
                warn!(
                    path = %path.display(),
                    "Lighting asset not found, continuing without environment"
                );
            }
        }
        debug!(camera = scene.camera.is_some(), "Scene prepared");
    }
}
