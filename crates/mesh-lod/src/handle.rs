//! Mesh snapshots owned by the orchestrator.

use mesh_kernel::Scene;
use serde::Serialize;

/// One immutable snapshot of a file's scene.
///
/// Every decimation or repair that changes geometry produces a successor
/// with a higher generation; metrics are always recomputed from the
/// snapshot and never carried over from its predecessor.
#[derive(Debug, Clone)]
pub struct MeshHandle {
    scene: Scene,
    generation: u32,
}

impl MeshHandle {
    /// Wrap a freshly imported and prepared scene as generation 0.
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            generation: 0,
        }
    }

    /// A new snapshot derived from this one.
    pub fn successor(&self, scene: Scene) -> Self {
        Self {
            scene,
            generation: self.generation + 1,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn into_scene(self) -> Scene {
        self.scene
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Total polygons over every part.
    pub fn polygon_count(&self) -> usize {
        self.scene.face_count()
    }

    /// Total vertices over every part.
    pub fn vertex_count(&self) -> usize {
        self.scene.vertex_count()
    }

    /// Region identifiers in part order.
    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.scene
            .parts
            .iter()
            .enumerate()
            .map(|(index, part)| RegionId::new(index, &part.name))
    }
}

/// A part of the scene, the unit in which defects are reported.
///
/// Ordered by part index so defect sets iterate in scene order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegionId {
    pub index: usize,
    pub name: String,
}

impl RegionId {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
