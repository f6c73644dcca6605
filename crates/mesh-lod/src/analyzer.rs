//! Quality analysis of a mesh snapshot.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::handle::{MeshHandle, RegionId};
use crate::kernel::GeometryKernel;

/// Counts and defect sets of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub polygon_count: usize,
    pub vertex_count: usize,
    /// Parts with at least one edge not shared by exactly two faces.
    pub non_manifold_regions: BTreeSet<RegionId>,
    /// Parts with at least one pair of intersecting non-adjacent faces.
    pub self_intersecting_regions: BTreeSet<RegionId>,
}

impl QualityReport {
    pub fn non_manifold_count(&self) -> usize {
        self.non_manifold_regions.len()
    }

    pub fn self_intersection_count(&self) -> usize {
        self.self_intersecting_regions.len()
    }

    pub fn is_clean(&self) -> bool {
        self.non_manifold_regions.is_empty() && self.self_intersecting_regions.is_empty()
    }
}

impl std::fmt::Display for QualityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} polygons, {} vertices, {} non-manifold part(s), {} self-intersecting part(s)",
            self.polygon_count,
            self.vertex_count,
            self.non_manifold_count(),
            self.self_intersection_count()
        )
    }
}

/// Analyze every part of a snapshot. Read-only.
pub fn analyze(handle: &MeshHandle, kernel: &dyn GeometryKernel) -> QualityReport {
    let parts = &handle.scene().parts;

    let flags: Vec<(bool, bool)> = parts
        .par_iter()
        .map(|part| {
            let non_manifold = !kernel.manifold_defects(&part.mesh).is_empty();
            let intersecting = kernel.self_intersects(&part.mesh);
            (non_manifold, intersecting)
        })
        .collect();

    let mut report = QualityReport {
        polygon_count: handle.polygon_count(),
        vertex_count: handle.vertex_count(),
        ..QualityReport::default()
    };
    for (region, (non_manifold, intersecting)) in handle.regions().zip(flags) {
        if non_manifold {
            report.non_manifold_regions.insert(region.clone());
        }
        if intersecting {
            report.self_intersecting_regions.insert(region);
        }
    }

    debug!(generation = handle.generation(), %report, "Analyzed snapshot");
    report
}
