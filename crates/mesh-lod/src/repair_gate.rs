//! The repair gate run after every decimation step.

use std::collections::BTreeSet;
use std::str::FromStr;

use mesh_kernel::RepairMode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::handle::{MeshHandle, RegionId};
use crate::kernel::GeometryKernel;

/// Which defect classes the gate attempts to fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
    /// Leave every mesh untouched.
    None,
    /// Merge doubled vertices only. Suitable for meshes with intentional
    /// openings.
    #[default]
    WeldDuplicatesOnly,
    /// Weld, then close boundary loops. Only for meshes meant to be solid.
    FillHolesAndWeld,
}

impl RepairPolicy {
    /// The kernel repair mode, or `None` for the no-op policy.
    pub fn mode(&self) -> Option<RepairMode> {
        match self {
            RepairPolicy::None => None,
            RepairPolicy::WeldDuplicatesOnly => Some(RepairMode::WeldOnly),
            RepairPolicy::FillHolesAndWeld => Some(RepairMode::FillHolesAndWeld),
        }
    }

    /// Command-line spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairPolicy::None => "none",
            RepairPolicy::WeldDuplicatesOnly => "doubles",
            RepairPolicy::FillHolesAndWeld => "print",
        }
    }
}

impl std::fmt::Display for RepairPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepairPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(RepairPolicy::None),
            "doubles" | "weld" | "weld_duplicates_only" => Ok(RepairPolicy::WeldDuplicatesOnly),
            "print" | "full" | "fill_holes_and_weld" => Ok(RepairPolicy::FillHolesAndWeld),
            other => Err(format!(
                "unknown repair policy '{}' (expected print, doubles or none)",
                other
            )),
        }
    }
}

/// What the gate did to one snapshot.
///
/// A non-empty `remaining_regions` means repair ran but defects remain.
/// That is recorded, never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Parts that failed the manifold test and were repaired.
    pub repaired_regions: BTreeSet<RegionId>,
    /// Parts still failing the manifold test afterwards.
    pub remaining_regions: BTreeSet<RegionId>,
}

impl RepairReport {
    pub fn is_incomplete(&self) -> bool {
        !self.remaining_regions.is_empty()
    }
}

/// Apply `policy` to the parts of `handle` that fail the manifold test.
///
/// Returns a successor snapshot when anything was repaired, otherwise
/// `None` and the caller keeps the input snapshot.
pub fn repair(
    handle: &MeshHandle,
    policy: RepairPolicy,
    kernel: &dyn GeometryKernel,
) -> (Option<MeshHandle>, RepairReport) {
    let mut report = RepairReport::default();
    let Some(mode) = policy.mode() else {
        return (None, report);
    };

    let mut scene = handle.scene().clone();
    for (region, part) in handle.regions().zip(scene.parts.iter_mut()) {
        if kernel.manifold_defects(&part.mesh).is_empty() {
            continue;
        }

        let summary = kernel.repair(&mut part.mesh, mode);
        debug!(part = %region, %summary, "Repaired part");
        if !kernel.manifold_defects(&part.mesh).is_empty() {
            report.remaining_regions.insert(region.clone());
        }
        report.repaired_regions.insert(region);
    }

    if report.repaired_regions.is_empty() {
        return (None, report);
    }

    info!(
        %policy,
        repaired = report.repaired_regions.len(),
        remaining = report.remaining_regions.len(),
        "Repair gate applied"
    );
    (Some(handle.successor(scene)), report)
}
