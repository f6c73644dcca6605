//! Re-import and analyze exported levels.

use std::path::{Path, PathBuf};

use mesh_kernel::MeshFormat;
use serde::Serialize;
use tracing::{info, warn};

use crate::analyzer::analyze;
use crate::batch::discover_inputs;
use crate::error::{LodError, LodResult};
use crate::handle::MeshHandle;
use crate::kernel::{GeometryKernel, SceneIo};
use crate::report::{ErrorRecord, push_row, write_report};

pub const OUTPUTS_REPORT: &str = "analyze_outputs.csv";

/// Quality of one exported file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// Path relative to the audited directory.
    pub filename: String,
    pub polygon_count: usize,
    pub non_manifold_parts: Vec<String>,
    pub self_intersecting_parts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub records: Vec<AuditRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl AuditReport {
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_row(
            &mut out,
            &["Filename", "Polycount", "Non-Manifold Parts", "Self Intersecting Parts"]
                .map(String::from),
        );
        for record in &self.records {
            push_row(
                &mut out,
                &[
                    record.filename.clone(),
                    record.polygon_count.to_string(),
                    record.non_manifold_parts.join(";"),
                    record.self_intersecting_parts.join(";"),
                ],
            );
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> LodResult<()> {
        write_report(path, &self.to_csv())
    }
}

/// Analyze every readable model under `dir` without repairing it.
pub fn audit_outputs(
    dir: &Path,
    io: &dyn SceneIo,
    kernel: &dyn GeometryKernel,
) -> LodResult<AuditReport> {
    if !dir.is_dir() {
        return Err(LodError::input_root(dir, "not a directory"));
    }
    let files = discover_inputs(dir, None, |p| MeshFormat::from_path(p).is_some())?;
    info!(dir = %dir.display(), files = files.len(), "Auditing outputs");

    let mut report = AuditReport::default();
    for path in files {
        let filename = relative_name(dir, &path);
        match io.import(&path) {
            Ok(scene) => {
                let quality = analyze(&MeshHandle::new(scene), kernel);
                report.records.push(AuditRecord {
                    filename,
                    polygon_count: quality.polygon_count,
                    non_manifold_parts: quality
                        .non_manifold_regions
                        .iter()
                        .map(|r| r.name.clone())
                        .collect(),
                    self_intersecting_parts: quality
                        .self_intersecting_regions
                        .iter()
                        .map(|r| r.name.clone())
                        .collect(),
                });
            }
            Err(source) => {
                let err = LodError::import(&path, source);
                warn!(error = %err, "Skipping unreadable output");
                report.errors.extend(ErrorRecord::from_error(filename, None, &err));
            }
        }
    }
    Ok(report)
}

fn relative_name(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
