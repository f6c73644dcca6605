//! Drives one input file through the LOD pipeline.
//!
//! ```text
//! Imported -> SceneReady -> Analyzed -> { Decimated -> Repaired -> Exported }* -> Reported
//! ```
//!
//! Every transition emits an event on the `mesh_lod::orchestrator` target.
//! Failures never escape [`Orchestrator::process_file`]; they are recorded
//! in the returned [`FileSummary`]:
//!
//! - import or planning failure: the file is skipped
//! - decimation shortfall: the level is exported at the complexity reached
//! - export failure: the remaining levels of the file are abandoned

use std::path::{Path, PathBuf};
use std::time::Instant;

use mesh_kernel::tracing_ext::log_scene_stats;
use mesh_kernel::{MeshError, MeshFormat, Scene};
use tracing::{debug, error, info, info_span, warn};

use crate::analyzer::analyze;
use crate::error::{LodError, LodResult};
use crate::executor::decimate;
use crate::handle::MeshHandle;
use crate::kernel::{DefaultKernel, FileSceneIo, GeometryKernel, SceneIo, SceneSetup, StudioSetup};
use crate::planner::{PlannedLevel, plan};
use crate::repair_gate::{RepairPolicy, repair};
use crate::report::{DecimationStatus, FileSummary, ProcessingRecord};
use crate::target::{LevelTarget, OutputDescriptor};

const TARGET: &str = "mesh_lod::orchestrator";

/// Per-run settings shared by every file.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Each file gets `<output_root>/<stem>/`.
    pub output_root: PathBuf,
    pub lighting: Option<PathBuf>,
    pub repair: RepairPolicy,
    /// Run the repair gate on the pristine mesh once its baseline is
    /// recorded.
    pub pre_repair: bool,
    /// Also write derived outputs to `<output_root>/LOD/LOD-<level>/<stem>.<ext>`.
    pub mirror_level_dirs: bool,
}

impl PipelineSettings {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            lighting: None,
            repair: RepairPolicy::default(),
            pre_repair: false,
            mirror_level_dirs: false,
        }
    }
}

/// Owns the capabilities and settings used to process files.
pub struct Orchestrator {
    io: Box<dyn SceneIo>,
    kernel: Box<dyn GeometryKernel>,
    setup: Box<dyn SceneSetup>,
    settings: PipelineSettings,
}

impl Orchestrator {
    /// An orchestrator using the file-based kernel implementations.
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            io: Box::new(FileSceneIo),
            kernel: Box::new(DefaultKernel::default()),
            setup: Box::new(StudioSetup::default()),
            settings,
        }
    }

    pub fn with_io(mut self, io: impl SceneIo + 'static) -> Self {
        self.io = Box::new(io);
        self
    }

    pub fn with_kernel(mut self, kernel: impl GeometryKernel + 'static) -> Self {
        self.kernel = Box::new(kernel);
        self
    }

    pub fn with_setup(mut self, setup: impl SceneSetup + 'static) -> Self {
        self.setup = Box::new(setup);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the whole state machine for one file.
    pub fn process_file(&self, path: &Path, targets: &[LevelTarget]) -> FileSummary {
        let started = Instant::now();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());

        let span = info_span!("file", file = %filename);
        let _enter = span.enter();
        let mut summary = FileSummary::new(&filename);

        // Imported
        let mut scene = match self.io.import(path) {
            Ok(scene) => scene,
            Err(source) => {
                let err = LodError::import(path, source);
                error!(target: TARGET, error = %err, "Import failed, skipping file");
                summary.record_error(None, &err);
                summary.elapsed = started.elapsed();
                return summary;
            }
        };
        info!(
            target: TARGET,
            state = "imported",
            parts = scene.parts.len(),
            polygons = scene.face_count()
        );
        log_scene_stats(&scene, "imported");

        // SceneReady
        self.setup.prepare(&mut scene, self.settings.lighting.as_deref());
        let edges_split: usize = scene
            .parts
            .iter_mut()
            .map(|part| self.kernel.harden(&mut part.mesh))
            .sum();
        info!(target: TARGET, state = "scene_ready", edges_split);

        // Analyzed
        let mut handle = MeshHandle::new(scene);
        let baseline = analyze(&handle, self.kernel.as_ref());
        info!(target: TARGET, state = "analyzed", %baseline);
        let original_polygons = baseline.polygon_count;
        summary.baseline = Some(baseline);

        if self.settings.pre_repair
            && let (Some(repaired), report) =
                repair(&handle, self.settings.repair, self.kernel.as_ref())
        {
            info!(
                target: TARGET,
                state = "pre_repaired",
                repaired = report.repaired_regions.len(),
                remaining = report.remaining_regions.len()
            );
            handle = repaired;
        }

        let levels = match plan(original_polygons, targets) {
            Ok(levels) => levels,
            Err(err) => {
                error!(target: TARGET, error = %err, "Planning failed, skipping file");
                summary.record_error(None, &err);
                summary.elapsed = started.elapsed();
                return summary;
            }
        };

        let file_dir = self.settings.output_root.join(&stem);
        let has_derived = levels
            .iter()
            .any(|level| level.outputs.iter().any(OutputDescriptor::is_derived));
        if has_derived
            && let Err(err) = prepare_file_dir(&file_dir, &stem, path)
        {
            error!(target: TARGET, error = %err, "Cannot prepare output directory");
            summary.record_error(None, &err);
            summary.elapsed = started.elapsed();
            return summary;
        }

        for level in &levels {
            let level_started = Instant::now();
            let label = level.label();

            // Decimated
            let decimation = match decimate(&handle, level.incremental_ratio, self.kernel.as_ref()) {
                Ok(next) => {
                    handle = next;
                    if level.incremental_ratio == 1.0 {
                        DecimationStatus::Identity
                    } else {
                        DecimationStatus::Reached
                    }
                }
                Err(shortfall) => {
                    let err = LodError::Decimation {
                        level: level.percent,
                        target_polygons: shortfall.target_polygons,
                        achieved_polygons: shortfall.achieved_polygons,
                    };
                    warn!(target: TARGET, error = %err, "Exporting best-effort mesh");
                    summary.record_error(Some(level.percent), &err);
                    handle = shortfall.handle;
                    DecimationStatus::Shortfall {
                        target_polygons: shortfall.target_polygons,
                        achieved_polygons: shortfall.achieved_polygons,
                    }
                }
            };
            info!(
                target: TARGET,
                state = "decimated",
                level = %label,
                ratio = level.incremental_ratio,
                polygons = handle.polygon_count()
            );

            // Repaired
            let (repaired, repair_report) =
                repair(&handle, self.settings.repair, self.kernel.as_ref());
            if let Some(repaired) = repaired {
                handle = repaired;
            }
            info!(
                target: TARGET,
                state = "repaired",
                level = %label,
                remaining = repair_report.remaining_regions.len()
            );

            let quality = analyze(&handle, self.kernel.as_ref());

            // Exported
            let outputs = match self.export_level(handle.scene(), level, &file_dir, &stem) {
                Ok(outputs) => outputs,
                Err(err) => {
                    error!(
                        target: TARGET,
                        error = %err,
                        level = %label,
                        "Export failed, abandoning remaining levels"
                    );
                    summary.record_error(Some(level.percent), &err);
                    break;
                }
            };
            info!(target: TARGET, state = "exported", level = %label, files = outputs.len());
            log_scene_stats(handle.scene(), "exported");

            let mut record = ProcessingRecord::new(&filename, level.percent, &quality);
            record.elapsed = level_started.elapsed();
            record.decimation = decimation;
            record.repair_incomplete = repair_report.is_incomplete();
            record.outputs = outputs;
            summary.levels.push(record);
        }

        // Reported
        summary.elapsed = started.elapsed();
        info!(
            target: TARGET,
            state = "reported",
            levels = summary.levels.len(),
            errors = summary.errors.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64
        );
        summary
    }

    /// Write every output of one level, stopping at the first failure.
    fn export_level(
        &self,
        scene: &Scene,
        level: &PlannedLevel,
        file_dir: &Path,
        stem: &str,
    ) -> LodResult<Vec<PathBuf>> {
        let label = level.label();
        let mut written = Vec::new();

        for output in &level.outputs {
            let path = output.resolve(file_dir, stem, &label);
            if !output.is_derived()
                && let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|source| {
                    LodError::export(&path, MeshError::io_write(parent, source))
                })?;
            }
            self.io
                .export(scene, &path, output.format(), output.options())
                .map_err(|source| LodError::export(&path, source))?;
            written.push(path);

            if self.settings.mirror_level_dirs && output.is_derived() {
                let mirror_dir = self
                    .settings
                    .output_root
                    .join("LOD")
                    .join(format!("LOD-{}", label));
                std::fs::create_dir_all(&mirror_dir).map_err(|source| {
                    LodError::export(&mirror_dir, MeshError::io_write(&mirror_dir, source))
                })?;
                let mirror = mirror_dir.join(format!("{}.{}", stem, output.format().extension()));
                self.io
                    .export(scene, &mirror, output.format(), output.options())
                    .map_err(|source| LodError::export(&mirror, source))?;
                written.push(mirror);
            }
        }
        Ok(written)
    }
}

/// Create `<output_root>/<stem>/` and delete the `<stem>-<level>.<ext>`
/// models an earlier run left there. Other files, and the input itself,
/// are kept.
fn prepare_file_dir(dir: &Path, stem: &str, input: &Path) -> LodResult<()> {
    let io_err = |source| LodError::export(dir, MeshError::io_write(dir, source));
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let prefix = format!("{}-", stem);
    let input = input.canonicalize().ok();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_previous_output = path.is_file()
            && MeshFormat::from_path(&path).is_some()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix));
        if !is_previous_output || path.canonicalize().ok() == input {
            continue;
        }
        std::fs::remove_file(&path)
            .map_err(|source| LodError::export(&path, MeshError::io_write(&path, source)))?;
        debug!(target: TARGET, path = %path.display(), "Removed previous output");
    }
    Ok(())
}
