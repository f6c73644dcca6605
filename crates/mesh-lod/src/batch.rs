//! Batch driver: validate roots, discover inputs, run every file, report.
//!
//! Only unusable roots or configuration stop a batch, and they do so before
//! any file is touched. Per-file failures are recorded and the batch moves
//! on. With `jobs > 1` files run on a rayon pool, but outcomes are still
//! observed in input order so reports are identical to a sequential run.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use tracing::{info, warn};

use crate::config::BatchConfig;
use crate::error::{LodError, LodResult};
use crate::kernel::DefaultKernel;
use crate::orchestrator::{Orchestrator, PipelineSettings};
use crate::report::{BatchReporter, BatchSummary, FileSummary};
use crate::target::LevelTarget;

const TARGET: &str = "mesh_lod::batch";

/// Check that the input root is a readable directory and that the output
/// root exists (creating it if needed) and is writable. The output root may
/// sit inside the input root but must not be the input root or one of its
/// ancestors.
pub fn validate_roots(input_root: &Path, output_root: &Path) -> LodResult<()> {
    if !input_root.is_dir() {
        return Err(LodError::input_root(input_root, "not a directory"));
    }
    std::fs::read_dir(input_root)
        .map_err(|e| LodError::input_root(input_root, e.to_string()))?;

    std::fs::create_dir_all(output_root).map_err(|e| LodError::output_root(output_root, e))?;
    if let (Ok(input), Ok(output)) = (input_root.canonicalize(), output_root.canonicalize())
        && input.starts_with(&output)
    {
        return Err(LodError::input_root(
            input_root,
            format!("lies inside the output directory {}", output_root.display()),
        ));
    }
    let scratch = output_root.join(".mesh-lod-write-check");
    std::fs::write(&scratch, b"").map_err(|e| LodError::output_root(output_root, e))?;
    std::fs::remove_file(&scratch).map_err(|e| LodError::output_root(output_root, e))?;
    Ok(())
}

/// Files under `root` accepted by `accepts`, sorted. Directories equal to
/// `exclude` are not entered.
pub fn discover_inputs(
    root: &Path,
    exclude: Option<&Path>,
    accepts: impl Fn(&Path) -> bool,
) -> LodResult<Vec<PathBuf>> {
    let exclude = exclude.and_then(|p| p.canonicalize().ok());
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(LodError::input_root(root, e.to_string())),
            Err(e) => {
                warn!(target: TARGET, dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if exclude.is_some() && path.canonicalize().ok() == exclude {
                    continue;
                }
                pending.push(path);
            } else if accepts(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Runs a [`BatchConfig`] end to end.
pub struct BatchRunner {
    config: BatchConfig,
    orchestrator: Orchestrator,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> LodResult<Self> {
        config
            .validate()
            .map_err(|source| LodError::Config { path: None, source })?;
        let orchestrator = Orchestrator::new(pipeline_settings(&config))
            .with_kernel(DefaultKernel::new(config.kernel.clone()));
        Ok(Self {
            config,
            orchestrator,
        })
    }

    /// Replace the orchestrator, e.g. to inject other capabilities.
    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn run(&self) -> LodResult<BatchSummary> {
        let config = &self.config;
        validate_roots(&config.input_root, &config.output_root)?;

        let inputs = discover_inputs(&config.input_root, Some(&config.output_root), |p| {
            config.accepts(p)
        })?;
        warn_duplicate_stems(&inputs);

        let targets = config.targets();
        info!(
            target: TARGET,
            files = inputs.len(),
            targets = targets.len(),
            repair = %config.repair,
            jobs = config.jobs,
            "Starting batch"
        );

        let mut reporter = BatchReporter::new();
        let mut observe = |summary: FileSummary| {
            info!(
                target: TARGET,
                file = %summary.filename,
                levels = summary.levels.len(),
                failed = summary.failed,
                "File done"
            );
            reporter.observe(summary);
            if config.flush_each_file
                && let Err(err) = reporter.write_reports(&config.output_root)
            {
                warn!(target: TARGET, error = %err, "Could not flush reports");
            }
        };

        if config.jobs > 1 && inputs.len() > 1 {
            self.run_parallel(&inputs, &targets, &mut observe);
        } else {
            for path in &inputs {
                observe(self.orchestrator.process_file(path, &targets));
            }
        }

        let report_files = reporter.write_reports(&config.output_root)?;
        let summary = reporter.summary(report_files);
        info!(
            target: TARGET,
            files = summary.files_processed,
            failed = summary.files_failed,
            levels = summary.levels_written,
            errors = summary.error_count,
            "Batch finished"
        );
        Ok(summary)
    }

    /// Process files on a pool and hand outcomes to `observe` in input
    /// order as soon as every earlier file is done.
    fn run_parallel(
        &self,
        inputs: &[PathBuf],
        targets: &[LevelTarget],
        observe: &mut dyn FnMut(FileSummary),
    ) {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!(target: TARGET, error = %e, "Thread pool unavailable, running sequentially");
                for path in inputs {
                    observe(self.orchestrator.process_file(path, targets));
                }
                return;
            }
        };

        let (tx, rx) = mpsc::channel();
        std::thread::scope(|outer| {
            outer.spawn(|| {
                pool.scope(|s| {
                    for (index, path) in inputs.iter().enumerate() {
                        let tx = tx.clone();
                        s.spawn(move |_| {
                            let summary = self.orchestrator.process_file(path, targets);
                            let _ = tx.send((index, summary));
                        });
                    }
                });
                drop(tx);
            });

            let mut pending = BTreeMap::new();
            let mut next = 0;
            for (index, summary) in rx {
                pending.insert(index, summary);
                while let Some(summary) = pending.remove(&next) {
                    observe(summary);
                    next += 1;
                }
            }
        });
    }
}

/// Orchestrator settings for a batch configuration.
pub fn pipeline_settings(config: &BatchConfig) -> PipelineSettings {
    PipelineSettings {
        output_root: config.output_root.clone(),
        lighting: config.lighting.clone(),
        repair: config.repair,
        pre_repair: config.pre_repair,
        mirror_level_dirs: config.mirror_level_dirs,
    }
}

fn warn_duplicate_stems(inputs: &[PathBuf]) {
    let mut seen = HashSet::new();
    for path in inputs {
        if let Some(stem) = path.file_stem()
            && !seen.insert(stem)
        {
            warn!(
                target: TARGET,
                file = %path.display(),
                "Another input has the same name; its output directory will be overwritten"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_input_root_is_fatal() {
        let out = TempDir::new().unwrap();
        let err = validate_roots(Path::new("/definitely/not/here"), out.path()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code().as_str(), "LOD-1001");
    }

    #[test]
    fn test_output_root_is_created() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let nested = out.path().join("a").join("b");
        validate_roots(input.path(), &nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }

    #[test]
    fn test_output_root_under_a_file_is_fatal() {
        let input = TempDir::new().unwrap();
        let blocker = input.path().join("file.txt");
        std::fs::write(&blocker, b"x").unwrap();
        let err = validate_roots(input.path(), &blocker.join("out")).unwrap_err();
        assert_eq!(err.code().as_str(), "LOD-1002");
    }

    #[test]
    fn test_output_root_containing_input_is_fatal() {
        let parent = TempDir::new().unwrap();
        let models = parent.path().join("models");
        std::fs::create_dir_all(&models).unwrap();
        std::fs::write(models.join("kidney.glb"), b"x").unwrap();

        for output in [models.clone(), parent.path().to_path_buf()] {
            let err = validate_roots(&models, &output).unwrap_err();
            assert!(err.is_fatal());
            assert_eq!(err.code().as_str(), "LOD-1001");
        }
        assert!(models.join("kidney.glb").is_file());

        validate_roots(&models, &models.join("lods")).unwrap();
    }

    #[test]
    fn test_discovery_is_recursive_sorted_and_filtered() {
        let root = TempDir::new().unwrap();
        let sub = root.path().join("sub");
        let out = root.path().join("out");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        for path in [
            root.path().join("b.glb"),
            root.path().join("a.GLB"),
            root.path().join("notes.txt"),
            sub.join("c.glb"),
            out.join("old.glb"),
        ] {
            std::fs::write(path, b"").unwrap();
        }

        let config = BatchConfig::default();
        let found = discover_inputs(root.path(), Some(&out), |p| config.accepts(p)).unwrap();
        assert_eq!(
            found,
            vec![
                root.path().join("a.GLB"),
                root.path().join("b.glb"),
                sub.join("c.glb"),
            ]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BatchConfig {
            jobs: 0,
            ..BatchConfig::default()
        };
        let err = BatchRunner::new(config).err().unwrap();
        assert_eq!(err.code().as_str(), "LOD-1003");
        assert!(err.is_fatal());
    }
}
