//! Level-of-detail planning and repair-gated decimation for batch pipelines.
//!
//! Given a mesh and a set of budgets (percents of the original polygon count
//! or absolute triangle ceilings), the [`planner`] computes an ordered ladder
//! of incremental reduction ratios. The [`orchestrator`] then walks the
//! ladder once per file, largest level first:
//!
//! 1. decimate the current snapshot by the level's incremental ratio
//! 2. run the repair gate with the configured [`RepairPolicy`]
//! 3. analyze the result (polygon/vertex counts, non-manifold and
//!    self-intersecting parts)
//! 4. export every requested output and append a [`ProcessingRecord`]
//!
//! [`BatchRunner`] applies this to every model under an input directory and
//! the [`BatchReporter`] writes the CSV reports. A failure in one file is
//! recorded and never stops the batch.
//!
//! # Example
//!
//! ```no_run
//! use mesh_lod::{BatchConfig, BatchRunner, RepairPolicy};
//!
//! let config = BatchConfig {
//!     levels: Some(vec![100.0, 50.0, 10.0]),
//!     repair: RepairPolicy::WeldDuplicatesOnly,
//!     ..BatchConfig::new("models/", "lods/")
//! };
//! let summary = BatchRunner::new(config)?.run()?;
//! println!("{}", summary);
//! # Ok::<(), mesh_lod::LodError>(())
//! ```
//!
//! # Planning
//!
//! ```
//! use mesh_lod::{LevelTarget, plan};
//!
//! let levels = plan(200_000, &[LevelTarget::percent(100.0), LevelTarget::ceiling(50_000)]).unwrap();
//! assert_eq!(levels[1].percent, 25.0);
//! assert_eq!(levels[1].incremental_ratio, 0.25);
//! ```

pub mod analyzer;
pub mod audit;
pub mod batch;
pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod kernel;
pub mod orchestrator;
pub mod planner;
pub mod repair_gate;
pub mod report;
pub mod target;

pub use analyzer::{QualityReport, analyze};
pub use audit::{AuditRecord, AuditReport, OUTPUTS_REPORT, audit_outputs};
pub use batch::{BatchRunner, discover_inputs, pipeline_settings, validate_roots};
pub use config::{BatchConfig, ConfigError, DEFAULT_LEVELS};
pub use error::{ErrorKind, LodError, LodErrorCode, LodResult};
pub use executor::{DecimationShortfall, decimate};
pub use handle::{MeshHandle, RegionId};
pub use kernel::{
    DefaultKernel, FileSceneIo, GeometryKernel, KernelConfig, SceneIo, SceneSetup, StudioSetup,
    Unreachable,
};
pub use orchestrator::{Orchestrator, PipelineSettings};
pub use planner::{PlannedLevel, plan, resolve_percent};
pub use repair_gate::{RepairPolicy, RepairReport, repair};
pub use report::{
    BatchReporter, BatchSummary, DecimationStatus, ErrorRecord, FileSummary, ProcessingRecord,
    format_elapsed,
};
pub use target::{LevelTarget, OutputDescriptor, format_percent};
