//! Error types for LOD planning and batch processing.
//!
//! Errors fall into two groups. Batch-level errors (`LOD-1xxx`) concern the
//! input/output roots, the configuration and the report files; they stop a
//! run before any file is touched. Per-file errors (`LOD-2xxx`) map onto
//! [`ErrorKind`] and are recorded in the error stream while the batch moves
//! on to the next file.

use std::path::PathBuf;

use mesh_kernel::MeshError;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for LOD operations.
pub type LodResult<T> = Result<T, LodError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LodErrorCode {
    // Batch errors (1xxx)
    /// LOD-1001: Input root missing or unreadable
    InputRoot = 1001,
    /// LOD-1002: Output root cannot be created or written
    OutputRoot = 1002,
    /// LOD-1003: Configuration could not be loaded or is invalid
    Config = 1003,
    /// LOD-1004: Report file could not be written
    Report = 1004,

    // Per-file errors (2xxx)
    /// LOD-2001: Source file could not be imported
    Import = 2001,
    /// LOD-2002: Targets do not form a valid plan
    InvalidPlan = 2002,
    /// LOD-2003: Simplification fell short of the requested ratio
    Decimation = 2003,
    /// LOD-2004: An output could not be written
    Export = 2004,
}

impl LodErrorCode {
    /// Returns the error code as a string in the format `LOD-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LodErrorCode::InputRoot => "LOD-1001",
            LodErrorCode::OutputRoot => "LOD-1002",
            LodErrorCode::Config => "LOD-1003",
            LodErrorCode::Report => "LOD-1004",
            LodErrorCode::Import => "LOD-2001",
            LodErrorCode::InvalidPlan => "LOD-2002",
            LodErrorCode::Decimation => "LOD-2003",
            LodErrorCode::Export => "LOD-2004",
        }
    }
}

impl std::fmt::Display for LodErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-file failure classes recorded in the error stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorKind {
    /// The file was skipped.
    Import,
    /// The file was skipped.
    InvalidPlan,
    /// The level was exported at the complexity actually reached.
    Decimation,
    /// The file's remaining levels were abandoned.
    Export,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Import => "ImportError",
            ErrorKind::InvalidPlan => "InvalidPlanError",
            ErrorKind::Decimation => "DecimationError",
            ErrorKind::Export => "ExportError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while planning or processing.
#[derive(Debug, Error, Diagnostic)]
pub enum LodError {
    #[error("input root {path} is not usable: {reason}")]
    #[diagnostic(
        code(lod::batch::input_root),
        help("Pass an existing, readable directory as the input root")
    )]
    InputRoot { path: PathBuf, reason: String },

    #[error("output root {path} is not usable")]
    #[diagnostic(
        code(lod::batch::output_root),
        help("Check that the output directory can be created and written")
    )]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {source}")]
    #[diagnostic(code(lod::config))]
    Config {
        path: Option<PathBuf>,
        #[source]
        source: ConfigError,
    },

    #[error("failed to write report {path}")]
    #[diagnostic(code(lod::report::write))]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to import {path}")]
    #[diagnostic(code(lod::file::import))]
    Import {
        path: PathBuf,
        #[source]
        source: MeshError,
    },

    #[error("invalid LOD plan: {reason}")]
    #[diagnostic(
        code(lod::file::invalid_plan),
        help("Percent targets must lie in (0, 100] and at least one target is required")
    )]
    InvalidPlan { reason: String },

    #[error(
        "simplification to {level}% stopped at {achieved_polygons} polygons (target {target_polygons})"
    )]
    #[diagnostic(code(lod::file::decimation))]
    Decimation {
        level: f64,
        target_polygons: usize,
        achieved_polygons: usize,
    },

    #[error("failed to export {path}")]
    #[diagnostic(code(lod::file::export))]
    Export {
        path: PathBuf,
        #[source]
        source: MeshError,
    },
}

impl LodError {
    pub fn code(&self) -> LodErrorCode {
        match self {
            LodError::InputRoot { .. } => LodErrorCode::InputRoot,
            LodError::OutputRoot { .. } => LodErrorCode::OutputRoot,
            LodError::Config { .. } => LodErrorCode::Config,
            LodError::Report { .. } => LodErrorCode::Report,
            LodError::Import { .. } => LodErrorCode::Import,
            LodError::InvalidPlan { .. } => LodErrorCode::InvalidPlan,
            LodError::Decimation { .. } => LodErrorCode::Decimation,
            LodError::Export { .. } => LodErrorCode::Export,
        }
    }

    /// The per-file class of this error, if it is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            LodError::Import { .. } => Some(ErrorKind::Import),
            LodError::InvalidPlan { .. } => Some(ErrorKind::InvalidPlan),
            LodError::Decimation { .. } => Some(ErrorKind::Decimation),
            LodError::Export { .. } => Some(ErrorKind::Export),
            _ => None,
        }
    }

    /// True for errors that must stop a batch before it starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LodError::InputRoot { .. } | LodError::OutputRoot { .. } | LodError::Config { .. }
        )
    }

    /// Get a human-readable recovery suggestion.
    pub fn recovery_suggestion(&self) -> String {
        match self {
            LodError::InputRoot { .. } => {
                "Pass an existing directory of models that is not inside the output directory".into()
            }
            LodError::OutputRoot { .. } | LodError::Report { .. } => {
                "Choose an output directory on a writable volume".into()
            }
            LodError::Config { .. } => "Fix the configuration file or run without --config".into(),
            LodError::Import { source, .. } => source.recovery_suggestion().to_string(),
            LodError::InvalidPlan { .. } => {
                "Use percents in (0, 100] or triangle ceilings of at least 1% of the model".into()
            }
            LodError::Decimation { .. } => {
                "The model is too small for this level; use a higher percent or accept the larger output".into()
            }
            LodError::Export { source, .. } => source.recovery_suggestion().to_string(),
        }
    }

    /// The file the error refers to, if any.
    pub fn location(&self) -> Option<PathBuf> {
        match self {
            LodError::InputRoot { path, .. }
            | LodError::OutputRoot { path, .. }
            | LodError::Report { path, .. }
            | LodError::Import { path, .. }
            | LodError::Export { path, .. } => Some(path.clone()),
            LodError::Config { path, .. } => path.clone(),
            LodError::InvalidPlan { .. } | LodError::Decimation { .. } => None,
        }
    }

    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        LodError::InvalidPlan {
            reason: reason.into(),
        }
    }

    pub fn import(path: impl Into<PathBuf>, source: MeshError) -> Self {
        LodError::Import {
            path: path.into(),
            source,
        }
    }

    pub fn export(path: impl Into<PathBuf>, source: MeshError) -> Self {
        LodError::Export {
            path: path.into(),
            source,
        }
    }

    pub fn input_root(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LodError::InputRoot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn output_root(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LodError::OutputRoot {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_kinds() {
        let err = LodError::invalid_plan("no targets");
        assert_eq!(err.code().as_str(), "LOD-2002");
        assert_eq!(err.kind(), Some(ErrorKind::InvalidPlan));
        assert!(!err.is_fatal());
        assert!(err.location().is_none());
    }

    #[test]
    fn test_root_errors_are_fatal() {
        let err = LodError::input_root("/nope", "does not exist");
        assert!(err.is_fatal());
        assert_eq!(err.kind(), None);
        assert_eq!(err.location(), Some(PathBuf::from("/nope")));

        let err = LodError::output_root(
            "/ro",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        );
        assert!(err.is_fatal());
        assert_eq!(err.code().to_string(), "LOD-1002");
    }

    #[test]
    fn test_import_error_carries_kernel_suggestion() {
        let err = LodError::import("a.glb", MeshError::parse_error("a.glb", "truncated"));
        assert_eq!(err.kind(), Some(ErrorKind::Import));
        assert!(err.recovery_suggestion().contains("re-export"));
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ErrorKind::Export.to_string(), "ExportError");
        assert!(ErrorKind::Import < ErrorKind::Export);
    }
}
