//! Level targets and output descriptors.

use std::path::{Path, PathBuf};

use mesh_kernel::{ExportOptions, MeshFormat};
use serde::{Deserialize, Serialize};

/// Where and how one level is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputDescriptor {
    /// Named `<stem>-<level>.<ext>` inside the file's output directory.
    Derived {
        format: MeshFormat,
        #[serde(default)]
        options: ExportOptions,
    },
    /// Written to exactly this path.
    Explicit {
        path: PathBuf,
        format: MeshFormat,
        #[serde(default)]
        options: ExportOptions,
    },
}

impl OutputDescriptor {
    pub fn derived(format: MeshFormat) -> Self {
        OutputDescriptor::Derived {
            format,
            options: ExportOptions::default(),
        }
    }

    /// An explicit output whose format follows the path's extension,
    /// falling back to GLB.
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = MeshFormat::from_path(&path).unwrap_or(MeshFormat::Glb);
        OutputDescriptor::Explicit {
            path,
            format,
            options: ExportOptions::default(),
        }
    }

    /// Replace the export options.
    pub fn with_options(mut self, new_options: ExportOptions) -> Self {
        match &mut self {
            OutputDescriptor::Derived { options, .. } | OutputDescriptor::Explicit { options, .. } => {
                *options = new_options
            }
        }
        self
    }

    pub fn format(&self) -> MeshFormat {
        match self {
            OutputDescriptor::Derived { format, .. } | OutputDescriptor::Explicit { format, .. } => {
                *format
            }
        }
    }

    pub fn options(&self) -> &ExportOptions {
        match self {
            OutputDescriptor::Derived { options, .. } | OutputDescriptor::Explicit { options, .. } => {
                options
            }
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, OutputDescriptor::Derived { .. })
    }

    /// The path this output is written to for a given file and level.
    pub fn resolve(&self, file_dir: &Path, stem: &str, level_label: &str) -> PathBuf {
        match self {
            OutputDescriptor::Derived { format, .. } => {
                file_dir.join(format!("{}-{}.{}", stem, level_label, format.extension()))
            }
            OutputDescriptor::Explicit { path, .. } => path.clone(),
        }
    }
}

/// A requested output budget.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelTarget {
    /// Percent of the original polygon count, in (0, 100].
    Percent {
        percent: f64,
        outputs: Vec<OutputDescriptor>,
    },
    /// Absolute polygon ceiling, resolved against the original count.
    TriangleCeiling {
        max_triangles: u64,
        outputs: Vec<OutputDescriptor>,
    },
}

impl LevelTarget {
    /// A percent target with a single derived GLB output.
    pub fn percent(percent: f64) -> Self {
        LevelTarget::Percent {
            percent,
            outputs: vec![OutputDescriptor::derived(MeshFormat::Glb)],
        }
    }

    /// A ceiling target with a single derived GLB output.
    pub fn ceiling(max_triangles: u64) -> Self {
        LevelTarget::TriangleCeiling {
            max_triangles,
            outputs: vec![OutputDescriptor::derived(MeshFormat::Glb)],
        }
    }

    pub fn with_outputs(mut self, new_outputs: Vec<OutputDescriptor>) -> Self {
        match &mut self {
            LevelTarget::Percent { outputs, .. } | LevelTarget::TriangleCeiling { outputs, .. } => {
                *outputs = new_outputs
            }
        }
        self
    }

    pub fn outputs(&self) -> &[OutputDescriptor] {
        match self {
            LevelTarget::Percent { outputs, .. } | LevelTarget::TriangleCeiling { outputs, .. } => {
                outputs
            }
        }
    }
}

/// Format a percent for file names and report columns: `80`, `12.5`.
pub fn format_percent(percent: f64) -> String {
    let text = format!("{:.6}", percent);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(80.0), "80");
        assert_eq!(format_percent(100.0), "100");
        assert_eq!(format_percent(12.5), "12.5");
        assert_eq!(format_percent(33.333_333_3), "33.333333");
    }

    #[test]
    fn test_derived_path() {
        let out = OutputDescriptor::derived(MeshFormat::Obj);
        let path = out.resolve(Path::new("/out/chair"), "chair", "40");
        assert_eq!(path, PathBuf::from("/out/chair/chair-40.obj"));
    }

    #[test]
    fn test_explicit_format_from_extension() {
        let out = OutputDescriptor::explicit("/tmp/x.stl");
        assert_eq!(out.format(), MeshFormat::Stl);
        assert!(!out.is_derived());
        assert_eq!(out.resolve(Path::new("/ignored"), "s", "1"), PathBuf::from("/tmp/x.stl"));

        let fallback = OutputDescriptor::explicit("/tmp/noext");
        assert_eq!(fallback.format(), MeshFormat::Glb);
    }

    #[test]
    fn test_with_options() {
        let out = OutputDescriptor::derived(MeshFormat::Glb)
            .with_options(ExportOptions { include_cameras: true });
        assert!(out.options().include_cameras);
    }
}
