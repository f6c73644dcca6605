//! Batch configuration.
//!
//! A [`BatchConfig`] describes one batch run and can be saved and loaded as
//! TOML. Command-line flags override the values read from a file.
//!
//! # Example TOML
//!
//! ```toml
//! input_root = "models/"
//! output_root = "lods/"
//! lighting = "studio.hdr"
//! levels = [100.0, 50.0, 10.0]
//! max_triangles = [20000]
//! repair = "weld_duplicates_only"
//! formats = ["glb", "obj"]
//! jobs = 4
//!
//! [kernel]
//! weld_distance = 0.0001
//! crease_angle_degrees = 30.0
//! ```

use std::path::{Path, PathBuf};

use mesh_kernel::{ExportOptions, MeshFormat};
use serde::{Deserialize, Serialize};

use crate::kernel::KernelConfig;
use crate::repair_gate::RepairPolicy;
use crate::target::{LevelTarget, OutputDescriptor};

/// Percent ladder used when neither levels nor ceilings are given.
pub const DEFAULT_LEVELS: [f64; 4] = [100.0, 80.0, 40.0, 20.0];

/// Settings for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory searched recursively for input models.
    pub input_root: PathBuf,

    /// Directory receiving one subdirectory per input plus the reports.
    pub output_root: PathBuf,

    /// Environment lighting asset recorded in every scene.
    ///
    /// Default: None
    pub lighting: Option<PathBuf>,

    /// Percent levels. `None` means the default ladder, unless ceilings
    /// are given, in which case only the ceilings are produced.
    ///
    /// Default: None
    pub levels: Option<Vec<f64>>,

    /// Absolute triangle ceilings, resolved per file.
    ///
    /// Default: empty
    pub max_triangles: Vec<u64>,

    /// Default: weld_duplicates_only
    pub repair: RepairPolicy,

    /// Formats written for every level.
    ///
    /// Default: [glb]
    pub formats: Vec<MeshFormat>,

    /// Write the framing camera into GLB outputs.
    ///
    /// Default: false
    pub include_cameras: bool,

    /// Repair the pristine mesh after its baseline is recorded.
    ///
    /// Default: false
    pub pre_repair: bool,

    /// Also write every level to `<output_root>/LOD/LOD-<level>/`.
    ///
    /// Default: false
    pub mirror_level_dirs: bool,

    /// Files processed concurrently.
    ///
    /// Default: 1
    pub jobs: usize,

    /// Input extensions, case-insensitive, without the dot.
    ///
    /// Default: ["glb"]
    pub extensions: Vec<String>,

    /// Rewrite the reports after every file.
    ///
    /// Default: true
    pub flush_each_file: bool,

    pub kernel: KernelConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("."),
            output_root: PathBuf::from("lod_output"),
            lighting: None,
            levels: None,
            max_triangles: Vec::new(),
            repair: RepairPolicy::default(),
            formats: vec![MeshFormat::Glb],
            include_cameras: false,
            pre_repair: false,
            mirror_level_dirs: false,
            jobs: 1,
            extensions: vec!["glb".to_string()],
            flush_each_file: true,
            kernel: KernelConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_str = self.to_toml()?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Check values that deserialization alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("jobs must be at least 1".into()));
        }
        if self.formats.is_empty() {
            return Err(ConfigError::Invalid("at least one output format is required".into()));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("at least one input extension is required".into()));
        }
        if self.kernel.weld_distance < 0.0 || !self.kernel.weld_distance.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "weld_distance must be a non-negative number, got {}",
                self.kernel.weld_distance
            )));
        }
        Ok(())
    }

    /// The percent levels that will be requested.
    pub fn effective_levels(&self) -> Vec<f64> {
        match &self.levels {
            Some(levels) => levels.clone(),
            None if self.max_triangles.is_empty() => DEFAULT_LEVELS.to_vec(),
            None => Vec::new(),
        }
    }

    /// The outputs written for every level.
    pub fn outputs(&self) -> Vec<OutputDescriptor> {
        let options = ExportOptions {
            include_cameras: self.include_cameras,
        };
        self.formats
            .iter()
            .map(|format| OutputDescriptor::derived(*format).with_options(options))
            .collect()
    }

    /// Every target of the run: percent levels, then ceilings.
    pub fn targets(&self) -> Vec<LevelTarget> {
        let outputs = self.outputs();
        let percents = self
            .effective_levels()
            .into_iter()
            .map(|p| LevelTarget::percent(p).with_outputs(outputs.clone()));
        let ceilings = self
            .max_triangles
            .iter()
            .map(|&n| LevelTarget::ceiling(n).with_outputs(outputs.clone()));
        percents.chain(ceilings).collect()
    }

    /// True if `path` has one of the accepted input extensions.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
    }
}

/// Errors that can occur when loading or saving a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading or writing file.
    Io(std::io::Error),
    /// TOML parsing error.
    TomlParse(toml::de::Error),
    /// TOML serialization error.
    TomlSerialize(toml::ser::Error),
    /// A value outside its allowed range.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::TomlParse(e) => write!(f, "TOML parse error: {}", e),
            Self::TomlSerialize(e) => write!(f, "TOML serialize error: {}", e),
            Self::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::TomlParse(e) => Some(e),
            Self::TomlSerialize(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::TomlParse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets_are_ladder() {
        let config = BatchConfig::default();
        let targets = config.targets();
        assert_eq!(targets.len(), 4);
        assert_eq!(targets[1], LevelTarget::percent(80.0));
    }

    #[test]
    fn test_ceilings_replace_default_ladder() {
        let config = BatchConfig {
            max_triangles: vec![5000],
            ..BatchConfig::default()
        };
        assert_eq!(config.targets(), vec![LevelTarget::ceiling(5000)]);

        let both = BatchConfig {
            levels: Some(vec![50.0]),
            max_triangles: vec![5000],
            ..BatchConfig::default()
        };
        assert_eq!(both.targets().len(), 2);
    }

    #[test]
    fn test_outputs_follow_formats_and_cameras() {
        let config = BatchConfig {
            formats: vec![MeshFormat::Glb, MeshFormat::Stl],
            include_cameras: true,
            ..BatchConfig::default()
        };
        let outputs = config.outputs();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| o.options().include_cameras));
        assert_eq!(outputs[1].format(), MeshFormat::Stl);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BatchConfig {
            levels: Some(vec![100.0, 25.0]),
            repair: RepairPolicy::FillHolesAndWeld,
            jobs: 3,
            kernel: KernelConfig {
                crease_angle_degrees: Some(30.0),
                ..KernelConfig::default()
            },
            ..BatchConfig::new("in", "out")
        };
        let text = config.to_toml().unwrap();
        let back = BatchConfig::from_toml(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = BatchConfig::from_toml(
            r#"
            input_root = "models"
            repair = "none"
            formats = ["obj"]

            [kernel]
            weld_distance = 0.01
            "#,
        )
        .unwrap();
        assert_eq!(config.input_root, PathBuf::from("models"));
        assert_eq!(config.repair, RepairPolicy::None);
        assert_eq!(config.formats, vec![MeshFormat::Obj]);
        assert_eq!(config.jobs, 1);
        assert!(config.flush_each_file);
        assert_eq!(config.kernel.weld_distance, 0.01);
        assert_eq!(config.kernel.max_intersection_reports, 1);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            BatchConfig::from_toml("jobs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BatchConfig::from_toml("formats = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BatchConfig::from_toml("repair = \"sometimes\""),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("batch.toml");
        let config = BatchConfig::new("a", "b");
        config.save_toml(&path).unwrap();
        assert_eq!(BatchConfig::from_toml_file(&path).unwrap(), config);
        assert!(matches!(
            BatchConfig::from_toml_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_accepts_extensions() {
        let config = BatchConfig {
            extensions: vec!["glb".into(), "OBJ".into()],
            ..BatchConfig::default()
        };
        assert!(config.accepts(Path::new("a/b.GLB")));
        assert!(config.accepts(Path::new("c.obj")));
        assert!(!config.accepts(Path::new("d.stl")));
        assert!(!config.accepts(Path::new("noext")));
    }
}
