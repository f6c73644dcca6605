//! Per-level records, per-file summaries and the batch report files.
//!
//! The [`BatchReporter`] owns everything recorded during a run. Reports are
//! plain CSV:
//!
//! | file | rows |
//! |---|---|
//! | `analyze_inputs.csv` | one per input: baseline and polygons per level |
//! | `lod_records.csv` | one per (input, level) |
//! | `errors.csv` | one per recorded error |
//!
//! Rewriting all three after every file keeps partial results on disk if a
//! run is killed.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::analyzer::QualityReport;
use crate::error::{ErrorKind, LodError, LodResult};
use crate::handle::RegionId;
use crate::target::format_percent;

pub const INPUTS_REPORT: &str = "analyze_inputs.csv";
pub const RECORDS_REPORT: &str = "lod_records.csv";
pub const ERRORS_REPORT: &str = "errors.csv";

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// How the decimation step of a level went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecimationStatus {
    /// Ratio 1.0, the mesh was carried over.
    Identity,
    Reached,
    /// Exported at the complexity actually reached.
    Shortfall {
        target_polygons: usize,
        achieved_polygons: usize,
    },
}

impl DecimationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecimationStatus::Identity => "identity",
            DecimationStatus::Reached => "reached",
            DecimationStatus::Shortfall { .. } => "shortfall",
        }
    }
}

/// One successfully exported level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingRecord {
    pub filename: String,
    pub level: f64,
    pub polygon_count: usize,
    pub vertex_count: usize,
    pub non_manifold_count: usize,
    pub self_intersection_count: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub decimation: DecimationStatus,
    /// Repair ran but some parts still fail the manifold test.
    pub repair_incomplete: bool,
    pub outputs: Vec<PathBuf>,
}

impl ProcessingRecord {
    pub fn new(filename: impl Into<String>, level: f64, quality: &QualityReport) -> Self {
        Self {
            filename: filename.into(),
            level,
            polygon_count: quality.polygon_count,
            vertex_count: quality.vertex_count,
            non_manifold_count: quality.non_manifold_count(),
            self_intersection_count: quality.self_intersection_count(),
            elapsed: Duration::ZERO,
            decimation: DecimationStatus::Reached,
            repair_incomplete: false,
            outputs: Vec::new(),
        }
    }
}

/// One recoverable error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub filename: String,
    /// The level being processed, if the error is tied to one.
    pub level: Option<f64>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    /// Record a per-file error with its full cause chain. Batch-level
    /// errors have no record form and return `None`.
    pub fn from_error(filename: impl Into<String>, level: Option<f64>, err: &LodError) -> Option<Self> {
        let kind = err.kind()?;
        let mut message = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            let _ = write!(message, ": {}", cause);
            source = cause.source();
        }
        Some(Self {
            filename: filename.into(),
            level,
            kind,
            message,
        })
    }
}

/// Everything recorded for one input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub filename: String,
    /// Metrics of the pristine mesh; `None` if the file never imported.
    pub baseline: Option<QualityReport>,
    pub levels: Vec<ProcessingRecord>,
    pub errors: Vec<ErrorRecord>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Import, planning or export failed, so some levels are missing.
    pub failed: bool,
}

impl FileSummary {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            baseline: None,
            levels: Vec::new(),
            errors: Vec::new(),
            elapsed: Duration::ZERO,
            failed: false,
        }
    }

    /// Append an error record. Errors other than decimation shortfalls
    /// mark the file as failed.
    pub fn record_error(&mut self, level: Option<f64>, err: &LodError) {
        if let Some(record) = ErrorRecord::from_error(&self.filename, level, err) {
            if record.kind != ErrorKind::Decimation {
                self.failed = true;
            }
            self.errors.push(record);
        }
    }

    pub fn level(&self, percent: f64) -> Option<&ProcessingRecord> {
        self.levels.iter().find(|r| (r.level - percent).abs() < 1e-6)
    }
}

/// Totals of a run, serialized for `--format json`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub files_processed: usize,
    pub files_failed: usize,
    pub levels_written: usize,
    pub decimation_shortfalls: usize,
    pub error_count: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub report_files: Vec<PathBuf>,
    pub files: Vec<FileSummary>,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} file(s) processed, {} failed, {} level(s) written in {}",
            self.files_processed,
            self.files_failed,
            self.levels_written,
            format_elapsed(self.elapsed)
        )?;
        if self.decimation_shortfalls > 0 {
            writeln!(f, "{} level(s) exported above their target", self.decimation_shortfalls)?;
        }
        if self.error_count > 0 {
            writeln!(f, "{} error(s) recorded", self.error_count)?;
        }
        Ok(())
    }
}

/// Accumulates per-file outcomes for a run.
#[derive(Debug)]
pub struct BatchReporter {
    files: Vec<FileSummary>,
    started: Instant,
}

impl Default for BatchReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReporter {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn observe(&mut self, summary: FileSummary) {
        debug!(
            file = %summary.filename,
            levels = summary.levels.len(),
            errors = summary.errors.len(),
            "Recorded file"
        );
        self.files.push(summary);
    }

    pub fn files(&self) -> &[FileSummary] {
        &self.files
    }

    pub fn records(&self) -> impl Iterator<Item = &ProcessingRecord> {
        self.files.iter().flat_map(|f| f.levels.iter())
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.files.iter().flat_map(|f| f.errors.iter())
    }

    pub fn summary(&self, report_files: Vec<PathBuf>) -> BatchSummary {
        BatchSummary {
            files_processed: self.files.len(),
            files_failed: self.files.iter().filter(|f| f.failed).count(),
            levels_written: self.records().count(),
            decimation_shortfalls: self
                .records()
                .filter(|r| matches!(r.decimation, DecimationStatus::Shortfall { .. }))
                .count(),
            error_count: self.errors().count(),
            elapsed: self.started.elapsed(),
            report_files,
            files: self.files.clone(),
        }
    }

    /// Every level seen in the run, largest first.
    fn level_columns(&self) -> Vec<f64> {
        let mut levels = BTreeMap::new();
        for record in self.records() {
            levels.insert(Reverse((record.level * 1e6).round() as i64), record.level);
        }
        levels.into_values().collect()
    }

    /// `analyze_inputs.csv`.
    pub fn inputs_csv(&self) -> String {
        let levels = self.level_columns();
        let mut out = String::new();

        let mut header = vec!["Filename".to_string(), "Start Polys".to_string()];
        header.extend(levels.iter().map(|l| format!("Polys {}%", format_percent(*l))));
        header.extend(
            ["Elapsed Time", "Non-Manifold Parts", "Self Intersections"].map(String::from),
        );
        push_row(&mut out, &header);

        for file in &self.files {
            let mut row = vec![file.filename.clone()];
            row.push(
                file.baseline
                    .as_ref()
                    .map(|b| b.polygon_count.to_string())
                    .unwrap_or_default(),
            );
            for level in &levels {
                row.push(
                    file.level(*level)
                        .map(|r| r.polygon_count.to_string())
                        .unwrap_or_default(),
                );
            }
            row.push(format_elapsed(file.elapsed));
            match &file.baseline {
                Some(baseline) => {
                    row.push(join_regions(baseline.non_manifold_regions.iter()));
                    row.push(join_regions(baseline.self_intersecting_regions.iter()));
                }
                None => row.extend([String::new(), String::new()]),
            }
            push_row(&mut out, &row);
        }
        out
    }

    /// `lod_records.csv`.
    pub fn records_csv(&self) -> String {
        let mut out = String::new();
        push_row(
            &mut out,
            &[
                "Filename",
                "Level",
                "Polygons",
                "Vertices",
                "Non-Manifold Parts",
                "Self Intersecting Parts",
                "Elapsed Time",
                "Decimation",
                "Repair Incomplete",
                "Outputs",
            ]
            .map(String::from),
        );
        for record in self.records() {
            let outputs: Vec<String> = record
                .outputs
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            push_row(
                &mut out,
                &[
                    record.filename.clone(),
                    format_percent(record.level),
                    record.polygon_count.to_string(),
                    record.vertex_count.to_string(),
                    record.non_manifold_count.to_string(),
                    record.self_intersection_count.to_string(),
                    format_elapsed(record.elapsed),
                    record.decimation.as_str().to_string(),
                    record.repair_incomplete.to_string(),
                    outputs.join(";"),
                ],
            );
        }
        out
    }

    /// `errors.csv`.
    pub fn errors_csv(&self) -> String {
        let mut out = String::new();
        push_row(&mut out, &["Filename", "Level", "Kind", "Message"].map(String::from));
        for error in self.errors() {
            push_row(
                &mut out,
                &[
                    error.filename.clone(),
                    error.level.map(format_percent).unwrap_or_default(),
                    error.kind.to_string(),
                    error.message.clone(),
                ],
            );
        }
        out
    }

    /// Write all three reports into `dir`, returning their paths.
    pub fn write_reports(&self, dir: &Path) -> LodResult<Vec<PathBuf>> {
        let reports = [
            (INPUTS_REPORT, self.inputs_csv()),
            (RECORDS_REPORT, self.records_csv()),
            (ERRORS_REPORT, self.errors_csv()),
        ];
        let mut written = Vec::with_capacity(reports.len());
        for (name, contents) in reports {
            let path = dir.join(name);
            write_report(&path, &contents)?;
            written.push(path);
        }
        Ok(written)
    }
}

pub(crate) fn write_report(path: &Path, contents: &str) -> LodResult<()> {
    std::fs::write(path, contents).map_err(|source| LodError::Report {
        path: path.to_path_buf(),
        source,
    })
}

fn join_regions<'a>(regions: impl Iterator<Item = &'a RegionId>) -> String {
    regions.map(|r| r.name.as_str()).collect::<Vec<_>>().join(";")
}

/// Elapsed time as `HH:MM:SS`, rounded down to the second.
pub fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Quote a field if it contains a delimiter, quote or line break.
pub fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub(crate) fn push_row(out: &mut String, fields: &[String]) {
    let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}
