//! mesh-lod batch command - generate LODs for a directory of models.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use mesh_kernel::MeshFormat;
use mesh_lod::{BatchConfig, BatchRunner, LodError, RepairPolicy, format_elapsed};

use crate::{Cli, OutputFormat, output};

pub struct BatchArgs<'a> {
    pub input_dir: &'a Path,
    pub output_dir: &'a Path,
    pub lighting: Option<&'a Path>,
    pub repair: Option<RepairPolicy>,
    pub levels: &'a [f64],
    pub max_triangles: &'a [u64],
    pub formats: &'a [MeshFormat],
    pub cameras: bool,
    pub pre_repair: bool,
    pub mirror_levels: bool,
    pub jobs: Option<usize>,
    pub config: Option<&'a Path>,
}

/// Merge the config file (if any) with the command-line flags.
fn build_config(args: &BatchArgs<'_>) -> Result<BatchConfig, LodError> {
    let mut config = match args.config {
        Some(path) => BatchConfig::from_toml_file(path).map_err(|source| LodError::Config {
            path: Some(path.to_path_buf()),
            source,
        })?,
        None => BatchConfig::default(),
    };

    config.input_root = args.input_dir.to_path_buf();
    config.output_root = args.output_dir.to_path_buf();
    if let Some(lighting) = args.lighting {
        config.lighting = Some(lighting.to_path_buf());
    }
    if let Some(repair) = args.repair {
        config.repair = repair;
    }
    if !args.levels.is_empty() {
        config.levels = Some(args.levels.to_vec());
    }
    if !args.max_triangles.is_empty() {
        config.max_triangles = args.max_triangles.to_vec();
    }
    if !args.formats.is_empty() {
        config.formats = args.formats.to_vec();
    }
    config.include_cameras |= args.cameras;
    config.pre_repair |= args.pre_repair;
    config.mirror_level_dirs |= args.mirror_levels;
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    Ok(config)
}

pub fn run(args: BatchArgs<'_>, cli: &Cli) -> Result<()> {
    let config = build_config(&args)?;
    tracing::debug!(?config, "Effective batch configuration");
    let runner = BatchRunner::new(config)?;

    output::info(
        &format!(
            "Processing {} into {} ({} repair)...",
            args.input_dir.display(),
            args.output_dir.display(),
            runner.config().repair
        ),
        cli.format,
        cli.quiet,
    );

    let summary = runner.run()?;

    match cli.format {
        OutputFormat::Json => {
            output::print(&summary, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                for file in &summary.files {
                    let status = if file.failed {
                        "failed".red().bold()
                    } else {
                        "ok".green()
                    };
                    let start = file
                        .baseline
                        .as_ref()
                        .map(|b| b.polygon_count.to_string())
                        .unwrap_or_else(|| "-".into());
                    let ladder = file
                        .levels
                        .iter()
                        .map(|r| r.polygon_count.to_string())
                        .collect::<Vec<_>>()
                        .join(" → ");
                    println!(
                        "  {} [{}] {} → {} ({})",
                        file.filename.cyan(),
                        status,
                        start,
                        ladder,
                        format_elapsed(file.elapsed)
                    );
                    for err in &file.errors {
                        println!("      {}: {}", err.kind.as_str().yellow(), err.message);
                    }
                }
                if summary.files_failed > 0 {
                    output::warning(
                        &format!("{} file(s) had errors; see errors.csv", summary.files_failed),
                        cli.format,
                        cli.quiet,
                    );
                }
                output::success(summary.to_string().trim_end(), cli.format, cli.quiet);
                for path in &summary.report_files {
                    println!("  {}: {}", "Report".cyan(), path.display());
                }
            }
        }
    }

    Ok(())
}
