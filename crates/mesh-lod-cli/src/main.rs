//! mesh-lod: batch level-of-detail generation from the command line.
//!
//! Reads every model under an input directory, writes one file per LOD
//! level and format, and records quality metrics as CSV reports.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=mesh_lod=info` - One line per pipeline state
//! - `RUST_LOG=mesh_lod::batch=debug` - Batch scheduling detail
//! - `RUST_LOG=mesh_kernel::timing=debug` - Kernel operation timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Default ladder (100/80/40/20) with weld-only repair
//! mesh-lod batch models/ lods/ --repair doubles
//!
//! # Triangle budgets, GLB and OBJ, four worker threads
//! mesh-lod batch models/ lods/ --max-triangles 50000 10000 --formats glb,obj --jobs 4
//!
//! # Inspect the ladder without touching any files
//! mesh-lod plan 200000 --lod 100 50 --max-triangles 5000
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use mesh_kernel::MeshFormat;
use mesh_lod::RepairPolicy;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{analyze, batch, plan, single};

/// mesh-lod - Generate decimated, repaired LOD ladders for 3D models.
#[derive(Parser)]
#[command(name = "mesh-lod")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs (without colour) to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every model under a directory
    Batch {
        /// Directory searched recursively for input models
        input_dir: PathBuf,

        /// Directory receiving one subdirectory per model plus the reports
        output_dir: PathBuf,

        /// Lighting environment (e.g. an HDR file) applied to every scene
        #[arg(long)]
        lighting: Option<PathBuf>,

        /// Repair policy: print (weld and fill holes), doubles (weld only), none
        #[arg(long)]
        repair: Option<RepairPolicy>,

        /// Percent of the original polygon count to keep, one per level
        #[arg(long = "lod", num_args = 1.., value_name = "PERCENT")]
        levels: Vec<f64>,

        /// Absolute triangle budget, one per level
        #[arg(long, num_args = 1.., value_name = "N")]
        max_triangles: Vec<u64>,

        /// Output formats written for every level
        #[arg(long, value_delimiter = ',', value_parser = parse_format)]
        formats: Vec<MeshFormat>,

        /// Include the framing camera in GLB outputs
        #[arg(long)]
        cameras: bool,

        /// Repair the source mesh once before the first level
        #[arg(long)]
        pre_repair: bool,

        /// Also write outputs to LOD/LOD-<level>/ directories
        #[arg(long)]
        mirror_levels: bool,

        /// Number of files processed concurrently
        #[arg(long, short)]
        jobs: Option<usize>,

        /// TOML configuration file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Process one model into explicitly named outputs
    Single {
        /// Input model
        input: PathBuf,

        /// Level as percent plus output path (format from extension)
        #[arg(
            long = "lod",
            num_args = 2,
            value_names = ["PERCENT", "OUT"],
            action = clap::ArgAction::Append
        )]
        levels: Vec<String>,

        /// Level as triangle budget plus output path
        #[arg(
            long,
            num_args = 2,
            value_names = ["N", "OUT"],
            action = clap::ArgAction::Append
        )]
        max_triangles: Vec<String>,

        /// Directory for the default ladder (default: lod_output/ next to the input)
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Repair policy: print, doubles, none
        #[arg(long, default_value = "doubles")]
        repair: RepairPolicy,

        /// Lighting environment applied to the scene
        #[arg(long)]
        lighting: Option<PathBuf>,
    },

    /// Re-import exported models and report their quality
    Analyze {
        /// Directory of exported models
        dir: PathBuf,

        /// CSV report path (default: <dir>/analyze_outputs.csv)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the LOD ladder planned for a polygon count
    Plan {
        /// Polygon count of the source model
        polygons: usize,

        /// Percent targets
        #[arg(long = "lod", num_args = 1.., value_name = "PERCENT")]
        levels: Vec<f64>,

        /// Triangle ceilings
        #[arg(long, num_args = 1.., value_name = "N")]
        max_triangles: Vec<u64>,
    },
}

fn parse_format(s: &str) -> std::result::Result<MeshFormat, String> {
    s.parse::<MeshFormat>().map_err(|e| e.to_string())
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool, log_file: Option<&PathBuf>) -> Result<()> {
    if quiet && log_file.is_none() {
        return Ok(());
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "mesh_lod=info,mesh_kernel=info",
            2 => "mesh_lod=debug,mesh_kernel=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {:?}", path))?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };
    let stderr_layer = (!quiet).then(|| fmt::layer().with_writer(std::io::stderr).compact());

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn report_error(e: &anyhow::Error) {
    if let Some(lod_err) = e.downcast_ref::<mesh_lod::LodError>() {
        eprintln!("{}: {}", "Error".red().bold(), lod_err);
        eprintln!("  {}: {}", "Code".cyan(), lod_err.code());
        eprintln!("  {}: {}", "Suggestion".green(), lod_err.recovery_suggestion());
        if let Some(location) = lod_err.location() {
            eprintln!("  {}: {}", "Location".yellow(), location.display());
        }
        for cause in e.chain().skip(1) {
            eprintln!("  {}: {}", "Caused by".yellow(), cause);
        }
    } else if let Some(mesh_err) = e.downcast_ref::<mesh_kernel::MeshError>() {
        eprintln!("{}: {}", "Error".red().bold(), mesh_err);
        eprintln!("  {}: {}", "Code".cyan(), mesh_err.code());
        eprintln!("  {}: {}", "Suggestion".green(), mesh_err.recovery_suggestion());
        if let Some(location) = mesh_err.location() {
            eprintln!("  {}: {}", "Location".yellow(), location);
        }
    } else {
        eprintln!("{}: {}", "Error".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {}: {}", "Caused by".yellow(), cause);
        }
    }
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();

    let result = init_tracing(cli.verbose, cli.quiet, cli.log_file.as_ref()).and_then(|()| {
        match &cli.command {
            Commands::Batch {
                input_dir,
                output_dir,
                lighting,
                repair,
                levels,
                max_triangles,
                formats,
                cameras,
                pre_repair,
                mirror_levels,
                jobs,
                config,
            } => batch::run(
                batch::BatchArgs {
                    input_dir,
                    output_dir,
                    lighting: lighting.as_deref(),
                    repair: *repair,
                    levels,
                    max_triangles,
                    formats,
                    cameras: *cameras,
                    pre_repair: *pre_repair,
                    mirror_levels: *mirror_levels,
                    jobs: *jobs,
                    config: config.as_deref(),
                },
                &cli,
            ),
            Commands::Single {
                input,
                levels,
                max_triangles,
                output_dir,
                repair,
                lighting,
            } => single::run(
                input,
                levels,
                max_triangles,
                output_dir.as_deref(),
                *repair,
                lighting.as_deref(),
                &cli,
            ),
            Commands::Analyze { dir, report } => analyze::run(dir, report.as_deref(), &cli),
            Commands::Plan {
                polygons,
                levels,
                max_triangles,
            } => plan::run(*polygons, levels, max_triangles, &cli),
        }
    });

    if let Err(e) = &result {
        if !cli.quiet {
            report_error(e);
        }
        std::process::exit(1);
    }

    Ok(())
}
