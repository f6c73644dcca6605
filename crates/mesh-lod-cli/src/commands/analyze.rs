//! mesh-lod analyze command - audit exported models.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use mesh_lod::{DefaultKernel, FileSceneIo, OUTPUTS_REPORT, audit_outputs};

use crate::{Cli, OutputFormat, output};

pub fn run(dir: &Path, report: Option<&Path>, cli: &Cli) -> Result<()> {
    output::info(
        &format!("Analyzing models under {}...", dir.display()),
        cli.format,
        cli.quiet,
    );

    let audit = audit_outputs(dir, &FileSceneIo, &DefaultKernel::default())?;
    let report_path = report
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.join(OUTPUTS_REPORT));
    audit.write_csv(&report_path)?;

    match cli.format {
        OutputFormat::Json => {
            output::print(&audit, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                for record in &audit.records {
                    let clean = record.non_manifold_parts.is_empty()
                        && record.self_intersecting_parts.is_empty();
                    println!(
                        "  {} {}: {} polygons",
                        if clean { "✓".green() } else { "✗".red() },
                        record.filename,
                        record.polygon_count
                    );
                    if !record.non_manifold_parts.is_empty() {
                        println!(
                            "      {}: {}",
                            "Non-manifold".yellow(),
                            record.non_manifold_parts.join(", ")
                        );
                    }
                    if !record.self_intersecting_parts.is_empty() {
                        println!(
                            "      {}: {}",
                            "Self-intersecting".yellow(),
                            record.self_intersecting_parts.join(", ")
                        );
                    }
                }
                for err in &audit.errors {
                    output::warning(
                        &format!("{}: {}", err.filename, err.message),
                        cli.format,
                        cli.quiet,
                    );
                }
                output::success(
                    &format!(
                        "{} file(s) analyzed, report saved to {}",
                        audit.records.len(),
                        report_path.display()
                    ),
                    cli.format,
                    cli.quiet,
                );
            }
        }
    }

    Ok(())
}
