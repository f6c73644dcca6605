//! mesh-lod single command - generate LODs for one model.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use mesh_lod::{
    DEFAULT_LEVELS, LevelTarget, Orchestrator, OutputDescriptor, PipelineSettings, RepairPolicy,
    format_elapsed,
};

use crate::{Cli, OutputFormat, output};

const DEFAULT_OUTPUT_DIR: &str = "lod_output";

/// Turn `--lod P OUT` and `--max-triangles N OUT` pairs into targets.
/// Without any pair the default ladder is written as GLB.
fn parse_targets(levels: &[String], max_triangles: &[String]) -> Result<Vec<LevelTarget>> {
    let mut targets = Vec::new();
    for pair in levels.chunks(2) {
        let [percent, out] = pair else {
            bail!("--lod expects a percent and an output path");
        };
        let percent: f64 = percent
            .parse()
            .with_context(|| format!("Invalid percent {:?}", percent))?;
        targets.push(
            LevelTarget::percent(percent).with_outputs(vec![OutputDescriptor::explicit(out)]),
        );
    }
    for pair in max_triangles.chunks(2) {
        let [count, out] = pair else {
            bail!("--max-triangles expects a triangle count and an output path");
        };
        let count: u64 = count
            .parse()
            .with_context(|| format!("Invalid triangle count {:?}", count))?;
        targets.push(LevelTarget::ceiling(count).with_outputs(vec![OutputDescriptor::explicit(out)]));
    }
    if targets.is_empty() {
        targets = DEFAULT_LEVELS.iter().map(|&p| LevelTarget::percent(p)).collect();
    }
    Ok(targets)
}

/// Directory holding `<stem>/` for the default ladder: `--output-dir`, or
/// `lod_output/` next to the input.
fn default_output_root(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DEFAULT_OUTPUT_DIR),
    }
}

pub fn run(
    input: &Path,
    levels: &[String],
    max_triangles: &[String],
    output_dir: Option<&Path>,
    repair: RepairPolicy,
    lighting: Option<&Path>,
    cli: &Cli,
) -> Result<()> {
    let targets = parse_targets(levels, max_triangles)?;
    let output_root = default_output_root(input, output_dir);

    let settings = PipelineSettings {
        lighting: lighting.map(Path::to_path_buf),
        repair,
        ..PipelineSettings::new(output_root)
    };

    output::info(
        &format!("Processing {} ({} level(s))...", input.display(), targets.len()),
        cli.format,
        cli.quiet,
    );
    let summary = Orchestrator::new(settings).process_file(input, &targets);

    match cli.format {
        OutputFormat::Json => {
            output::print(&summary, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                if let Some(baseline) = &summary.baseline {
                    println!("  {}: {}", "Source".cyan(), baseline);
                }
                for record in &summary.levels {
                    println!(
                        "  {} {}%: {} polygons, {} non-manifold, {} self-intersecting ({})",
                        "Level".cyan(),
                        mesh_lod::format_percent(record.level),
                        record.polygon_count,
                        record.non_manifold_count,
                        record.self_intersection_count,
                        record.decimation.as_str()
                    );
                    for path in &record.outputs {
                        println!("      {}", path.display());
                    }
                }
                for err in &summary.errors {
                    output::warning(&err.message, cli.format, cli.quiet);
                }
            }
        }
    }

    if summary.failed {
        let message = summary
            .errors
            .iter()
            .find(|e| e.kind != mesh_lod::ErrorKind::Decimation)
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "processing failed".into());
        bail!("{}: {}", summary.filename, message);
    }

    output::success(
        &format!(
            "Wrote {} level(s) in {}",
            summary.levels.len(),
            format_elapsed(summary.elapsed)
        ),
        cli.format,
        cli.quiet,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pairs_become_explicit_targets() {
        let targets = parse_targets(
            &strings(&["50", "half.glb", "10", "tiny.obj"]),
            &strings(&["2000", "budget.stl"]),
        )
        .unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(
            targets[1],
            LevelTarget::percent(10.0).with_outputs(vec![OutputDescriptor::explicit("tiny.obj")])
        );
        assert!(matches!(
            targets[2],
            LevelTarget::TriangleCeiling { max_triangles: 2000, .. }
        ));
        assert!(targets.iter().all(|t| !t.outputs()[0].is_derived()));
    }

    #[test]
    fn test_no_pairs_uses_default_ladder() {
        let targets = parse_targets(&[], &[]).unwrap();
        assert_eq!(targets.len(), DEFAULT_LEVELS.len());
        assert!(targets[0].outputs()[0].is_derived());
    }

    #[test]
    fn test_default_output_root_is_beside_input() {
        assert_eq!(
            default_output_root(Path::new("models/kidney.glb"), None),
            PathBuf::from("models/lod_output")
        );
        assert_eq!(
            default_output_root(Path::new("models/kidney.glb"), Some(Path::new("out"))),
            PathBuf::from("out")
        );
    }

    #[test]
    fn test_bad_percent_rejected() {
        assert!(parse_targets(&strings(&["half", "x.glb"]), &[]).is_err());
    }
}
