//! mesh-lod plan command - show the LOD ladder for a polygon count.

use anyhow::Result;
use colored::Colorize;
use mesh_lod::{DEFAULT_LEVELS, LevelTarget, PlannedLevel, plan};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct PlanResult {
    polygons: usize,
    levels: Vec<LevelInfo>,
}

#[derive(Serialize)]
struct LevelInfo {
    label: String,
    percent: f64,
    incremental_ratio: f64,
    expected_polygons: usize,
}

fn targets(levels: &[f64], max_triangles: &[u64]) -> Vec<LevelTarget> {
    let percents: &[f64] = if levels.is_empty() && max_triangles.is_empty() {
        &DEFAULT_LEVELS
    } else {
        levels
    };
    percents
        .iter()
        .map(|&p| LevelTarget::percent(p))
        .chain(max_triangles.iter().map(|&n| LevelTarget::ceiling(n)))
        .collect()
}

fn describe(polygons: usize, level: &PlannedLevel) -> LevelInfo {
    LevelInfo {
        label: level.label(),
        percent: level.percent,
        incremental_ratio: level.incremental_ratio,
        expected_polygons: (polygons as f64 * level.percent / 100.0).round() as usize,
    }
}

pub fn run(polygons: usize, levels: &[f64], max_triangles: &[u64], cli: &Cli) -> Result<()> {
    let planned = plan(polygons, &targets(levels, max_triangles))?;
    let result = PlanResult {
        polygons,
        levels: planned.iter().map(|level| describe(polygons, level)).collect(),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", format!("LOD plan for {} polygons", polygons).bold().underline());
                for level in &result.levels {
                    println!(
                        "  {} {:>8}%  ratio {:.4}  ~{} polygons",
                        "Level".cyan(),
                        level.label,
                        level.incremental_ratio,
                        level.expected_polygons
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_when_no_targets() {
        let planned = plan(1000, &targets(&[], &[])).unwrap();
        let labels: Vec<_> = planned.iter().map(|l| l.label()).collect();
        assert_eq!(labels, vec!["100", "80", "40", "20"]);
    }

    #[test]
    fn test_ceiling_only_skips_default_ladder() {
        let planned = plan(200_000, &targets(&[], &[50_000])).unwrap();
        assert_eq!(planned.len(), 1);
        let info = describe(200_000, &planned[0]);
        assert_eq!(info.label, "25");
        assert_eq!(info.expected_polygons, 50_000);
    }
}
