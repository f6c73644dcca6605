//! LOD planning: from requested budgets to incremental reduction ratios.
//!
//! Levels run largest first and each one simplifies the mesh left by the
//! previous level, so the ratio handed to the simplifier is relative to the
//! previous level's percent, not to the original:
//!
//! ```text
//! percents   100   80    40    20
//! ratios     1.0   0.8   0.5   0.5
//! ```
//!
//! The product of the ratios up to a level equals that level's percent / 100.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::{LodError, LodResult};
use crate::target::{LevelTarget, OutputDescriptor, format_percent};

/// Percents closer than one millionth of a percent are the same level, and
/// a planned percent carries at most six decimals.
const PERCENT_QUANTUM: f64 = 1e6;

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedLevel {
    /// Percent of the original polygon count, in (0, 100].
    pub percent: f64,
    /// Ratio to apply to the mesh produced by the previous level, in (0, 1].
    pub incremental_ratio: f64,
    /// Every output requested for this percent.
    pub outputs: Vec<OutputDescriptor>,
}

impl PlannedLevel {
    /// Label used in file names and report columns.
    pub fn label(&self) -> String {
        format_percent(self.percent)
    }
}

/// Resolve a target to a percent of `original_polygons`.
///
/// Ceilings resolve to `min(100, floor(max / original * 100))`.
pub fn resolve_percent(target: &LevelTarget, original_polygons: usize) -> LodResult<f64> {
    let percent = match target {
        LevelTarget::Percent { percent, .. } => *percent,
        LevelTarget::TriangleCeiling { max_triangles, .. } => {
            if original_polygons == 0 {
                return Err(LodError::invalid_plan(format!(
                    "ceiling of {} triangles cannot be resolved against a mesh with no polygons",
                    max_triangles
                )));
            }
            let floored = (*max_triangles as u128 * 100) / original_polygons as u128;
            floored.min(100) as f64
        }
    };

    if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
        return Err(LodError::invalid_plan(format!(
            "resolved percent {} is outside (0, 100]",
            percent
        )));
    }
    Ok(percent)
}

/// Build the ordered level sequence for a mesh of `original_polygons`.
///
/// Targets resolving to the same percent are merged into one level whose
/// outputs are the union of theirs, in first-seen order. Percents are
/// rounded to six decimals, so every level has a distinct label; a percent
/// that rounds to zero is rejected.
pub fn plan(original_polygons: usize, targets: &[LevelTarget]) -> LodResult<Vec<PlannedLevel>> {
    if targets.is_empty() {
        return Err(LodError::invalid_plan("no targets requested"));
    }

    let mut merged: BTreeMap<Reverse<i64>, (f64, Vec<OutputDescriptor>)> = BTreeMap::new();
    for target in targets {
        let percent = resolve_percent(target, original_polygons)?;
        let quantized = (percent * PERCENT_QUANTUM).round() as i64;
        if quantized == 0 {
            return Err(LodError::invalid_plan(format!(
                "percent {} is below the smallest level of 0.000001",
                percent
            )));
        }
        let (_, outputs) = merged
            .entry(Reverse(quantized))
            .or_insert_with(|| (quantized as f64 / PERCENT_QUANTUM, Vec::new()));
        for output in target.outputs() {
            if !outputs.contains(output) {
                outputs.push(output.clone());
            }
        }
    }

    let mut previous = 100.0;
    let levels: Vec<PlannedLevel> = merged
        .into_values()
        .map(|(percent, outputs)| {
            let incremental_ratio = (percent / previous).min(1.0);
            previous = percent;
            PlannedLevel {
                percent,
                incremental_ratio,
                outputs,
            }
        })
        .collect();

    debug!(
        target: "mesh_lod::planner",
        original_polygons,
        requested = targets.len(),
        levels = ?levels.iter().map(PlannedLevel::label).collect::<Vec<_>>(),
        "Planned levels"
    );
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_kernel::MeshFormat;
    use proptest::prelude::*;

    fn percents(levels: &[PlannedLevel]) -> Vec<f64> {
        levels.iter().map(|l| l.percent).collect()
    }

    #[test]
    fn test_standard_ladder() {
        let targets: Vec<_> = [20.0, 100.0, 40.0, 80.0].map(LevelTarget::percent).to_vec();
        let levels = plan(1000, &targets).unwrap();
        assert_eq!(percents(&levels), vec![100.0, 80.0, 40.0, 20.0]);

        let ratios: Vec<f64> = levels.iter().map(|l| l.incremental_ratio).collect();
        for (got, want) in ratios.iter().zip([1.0, 0.8, 0.5, 0.5]) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ceiling_resolution() {
        let percent = resolve_percent(&LevelTarget::ceiling(50_000), 200_000).unwrap();
        assert_eq!(percent, 25.0);

        // Floors, and clamps at 100.
        assert_eq!(resolve_percent(&LevelTarget::ceiling(999), 10_000).unwrap(), 9.0);
        assert_eq!(resolve_percent(&LevelTarget::ceiling(10_000_000), 10).unwrap(), 100.0);
    }

    #[test]
    fn test_empty_targets_rejected() {
        for n in [0, 1, 1_000_000] {
            let err = plan(n, &[]).unwrap_err();
            assert!(matches!(err, LodError::InvalidPlan { .. }));
        }
    }

    #[test]
    fn test_out_of_range_percent_rejected() {
        for bad in [0.0, -5.0, 100.5, f64::NAN] {
            let err = plan(100, &[LevelTarget::percent(50.0), LevelTarget::percent(bad)]);
            assert!(err.is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn test_ceiling_below_one_percent_rejected() {
        assert!(plan(10_000, &[LevelTarget::ceiling(50)]).is_err());
        assert!(plan(10_000, &[LevelTarget::ceiling(0)]).is_err());
    }

    #[test]
    fn test_ceiling_on_empty_mesh_rejected() {
        let err = plan(0, &[LevelTarget::ceiling(100)]).unwrap_err();
        assert!(matches!(err, LodError::InvalidPlan { .. }));
        // A percent target on an empty mesh is still a valid plan.
        assert!(plan(0, &[LevelTarget::percent(50.0)]).is_ok());
    }

    #[test]
    fn test_ties_merge_outputs() {
        let targets = vec![
            LevelTarget::percent(25.0),
            LevelTarget::ceiling(250).with_outputs(vec![
                OutputDescriptor::derived(MeshFormat::Glb),
                OutputDescriptor::derived(MeshFormat::Stl),
            ]),
            LevelTarget::percent(50.0),
        ];
        let levels = plan(1000, &targets).unwrap();
        assert_eq!(percents(&levels), vec![50.0, 25.0]);
        assert_eq!(
            levels[1].outputs,
            vec![
                OutputDescriptor::derived(MeshFormat::Glb),
                OutputDescriptor::derived(MeshFormat::Stl),
            ]
        );
        assert_relative_eq!(levels[0].incremental_ratio, 0.5);
        assert_relative_eq!(levels[1].incremental_ratio, 0.5);
    }

    #[test]
    fn test_near_identical_percents_merge() {
        let targets = vec![LevelTarget::percent(40.0), LevelTarget::percent(40.000_000_01)];
        assert_eq!(plan(100, &targets).unwrap().len(), 1);
    }

    #[test]
    fn test_tiny_percents_keep_distinct_labels() {
        let levels = plan(
            100,
            &[LevelTarget::percent(0.000_004), LevelTarget::percent(0.000_001)],
        )
        .unwrap();
        let labels: Vec<_> = levels.iter().map(PlannedLevel::label).collect();
        assert_eq!(labels, vec!["0.000004", "0.000001"]);

        for tiny in [1e-7, 4e-7] {
            let err = plan(100, &[LevelTarget::percent(tiny)]).unwrap_err();
            assert!(matches!(err, LodError::InvalidPlan { .. }));
        }
    }

    #[test]
    fn test_first_level_below_hundred() {
        let levels = plan(100, &[LevelTarget::percent(60.0), LevelTarget::percent(30.0)]).unwrap();
        assert_relative_eq!(levels[0].incremental_ratio, 0.6);
        assert_relative_eq!(levels[1].incremental_ratio, 0.5);
        assert_eq!(levels[1].label(), "30");
    }

    fn arb_target() -> impl Strategy<Value = LevelTarget> {
        prop_oneof![
            (0.01..=100.0f64).prop_map(LevelTarget::percent),
            (1u64..2_000_000).prop_map(LevelTarget::ceiling),
        ]
    }

    proptest! {
        #[test]
        fn proptest_plan_is_monotonic(
            original in 100usize..1_000_000,
            targets in prop::collection::vec(arb_target(), 1..8)
        ) {
            let Ok(levels) = plan(original, &targets) else {
                // Only ceilings under 1% may fail.
                let has_ceiling = targets
                    .iter()
                    .any(|t| matches!(t, LevelTarget::TriangleCeiling { .. }));
                prop_assert!(has_ceiling);
                return Ok(());
            };

            let mut product = 1.0;
            for pair in levels.windows(2) {
                prop_assert!(pair[0].percent > pair[1].percent);
            }
            for level in &levels {
                prop_assert!(level.incremental_ratio > 0.0 && level.incremental_ratio <= 1.0);
                product *= level.incremental_ratio;
                prop_assert!((product - level.percent / 100.0).abs() < 1e-9);
            }
        }

        #[test]
        fn proptest_plan_is_deterministic(
            original in 1usize..1_000_000,
            targets in prop::collection::vec(arb_target(), 1..8)
        ) {
            let first = plan(original, &targets).ok();
            let second = plan(original, &targets).ok();
            prop_assert_eq!(first, second);
        }
    }
}
