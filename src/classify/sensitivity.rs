use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::Thresholds;
use crate::model::{ExpectationIndex, ScoredFile};

use super::classifier::classify;
use super::metrics::{Metrics, OutcomeCounts};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensitivityCell {
    pub noise_floor: f64,
    pub semantic_threshold: f64,
    pub metrics: Metrics,
    pub noise_filtered: usize,
    pub evaluated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensitivityReport {
    pub noise_floors: Vec<f64>,
    pub semantic_thresholds: Vec<f64>,
    pub cells: Vec<SensitivityCell>,
    pub optimal: Option<SensitivityCell>,
}

/// Exhaustive grid search over (noise floor, acceptance threshold).
///
/// Cells are evaluated in parallel and collected in grid order (noise floor
/// outer, threshold inner); the optimum is the first cell reaching the
/// highest F1.
pub fn sensitivity_search(
    files: &[ScoredFile],
    expectations: &ExpectationIndex,
    noise_floors: &[f64],
    semantic_thresholds: &[f64],
) -> SensitivityReport {
    let grid = noise_floors
        .iter()
        .flat_map(|noise_floor| {
            semantic_thresholds
                .iter()
                .map(move |semantic_threshold| Thresholds {
                    noise_floor: *noise_floor,
                    semantic_threshold: *semantic_threshold,
                })
        })
        .collect::<Vec<Thresholds>>();

    let cells = grid
        .par_iter()
        .map(|thresholds| evaluate_cell(files, expectations, *thresholds))
        .collect::<Vec<SensitivityCell>>();

    let optimal = select_optimal(&cells);
    if let Some(best) = optimal.as_ref() {
        info!(
            cells = cells.len(),
            noise_floor = best.noise_floor,
            semantic_threshold = best.semantic_threshold,
            f1 = best.metrics.f1,
            "sensitivity search completed"
        );
    } else {
        info!("sensitivity search skipped: empty grid");
    }

    SensitivityReport {
        noise_floors: noise_floors.to_vec(),
        semantic_thresholds: semantic_thresholds.to_vec(),
        cells,
        optimal,
    }
}

fn evaluate_cell(
    files: &[ScoredFile],
    expectations: &ExpectationIndex,
    thresholds: Thresholds,
) -> SensitivityCell {
    let result = classify(files, expectations, thresholds);
    let counts = OutcomeCounts::from_records(&result.records);
    SensitivityCell {
        noise_floor: thresholds.noise_floor,
        semantic_threshold: thresholds.semantic_threshold,
        metrics: counts.metrics(),
        noise_filtered: result.noise_filtered_total(),
        evaluated: result
            .compliance
            .iter()
            .map(|row| row.evaluated_misconceptions)
            .sum(),
    }
}

pub(crate) fn select_optimal(cells: &[SensitivityCell]) -> Option<SensitivityCell> {
    let mut best: Option<SensitivityCell> = None;
    for cell in cells {
        match best {
            Some(current) if cell.metrics.f1 <= current.metrics.f1 => {}
            _ => best = Some(*cell),
        }
    }
    best
}
