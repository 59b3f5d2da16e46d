use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::classify::{ClassificationResult, EnsembleDimension, Metrics, classify, metrics_by};
use crate::cli::CompareArgs;
use crate::config::Thresholds;
use crate::model::Outcome;
use crate::stats::{
    CliffsDeltaResult, CochranQResult, KappaResult, PairKey, PairwiseMcNemar, StatResult,
    cliffs_delta, cochran_q, cohens_kappa, correctness_by_group, file_correctness,
    pairwise_mcnemar,
};

use super::inputs::{load_inputs, resolve_config};
use super::session::{RunRecorder, build_embedder, score_inputs};

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub files: usize,
    pub correct_files: usize,
    pub file_accuracy: f64,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairwiseStat<T> {
    pub first: String,
    pub second: String,
    pub result: StatResult<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub dimension: EnsembleDimension,
    pub thresholds: Thresholds,
    pub groups: BTreeMap<String, GroupSummary>,
    pub mcnemar: Vec<PairwiseMcNemar>,
    pub cochran_q: StatResult<CochranQResult>,
    pub kappa: Vec<PairwiseStat<KappaResult>>,
    pub cliffs_delta: Vec<PairwiseStat<CliffsDeltaResult>>,
}

pub fn run(args: CompareArgs) -> Result<()> {
    let mut config = resolve_config(&args.inputs)?;
    if let Some(min_pairs) = args.mcnemar_min_pairs {
        config.mcnemar_min_pairs = min_pairs;
    }

    let inputs = load_inputs(&args.inputs)?;
    let mut recorder = RunRecorder::start("compare", &args.inputs.out_dir)?;
    let mut embedder = build_embedder(&config, args.inputs.cache_db.as_deref())?;
    let (scoring, strategy_label) = score_inputs(&inputs, &config, &mut embedder);

    let classified = classify(&scoring.files, &inputs.expectations, config.thresholds());
    let report = build_comparison(&classified, args.dimension, config.mcnemar_min_pairs);
    if report.groups.len() < 2 {
        recorder.warn(format!(
            "only {} {} group(s); pairwise tests are empty",
            report.groups.len(),
            args.dimension.as_str()
        ));
    }

    info!(
        dimension = args.dimension.as_str(),
        groups = report.groups.len(),
        pairs = report.mcnemar.len(),
        "comparison completed"
    );

    recorder.write_output("comparison", "comparison.json", &report)?;
    recorder.finish(
        &inputs,
        &config,
        strategy_label,
        &scoring.summary,
        embedder.cache().stats(),
    )?;
    Ok(())
}

/// Statistical comparison of the members of `dimension`.
///
/// McNemar, Cochran's Q and kappa work on per-file correctness paired by the
/// remaining key fields; Cliff's delta compares the similarity scores of the
/// detections each member produced.
pub fn build_comparison(
    classified: &ClassificationResult,
    dimension: EnsembleDimension,
    mcnemar_min_pairs: usize,
) -> ComparisonReport {
    let correctness = file_correctness(classified);
    let groups = correctness_by_group(&correctness, dimension);

    let metrics = metrics_by(&classified.records, |record| {
        dimension.member_of(record).to_string()
    });
    let summaries = groups
        .iter()
        .map(|(name, series)| {
            let correct_files = series.values().filter(|correct| **correct).count();
            let summary = GroupSummary {
                files: series.len(),
                correct_files,
                file_accuracy: if series.is_empty() {
                    0.0
                } else {
                    correct_files as f64 / series.len() as f64
                },
                metrics: metrics.get(name).copied().unwrap_or_default(),
            };
            (name.clone(), summary)
        })
        .collect::<BTreeMap<String, GroupSummary>>();

    let mut scores = BTreeMap::<String, Vec<f64>>::new();
    for record in &classified.records {
        if matches!(record.outcome, Outcome::FalseNegative | Outcome::Duplicate) {
            continue;
        }
        scores
            .entry(dimension.member_of(record).to_string())
            .or_default()
            .push(record.semantic_score);
    }

    let names = groups.keys().cloned().collect::<Vec<String>>();
    let mut kappa = Vec::new();
    let mut effect_sizes = Vec::new();
    for (index, first) in names.iter().enumerate() {
        for second in &names[index + 1..] {
            let (left, right) = shared_labels(&groups[first], &groups[second]);
            kappa.push(PairwiseStat {
                first: first.clone(),
                second: second.clone(),
                result: cohens_kappa(&left, &right),
            });

            let empty = Vec::new();
            effect_sizes.push(PairwiseStat {
                first: first.clone(),
                second: second.clone(),
                result: cliffs_delta(
                    scores.get(first).unwrap_or(&empty),
                    scores.get(second).unwrap_or(&empty),
                ),
            });
        }
    }

    ComparisonReport {
        dimension,
        thresholds: classified.thresholds,
        groups: summaries,
        mcnemar: pairwise_mcnemar(&groups, mcnemar_min_pairs),
        cochran_q: cochran_q(&groups),
        kappa,
        cliffs_delta: effect_sizes,
    }
}

fn shared_labels(
    first: &BTreeMap<PairKey, bool>,
    second: &BTreeMap<PairKey, bool>,
) -> (Vec<bool>, Vec<bool>) {
    first
        .iter()
        .filter_map(|(key, left)| second.get(key).map(|right| (*left, *right)))
        .unzip()
}
