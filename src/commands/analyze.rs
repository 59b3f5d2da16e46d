use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::classify::{
    EnsembleDimension, Metrics, classify, compute_metrics, ensemble_filter, metrics_by_category,
    metrics_by_model, metrics_by_strategy,
};
use crate::cli::AnalyzeArgs;
use crate::config::{AnalysisConfig, Thresholds};
use crate::model::{ClassifiedRecord, GroundTruthCatalog, Outcome};
use crate::stats::{BootstrapInterval, StatResult, bootstrap_metrics};

use super::inputs::{load_inputs, resolve_config};
use super::session::{RunRecorder, build_embedder, score_inputs};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub thresholds: Thresholds,
    pub overall: Metrics,
    pub outcome_counts: BTreeMap<Outcome, usize>,
    pub noise_filtered: usize,
    pub null_filtered: usize,
    pub by_strategy: BTreeMap<String, Metrics>,
    pub by_model: BTreeMap<String, Metrics>,
    pub by_category: BTreeMap<String, Metrics>,
    pub bootstrap: BTreeMap<String, StatResult<BootstrapInterval>>,
    pub ensemble: Option<EnsembleReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleReport {
    pub dimension: EnsembleDimension,
    pub agreement_threshold: usize,
    pub validated_triples: usize,
    pub downgraded_true_positives: usize,
    pub dropped_false_positives: usize,
    pub overall: Metrics,
    pub by_category: BTreeMap<String, Metrics>,
}

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let mut config = resolve_config(&args.inputs)?;
    if let Some(iterations) = args.bootstrap_iterations {
        config.bootstrap_iterations = iterations;
    }
    if let Some(seed) = args.bootstrap_seed {
        config.bootstrap_seed = seed;
    }

    let inputs = load_inputs(&args.inputs)?;
    let mut recorder = RunRecorder::start("analyze", &args.inputs.out_dir)?;
    let mut embedder = build_embedder(&config, args.inputs.cache_db.as_deref())?;
    let (scoring, strategy_label) = score_inputs(&inputs, &config, &mut embedder);

    let classified = classify(&scoring.files, &inputs.expectations, config.thresholds());
    for key in &classified.missing_expectations {
        warn!(file = %key, "no expectation for detection file; skipped");
        recorder.warn(format!("missing expectation: {key}"));
    }
    if scoring.summary.embedding_errors > 0 {
        recorder.warn(format!(
            "{} detections degraded by embedding errors",
            scoring.summary.embedding_errors
        ));
    }

    let ensemble = args.ensemble.map(|dimension| {
        ensemble_filter(&classified.records, dimension, args.agreement_threshold)
    });

    let mut report = build_metrics_report(&classified.records, &inputs.catalog, &config);
    if !report.bootstrap.values().all(StatResult::is_computed) {
        recorder.warn("bootstrap intervals unavailable for this record set");
    }
    report.noise_filtered = classified.noise_filtered_total();
    report.null_filtered = classified.null_filtered_total();
    report.ensemble = ensemble.as_ref().map(|result| EnsembleReport {
        dimension: result.dimension,
        agreement_threshold: result.agreement_threshold,
        validated_triples: result.validated_triples,
        downgraded_true_positives: result.downgraded_true_positives,
        dropped_false_positives: result.dropped_false_positives,
        overall: compute_metrics(&result.records),
        by_category: metrics_by_category(&result.records, &inputs.catalog),
    });

    recorder.write_output("classified_records", "classified_records.json", &classified.records)?;
    recorder.write_output("compliance", "compliance.json", &classified.compliance)?;
    if let Some(result) = ensemble.as_ref() {
        recorder.write_output("ensemble_records", "ensemble_records.json", &result.records)?;
    }
    recorder.write_output("metrics", "metrics.json", &report)?;

    info!(
        tp = report.overall.tp,
        fp = report.overall.fp,
        fn_count = report.overall.fn_,
        precision = report.overall.precision,
        recall = report.overall.recall,
        f1 = report.overall.f1,
        "analysis completed"
    );

    recorder.finish(
        &inputs,
        &config,
        strategy_label,
        &scoring.summary,
        embedder.cache().stats(),
    )?;
    Ok(())
}

/// Aggregate metrics, breakdowns and bootstrap intervals for one record set.
pub fn build_metrics_report(
    records: &[ClassifiedRecord],
    catalog: &GroundTruthCatalog,
    config: &AnalysisConfig,
) -> MetricsReport {
    let mut outcome_counts = BTreeMap::new();
    for record in records {
        *outcome_counts.entry(record.outcome).or_insert(0) += 1;
    }

    MetricsReport {
        thresholds: config.thresholds(),
        overall: compute_metrics(records),
        outcome_counts,
        noise_filtered: 0,
        null_filtered: 0,
        by_strategy: metrics_by_strategy(records),
        by_model: metrics_by_model(records),
        by_category: metrics_by_category(records, catalog),
        bootstrap: bootstrap_metrics(
            records,
            config.bootstrap_iterations,
            config.bootstrap_seed,
        ),
        ensemble: None,
    }
}
