use anyhow::{Context, Result};

use crate::classify::{parse_grid, sensitivity_search};
use crate::cli::SweepArgs;

use super::inputs::{load_inputs, resolve_config};
use super::session::{RunRecorder, build_embedder, score_inputs};

pub fn run(args: SweepArgs) -> Result<()> {
    let noise_floors = parse_grid(&args.noise_floors).context("invalid --noise-floors")?;
    let semantic_thresholds =
        parse_grid(&args.semantic_thresholds).context("invalid --semantic-thresholds")?;

    let config = resolve_config(&args.inputs)?;
    let inputs = load_inputs(&args.inputs)?;
    let mut recorder = RunRecorder::start("sweep", &args.inputs.out_dir)?;
    let mut embedder = build_embedder(&config, args.inputs.cache_db.as_deref())?;
    let (scoring, strategy_label) = score_inputs(&inputs, &config, &mut embedder);

    let report = sensitivity_search(
        &scoring.files,
        &inputs.expectations,
        &noise_floors,
        &semantic_thresholds,
    );
    if report.optimal.is_none() {
        recorder.warn("empty threshold grid; no optimal configuration selected");
    }

    recorder.write_output("sensitivity", "sensitivity.json", &report)?;
    recorder.finish(
        &inputs,
        &config,
        strategy_label,
        &scoring.summary,
        embedder.cache().stats(),
    )?;
    Ok(())
}
