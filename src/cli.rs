use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::classify::EnsembleDimension;
use crate::config::MatchMode;

#[derive(Parser, Debug)]
#[command(
    name = "misconception-eval",
    version,
    about = "Match, classify and calibrate misconception detections against a ground-truth catalog"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Embed(EmbedArgs),
    Analyze(AnalyzeArgs),
    Sweep(SweepArgs),
    Compare(CompareArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbedRefreshMode {
    Full,
    MissingOrStale,
}

impl EmbedRefreshMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::MissingOrStale => "missing-or-stale",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    #[arg(long)]
    pub catalog: PathBuf,

    #[arg(long, default_value = ".cache/misconception-eval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub cache_db: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub model_id: Option<String>,

    #[arg(long, value_enum, default_value_t = EmbedRefreshMode::MissingOrStale)]
    pub refresh_mode: EmbedRefreshMode,
}

/// Inputs and overrides shared by every analysis subcommand.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    #[arg(long)]
    pub catalog: PathBuf,

    #[arg(long)]
    pub expectations: PathBuf,

    /// JSON Lines file, one detector output file per line.
    #[arg(long)]
    pub detections: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Persistent embedding store; embeddings stay in memory when omitted.
    #[arg(long)]
    pub cache_db: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub match_mode: Option<MatchMode>,

    #[arg(long)]
    pub noise_floor: Option<f64>,

    #[arg(long)]
    pub semantic_threshold: Option<f64>,

    #[arg(long)]
    pub fuzzy_threshold: Option<f64>,

    #[arg(long, default_value = "out")]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    #[arg(long, value_enum)]
    pub ensemble: Option<EnsembleDimension>,

    #[arg(long, default_value_t = 2)]
    pub agreement_threshold: usize,

    #[arg(long)]
    pub bootstrap_iterations: Option<usize>,

    #[arg(long)]
    pub bootstrap_seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    /// `start:stop:step` or a comma list.
    #[arg(long, default_value = "0.30:0.70:0.05")]
    pub noise_floors: String,

    #[arg(long, default_value = "0.50:0.90:0.05")]
    pub semantic_thresholds: String,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    #[arg(long, value_enum, default_value_t = EnsembleDimension::Strategy)]
    pub dimension: EnsembleDimension,

    #[arg(long)]
    pub mcnemar_min_pairs: Option<usize>,
}
