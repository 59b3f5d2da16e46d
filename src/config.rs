use std::path::Path;

use anyhow::{Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_PREFIX_CHARS};
use crate::semantic::DEFAULT_MODEL_ID;
use crate::util::read_json;

pub const DEFAULT_NOISE_FLOOR: f64 = 0.55;
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.65;
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.50;
pub const DEFAULT_HYBRID_FUZZY_WEIGHT: f64 = 0.40;
pub const DEFAULT_TOPIC_PRIOR_MAX: f64 = 0.10;
pub const DEFAULT_NULL_SIMILARITY_THRESHOLD: f64 = 0.80;
pub const DEFAULT_BOOTSTRAP_ITERATIONS: usize = 1000;
pub const DEFAULT_BOOTSTRAP_SEED: u64 = 42;
pub const DEFAULT_MCNEMAR_MIN_PAIRS: usize = 10;

/// Upper bound on the topic prior bonus in hybrid matching.
pub const TOPIC_PRIOR_CAP: f64 = 0.10;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Fuzzy,
    Semantic,
    #[default]
    Hybrid,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fuzzy => "fuzzy",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Tunable parameters of one analysis run.
///
/// The noise floor and null-similarity threshold are empirically tuned;
/// the defaults are the values calibrated on the reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub match_mode: MatchMode,
    pub noise_floor: f64,
    pub semantic_threshold: f64,
    pub fuzzy_threshold: f64,
    pub hybrid_fuzzy_weight: f64,
    pub topic_prior_max: f64,
    pub null_similarity_threshold: f64,
    pub bootstrap_iterations: usize,
    pub bootstrap_seed: u64,
    pub mcnemar_min_pairs: usize,
    pub cache_prefix_chars: usize,
    pub cache_max_entries: u64,
    pub embedding_model_id: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::default(),
            noise_floor: DEFAULT_NOISE_FLOOR,
            semantic_threshold: DEFAULT_SEMANTIC_THRESHOLD,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            hybrid_fuzzy_weight: DEFAULT_HYBRID_FUZZY_WEIGHT,
            topic_prior_max: DEFAULT_TOPIC_PRIOR_MAX,
            null_similarity_threshold: DEFAULT_NULL_SIMILARITY_THRESHOLD,
            bootstrap_iterations: DEFAULT_BOOTSTRAP_ITERATIONS,
            bootstrap_seed: DEFAULT_BOOTSTRAP_SEED,
            mcnemar_min_pairs: DEFAULT_MCNEMAR_MIN_PAIRS,
            cache_prefix_chars: DEFAULT_CACHE_PREFIX_CHARS,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            embedding_model_id: DEFAULT_MODEL_ID.to_string(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        read_json(path, "config")
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("noise_floor", self.noise_floor),
            ("semantic_threshold", self.semantic_threshold),
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("hybrid_fuzzy_weight", self.hybrid_fuzzy_weight),
            ("topic_prior_max", self.topic_prior_max),
            ("null_similarity_threshold", self.null_similarity_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                bail!("config field {field} must lie in [0, 1], got {value}");
            }
        }

        if self.topic_prior_max > TOPIC_PRIOR_CAP {
            bail!(
                "config field topic_prior_max must not exceed {TOPIC_PRIOR_CAP}, got {}",
                self.topic_prior_max
            );
        }

        if self.cache_max_entries == 0 {
            bail!("config field cache_max_entries must be positive");
        }

        if self.embedding_model_id.trim().is_empty() {
            bail!("config field embedding_model_id must not be empty");
        }

        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            noise_floor: self.noise_floor,
            semantic_threshold: self.semantic_threshold,
        }
    }
}

/// The two classifier gates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub noise_floor: f64,
    pub semantic_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            noise_floor: DEFAULT_NOISE_FLOOR,
            semantic_threshold: DEFAULT_SEMANTIC_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_file_keeps_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "noise_floor": 0.4, "match_mode": "semantic" }"#)
                .expect("partial config should deserialize");
        assert_eq!(config.noise_floor, 0.4);
        assert_eq!(config.match_mode, MatchMode::Semantic);
        assert_eq!(config.semantic_threshold, DEFAULT_SEMANTIC_THRESHOLD);
        assert_eq!(config.null_similarity_threshold, 0.80);
        config.validate().expect("config should be valid");
    }

    #[test]
    fn validate_names_offending_field() {
        let config = AnalysisConfig {
            semantic_threshold: 1.5,
            ..AnalysisConfig::default()
        };
        let error = config.validate().expect_err("out-of-range threshold");
        assert!(
            error.to_string().contains("semantic_threshold"),
            "unexpected error: {error}"
        );

        let config = AnalysisConfig {
            topic_prior_max: 0.2,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            cache_max_entries: 0,
            ..AnalysisConfig::default()
        };
        let error = config.validate().expect_err("zero cache capacity");
        assert!(error.to_string().contains("cache_max_entries"));
    }
}
