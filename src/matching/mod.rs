mod embedding;
mod fuzzy;
mod hybrid;
mod null_filter;
mod pipeline;
mod text;

use serde::Serialize;

pub(crate) const METHOD_NO_MATCH: &str = "no_match";
pub(crate) const METHOD_NO_TEXT: &str = "no_text";
pub(crate) const METHOD_EMBEDDING_ERROR: &str = "embedding_error";
pub(crate) const METHOD_SEMANTIC: &str = "semantic";
pub(crate) const METHOD_HYBRID: &str = "hybrid";
pub(crate) const METHOD_HYBRID_FALLBACK: &str = "hybrid_fallback";

/// Best catalog entry for one detection, before any acceptance decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub best_match_id: Option<String>,
    pub score: f64,
    pub method: String,
}

impl MatchResult {
    pub(crate) fn matched(id: &str, score: f64, method: &str) -> Self {
        Self {
            best_match_id: Some(id.to_string()),
            score,
            method: method.to_string(),
        }
    }

    pub(crate) fn unmatched(score: f64, method: &str) -> Self {
        Self {
            best_match_id: None,
            score,
            method: method.to_string(),
        }
    }
}

pub use embedding::{MatchStrategy, OnTheFlyStrategy, select_strategy};
#[cfg(test)]
pub(crate) use fuzzy::fuzzy_match;
pub use null_filter::{NULL_RESPONSE_TEMPLATES, NullResponseFilter};
pub use pipeline::{ScoringOutput, ScoringSummary, SimilarityMatcher, score_files};
