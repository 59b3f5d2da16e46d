use serde::Serialize;
use tracing::info;

use crate::cache::CachedEmbedder;
use crate::config::{AnalysisConfig, MatchMode};
use crate::model::{Detection, DetectionFile, GroundTruthItem, ScoredDetection, ScoredFile};

use super::embedding::{MatchStrategy, semantic_match};
use super::fuzzy::fuzzy_match;
use super::hybrid::{HybridParams, hybrid_match};
use super::null_filter::{NullResponseFilter, NullVerdict};
use super::{METHOD_EMBEDDING_ERROR, METHOD_NO_TEXT, MatchResult};

/// Dispatches one detection to the configured matching mode.
///
/// Semantic mode scores with a zero threshold so every detection keeps its
/// best guess; acceptance is the classifier's decision.
pub struct SimilarityMatcher<'a> {
    catalog: &'a [GroundTruthItem],
    mode: MatchMode,
    fuzzy_threshold: f64,
    hybrid: HybridParams,
    strategy: Box<dyn MatchStrategy>,
}

impl<'a> SimilarityMatcher<'a> {
    pub fn new(
        catalog: &'a [GroundTruthItem],
        config: &AnalysisConfig,
        strategy: Box<dyn MatchStrategy>,
    ) -> Self {
        Self {
            catalog,
            mode: config.match_mode,
            fuzzy_threshold: config.fuzzy_threshold,
            hybrid: HybridParams {
                fuzzy_threshold: config.fuzzy_threshold,
                semantic_threshold: config.semantic_threshold,
                fuzzy_weight: config.hybrid_fuzzy_weight,
                topic_prior_max: config.topic_prior_max,
            },
            strategy,
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn strategy_label(&self) -> &'static str {
        self.strategy.label()
    }

    pub fn score(&self, detection: &Detection, embedder: &mut CachedEmbedder) -> MatchResult {
        match self.mode {
            MatchMode::Fuzzy => fuzzy_match(detection, self.catalog, self.fuzzy_threshold),
            MatchMode::Semantic => {
                semantic_match(detection, self.catalog, self.strategy.as_ref(), embedder, 0.0)
            }
            MatchMode::Hybrid => hybrid_match(
                detection,
                self.catalog,
                self.strategy.as_ref(),
                embedder,
                self.hybrid,
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoringSummary {
    pub files: usize,
    pub raw_misconceptions: usize,
    pub null_filtered_keyword: usize,
    pub null_filtered_semantic: usize,
    pub scored: usize,
    pub embedding_errors: usize,
    pub no_text: usize,
}

#[derive(Debug, Clone)]
pub struct ScoringOutput {
    pub files: Vec<ScoredFile>,
    pub summary: ScoringSummary,
}

/// Null-filters and matches every detection. This is the expensive step;
/// its output is reused for every threshold configuration.
pub fn score_files(
    files: &[DetectionFile],
    matcher: &SimilarityMatcher<'_>,
    null_filter: &NullResponseFilter,
    embedder: &mut CachedEmbedder,
) -> ScoringOutput {
    let mut summary = ScoringSummary {
        files: files.len(),
        ..ScoringSummary::default()
    };
    let mut scored_files = Vec::with_capacity(files.len());

    for file in files {
        let mut null_filtered = 0usize;
        let mut detections = Vec::with_capacity(file.misconceptions.len());

        for detection in &file.misconceptions {
            match null_filter.check(detection, embedder) {
                NullVerdict::Keyword { .. } => {
                    null_filtered += 1;
                    summary.null_filtered_keyword += 1;
                    continue;
                }
                NullVerdict::Semantic { .. } => {
                    null_filtered += 1;
                    summary.null_filtered_semantic += 1;
                    continue;
                }
                NullVerdict::NotNull => {}
            }

            let result = matcher.score(detection, embedder);
            match result.method.as_str() {
                METHOD_EMBEDDING_ERROR => summary.embedding_errors += 1,
                METHOD_NO_TEXT => summary.no_text += 1,
                _ => {}
            }

            detections.push(ScoredDetection {
                detection: detection.clone(),
                best_match_id: result.best_match_id,
                semantic_score: result.score,
                method: result.method,
            });
        }

        summary.raw_misconceptions += file.misconceptions.len();
        summary.scored += detections.len();
        scored_files.push(ScoredFile {
            key: file.key.clone(),
            raw_misconceptions: file.misconceptions.len(),
            null_filtered,
            detections,
        });
    }

    info!(
        files = summary.files,
        raw = summary.raw_misconceptions,
        scored = summary.scored,
        null_keyword = summary.null_filtered_keyword,
        null_semantic = summary.null_filtered_semantic,
        embedding_errors = summary.embedding_errors,
        mode = matcher.mode().as_str(),
        strategy = matcher.strategy_label(),
        "detections scored"
    );

    ScoringOutput {
        files: scored_files,
        summary,
    }
}
