use tracing::warn;

use crate::cache::CachedEmbedder;
use crate::model::{Detection, GroundTruthItem};

use super::embedding::{MatchStrategy, SemanticScores, best_semantic_index, semantic_item_scores};
use super::fuzzy::{best_fuzzy_index, fuzzy_item_scores};
use super::text::{jaccard, token_set};
use super::{
    METHOD_EMBEDDING_ERROR, METHOD_HYBRID, METHOD_HYBRID_FALLBACK, METHOD_NO_MATCH,
    METHOD_NO_TEXT, MatchResult,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridParams {
    pub fuzzy_threshold: f64,
    pub semantic_threshold: f64,
    pub fuzzy_weight: f64,
    pub topic_prior_max: f64,
}

/// Bonus for token overlap between the detection topic and an item category.
pub(crate) fn topic_prior(topic: &str, category: &str, max_bonus: f64) -> f64 {
    let overlap = jaccard(&token_set(topic), &token_set(category));
    (overlap * max_bonus).clamp(0.0, max_bonus)
}

pub fn hybrid_match(
    detection: &Detection,
    catalog: &[GroundTruthItem],
    strategy: &dyn MatchStrategy,
    embedder: &mut CachedEmbedder,
    params: HybridParams,
) -> MatchResult {
    if !detection.has_text() {
        return MatchResult::unmatched(0.0, METHOD_NO_TEXT);
    }

    let semantic_scores = match semantic_item_scores(detection, catalog, strategy, embedder) {
        SemanticScores::Scored(scores) => scores,
        SemanticScores::NoText => vec![None; catalog.len()],
        SemanticScores::Failed(err) => {
            warn!(error = %err, detection = %detection.name, "detection embedding failed");
            return MatchResult::unmatched(0.0, METHOD_EMBEDDING_ERROR);
        }
    };
    let fuzzy_scores = fuzzy_item_scores(detection, catalog);

    let mut candidates = Vec::<usize>::with_capacity(2);
    if let Some(index) = best_fuzzy_index(&fuzzy_scores) {
        let score = fuzzy_scores[index].score;
        if score > 0.0 && score >= params.fuzzy_threshold {
            candidates.push(index);
        }
    }
    if let Some(index) = best_semantic_index(&semantic_scores) {
        let score = semantic_scores[index].unwrap_or(0.0);
        if score >= params.semantic_threshold && !candidates.contains(&index) {
            candidates.push(index);
        }
    }

    let mut method = METHOD_HYBRID;
    if candidates.is_empty() {
        // Best guess so score analysis always has a target, even when nothing
        // would be accepted.
        let fallback = best_semantic_index(&semantic_scores).or_else(|| {
            best_fuzzy_index(&fuzzy_scores).filter(|index| fuzzy_scores[*index].score > 0.0)
        });
        if let Some(index) = fallback {
            candidates.push(index);
            method = METHOD_HYBRID_FALLBACK;
        }
    }
    candidates.sort_unstable();

    let weight = params.fuzzy_weight.clamp(0.0, 1.0);
    let mut best: Option<(usize, f64)> = None;
    for index in candidates {
        let fuzzy = fuzzy_scores[index].score;
        let semantic = semantic_scores[index].unwrap_or(0.0);
        let prior = topic_prior(
            &detection.topic,
            &catalog[index].category,
            params.topic_prior_max,
        );
        let blended = (weight * fuzzy + (1.0 - weight) * semantic + prior).clamp(0.0, 1.0);
        match best {
            Some((_, current)) if blended <= current => {}
            _ => best = Some((index, blended)),
        }
    }

    match best {
        Some((index, score)) => MatchResult::matched(&catalog[index].id, score, method),
        None => MatchResult::unmatched(0.0, METHOD_NO_MATCH),
    }
}
