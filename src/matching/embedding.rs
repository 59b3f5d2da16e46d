use std::collections::HashMap;

use tracing::{info, warn};

use crate::cache::CachedEmbedder;
use crate::model::{Detection, GroundTruthItem};
use crate::semantic::{
    EmbeddingError, catalog_payload_for_embedding, cosine_similarity,
    detection_payload_for_embedding,
};

use super::{METHOD_EMBEDDING_ERROR, METHOD_NO_MATCH, METHOD_NO_TEXT, METHOD_SEMANTIC, MatchResult};

/// How catalog vectors are obtained when scoring one detection.
///
/// `Precomputed` embeds the whole catalog once up front and fails as a unit;
/// `OnTheFly` embeds (through the cache) per request and skips any item whose
/// embedding fails.
pub trait MatchStrategy: Send + Sync {
    fn label(&self) -> &'static str;

    /// Cosine similarity of `query` against every catalog item, in catalog
    /// order. `None` marks an item without a usable vector.
    fn catalog_similarities(
        &self,
        query: &[f32],
        catalog: &[GroundTruthItem],
        embedder: &mut CachedEmbedder,
    ) -> Vec<Option<f64>>;
}

#[derive(Debug, Clone, Default)]
pub struct CatalogEmbeddings {
    vectors: HashMap<String, Vec<f32>>,
}

impl CatalogEmbeddings {
    pub fn precompute(
        catalog: &[GroundTruthItem],
        embedder: &mut CachedEmbedder,
    ) -> Result<Self, EmbeddingError> {
        let mut vectors = HashMap::with_capacity(catalog.len());
        for item in catalog {
            let Some(payload) = catalog_payload_for_embedding(item) else {
                continue;
            };
            vectors.insert(item.id.clone(), embedder.embed(&payload)?);
        }

        info!(
            catalog_items = catalog.len(),
            embedded = vectors.len(),
            "catalog embeddings precomputed"
        );
        Ok(Self { vectors })
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }
}

pub struct PrecomputedStrategy {
    embeddings: CatalogEmbeddings,
}

impl PrecomputedStrategy {
    pub fn new(embeddings: CatalogEmbeddings) -> Self {
        Self { embeddings }
    }
}

impl MatchStrategy for PrecomputedStrategy {
    fn label(&self) -> &'static str {
        "precomputed"
    }

    fn catalog_similarities(
        &self,
        query: &[f32],
        catalog: &[GroundTruthItem],
        _embedder: &mut CachedEmbedder,
    ) -> Vec<Option<f64>> {
        catalog
            .iter()
            .map(|item| {
                self.embeddings
                    .get(&item.id)
                    .map(|vector| cosine_similarity(query, vector))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OnTheFlyStrategy;

impl MatchStrategy for OnTheFlyStrategy {
    fn label(&self) -> &'static str {
        "on_the_fly"
    }

    fn catalog_similarities(
        &self,
        query: &[f32],
        catalog: &[GroundTruthItem],
        embedder: &mut CachedEmbedder,
    ) -> Vec<Option<f64>> {
        catalog
            .iter()
            .map(|item| {
                let payload = catalog_payload_for_embedding(item)?;
                match embedder.embed(&payload) {
                    Ok(vector) => Some(cosine_similarity(query, &vector)),
                    Err(err) => {
                        warn!(item_id = %item.id, error = %err, "catalog embedding failed; item skipped");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Picks the precomputed strategy when the catalog embeds cleanly, otherwise
/// falls back to per-request embedding. Must run before any detection is scored.
pub fn select_strategy(
    catalog: &[GroundTruthItem],
    embedder: &mut CachedEmbedder,
) -> Box<dyn MatchStrategy> {
    match CatalogEmbeddings::precompute(catalog, embedder) {
        Ok(embeddings) => Box::new(PrecomputedStrategy::new(embeddings)),
        Err(err) => {
            warn!(error = %err, "catalog precompute failed; using on-the-fly embeddings");
            Box::new(OnTheFlyStrategy)
        }
    }
}

pub(crate) enum SemanticScores {
    NoText,
    Failed(EmbeddingError),
    Scored(Vec<Option<f64>>),
}

pub(crate) fn semantic_item_scores(
    detection: &Detection,
    catalog: &[GroundTruthItem],
    strategy: &dyn MatchStrategy,
    embedder: &mut CachedEmbedder,
) -> SemanticScores {
    let Some(payload) = detection_payload_for_embedding(detection) else {
        return SemanticScores::NoText;
    };

    match embedder.embed(&payload) {
        Ok(query) => {
            SemanticScores::Scored(strategy.catalog_similarities(&query, catalog, embedder))
        }
        Err(err) => SemanticScores::Failed(err),
    }
}

/// Index of the first item reaching the maximum similarity, in catalog order.
pub(crate) fn best_semantic_index(scores: &[Option<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, score) in scores.iter().enumerate() {
        let Some(score) = score else {
            continue;
        };
        match best {
            Some((_, current)) if *score <= current => {}
            _ => best = Some((index, *score)),
        }
    }
    best.map(|(index, _)| index)
}

pub fn semantic_match(
    detection: &Detection,
    catalog: &[GroundTruthItem],
    strategy: &dyn MatchStrategy,
    embedder: &mut CachedEmbedder,
    threshold: f64,
) -> MatchResult {
    let scores = match semantic_item_scores(detection, catalog, strategy, embedder) {
        SemanticScores::NoText => return MatchResult::unmatched(0.0, METHOD_NO_TEXT),
        SemanticScores::Failed(err) => {
            warn!(error = %err, detection = %detection.name, "detection embedding failed");
            return MatchResult::unmatched(0.0, METHOD_EMBEDDING_ERROR);
        }
        SemanticScores::Scored(scores) => scores,
    };

    let Some(best_index) = best_semantic_index(&scores) else {
        return MatchResult::unmatched(0.0, METHOD_NO_MATCH);
    };

    let best_score = scores[best_index].unwrap_or(0.0);
    if best_score >= threshold {
        MatchResult::matched(&catalog[best_index].id, best_score, METHOD_SEMANTIC)
    } else {
        MatchResult::unmatched(best_score, METHOD_NO_MATCH)
    }
}
