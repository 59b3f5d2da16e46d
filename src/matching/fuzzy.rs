use crate::model::{Detection, GroundTruthItem};

use super::text::text_similarity;
use super::{METHOD_NO_MATCH, METHOD_NO_TEXT, MatchResult};

pub(crate) const METHOD_NAME_MATCH: &str = "name_match";
pub(crate) const METHOD_CATEGORY_MATCH: &str = "category_match";
pub(crate) const METHOD_DESCRIPTION_MATCH: &str = "description_match";
pub(crate) const METHOD_BELIEF_MATCH: &str = "belief_match";

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FuzzyItemScore {
    pub(crate) score: f64,
    pub(crate) method: &'static str,
}

/// Best of the four textual comparisons between one detection and one item.
/// Comparisons are tried in a fixed order and only a strictly higher score
/// replaces the current best.
pub(crate) fn fuzzy_item_score(detection: &Detection, item: &GroundTruthItem) -> FuzzyItemScore {
    let comparisons = [
        (METHOD_NAME_MATCH, detection.name.as_str(), item.name.as_str()),
        (
            METHOD_CATEGORY_MATCH,
            detection.name.as_str(),
            item.category.as_str(),
        ),
        (
            METHOD_DESCRIPTION_MATCH,
            detection.description.as_str(),
            item.explanation.as_str(),
        ),
        (
            METHOD_BELIEF_MATCH,
            detection.student_belief.as_str(),
            item.student_thinking.as_str(),
        ),
    ];

    let mut best = FuzzyItemScore {
        score: 0.0,
        method: METHOD_NO_MATCH,
    };
    for (method, left, right) in comparisons {
        let score = text_similarity(left, right);
        if score > best.score {
            best = FuzzyItemScore { score, method };
        }
    }
    best
}

pub(crate) fn fuzzy_item_scores(
    detection: &Detection,
    catalog: &[GroundTruthItem],
) -> Vec<FuzzyItemScore> {
    catalog
        .iter()
        .map(|item| fuzzy_item_score(detection, item))
        .collect()
}

/// Index of the first item reaching the maximum score, in catalog order.
pub(crate) fn best_fuzzy_index(scores: &[FuzzyItemScore]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, candidate) in scores.iter().enumerate() {
        match best {
            Some(current) if candidate.score <= scores[current].score => {}
            _ => best = Some(index),
        }
    }
    best
}

pub fn fuzzy_match(detection: &Detection, catalog: &[GroundTruthItem], threshold: f64) -> MatchResult {
    if !detection.has_text() {
        return MatchResult::unmatched(0.0, METHOD_NO_TEXT);
    }

    let scores = fuzzy_item_scores(detection, catalog);
    let Some(best_index) = best_fuzzy_index(&scores) else {
        return MatchResult::unmatched(0.0, METHOD_NO_MATCH);
    };

    let best = scores[best_index];
    if best.score > 0.0 && best.score >= threshold {
        MatchResult::matched(&catalog[best_index].id, best.score, best.method)
    } else {
        MatchResult::unmatched(best.score, METHOD_NO_MATCH)
    }
}
