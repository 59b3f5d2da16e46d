use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CachedEmbedder;
use crate::model::Detection;
use crate::semantic::{cosine_similarity, detection_payload_for_embedding};

pub const NULL_RESPONSE_PHRASES: &[&str] = &[
    "no misconception",
    "no clear misconception",
    "no apparent misconception",
    "no significant misconception",
    "correct understanding",
    "correctly understands",
    "demonstrates understanding",
    "no errors found",
    "no error found",
    "no issues found",
    "no issues detected",
    "code is correct",
    "solution is correct",
    "none detected",
    "none identified",
    "not applicable",
];

pub const NULL_RESPONSE_TEMPLATES: &[&str] = &[
    "No misconception detected. The student demonstrates a correct understanding of the concept.",
    "The code is correct and the student shows no misconceptions.",
    "The student's reasoning is sound; there are no errors in this submission.",
    "No issues found. The solution works as intended.",
    "Nothing wrong with the student's mental model of the program.",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NullVerdict {
    Keyword { phrase: &'static str },
    Semantic { similarity: f64 },
    NotNull,
}

/// Detects "nothing found" statements disguised as misconception claims.
///
/// Stage one is a substring scan of name and description; stage two compares
/// the detection embedding against canonical null templates.
pub struct NullResponseFilter {
    similarity_threshold: f64,
    template_vectors: Vec<Vec<f32>>,
}

impl NullResponseFilter {
    pub fn new(embedder: &mut CachedEmbedder, similarity_threshold: f64) -> Self {
        let mut template_vectors = Vec::with_capacity(NULL_RESPONSE_TEMPLATES.len());
        for template in NULL_RESPONSE_TEMPLATES {
            match embedder.embed(template) {
                Ok(vector) => template_vectors.push(vector),
                Err(err) => warn!(error = %err, "null template embedding failed; template skipped"),
            }
        }

        Self {
            similarity_threshold,
            template_vectors,
        }
    }

    /// Keyword stage only; used when the similarity threshold cannot be exceeded.
    pub fn keyword_only() -> Self {
        Self {
            similarity_threshold: 1.0,
            template_vectors: Vec::new(),
        }
    }

    pub fn check(&self, detection: &Detection, embedder: &mut CachedEmbedder) -> NullVerdict {
        if let Some(phrase) = keyword_null_phrase(detection) {
            return NullVerdict::Keyword { phrase };
        }

        if self.template_vectors.is_empty() {
            return NullVerdict::NotNull;
        }
        let Some(payload) = detection_payload_for_embedding(detection) else {
            return NullVerdict::NotNull;
        };

        let vector = match embedder.embed(&payload) {
            Ok(vector) => vector,
            Err(err) => {
                debug!(error = %err, "null check embedding failed; keeping detection");
                return NullVerdict::NotNull;
            }
        };

        let similarity = self
            .template_vectors
            .iter()
            .map(|template| cosine_similarity(&vector, template))
            .fold(0.0_f64, f64::max);

        if similarity > self.similarity_threshold {
            NullVerdict::Semantic { similarity }
        } else {
            NullVerdict::NotNull
        }
    }
}

fn keyword_null_phrase(detection: &Detection) -> Option<&'static str> {
    let haystack = format!("{} {}", detection.name, detection.description).to_lowercase();
    if haystack.trim().is_empty() {
        return None;
    }
    NULL_RESPONSE_PHRASES
        .iter()
        .copied()
        .find(|phrase| haystack.contains(phrase))
}
