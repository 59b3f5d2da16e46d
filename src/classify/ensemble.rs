use std::collections::{BTreeSet, HashMap};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{ClassifiedRecord, Outcome};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleDimension {
    Strategy,
    Model,
}

impl EnsembleDimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strategy => "strategy",
            Self::Model => "model",
        }
    }

    pub fn member_of(self, record: &ClassifiedRecord) -> &str {
        match self {
            Self::Strategy => &record.key.strategy,
            Self::Model => &record.key.model,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleResult {
    pub dimension: EnsembleDimension,
    pub agreement_threshold: usize,
    pub validated_triples: usize,
    pub downgraded_true_positives: usize,
    pub dropped_false_positives: usize,
    pub records: Vec<ClassifiedRecord>,
}

type Triple = (String, String, String);

/// Quorum filter over classified records.
///
/// A `(student, question, matched_id)` triple is validated once at least
/// `agreement_threshold` distinct members of `dimension` produced it. Unvalidated
/// true positives become false negatives with the match erased; unvalidated
/// false positives are dropped; false negatives pass through.
pub fn ensemble_filter(
    records: &[ClassifiedRecord],
    dimension: EnsembleDimension,
    agreement_threshold: usize,
) -> EnsembleResult {
    let support = triple_support(records, dimension);
    let is_validated = |record: &ClassifiedRecord| {
        triple_of(record)
            .and_then(|triple| support.get(&triple))
            .map(|members| members.len() >= agreement_threshold)
            .unwrap_or(false)
    };

    let mut out = Vec::with_capacity(records.len());
    let mut downgraded = 0usize;
    let mut dropped = 0usize;

    for record in records {
        match record.outcome {
            Outcome::FalseNegative => out.push(record.clone()),
            Outcome::TruePositive => {
                if is_validated(record) {
                    out.push(record.clone());
                } else {
                    downgraded += 1;
                    out.push(ClassifiedRecord {
                        matched_id: None,
                        outcome: Outcome::FalseNegative,
                        ..record.clone()
                    });
                }
            }
            Outcome::FpClean | Outcome::FpWrong | Outcome::FpHallucination => {
                if is_validated(record) {
                    out.push(record.clone());
                } else {
                    dropped += 1;
                }
            }
            Outcome::Duplicate => {
                if is_validated(record) {
                    out.push(record.clone());
                }
            }
        }
    }

    let validated_triples = support
        .values()
        .filter(|members| members.len() >= agreement_threshold)
        .count();

    info!(
        dimension = dimension.as_str(),
        agreement_threshold,
        validated_triples,
        downgraded,
        dropped,
        "ensemble filter applied"
    );

    EnsembleResult {
        dimension,
        agreement_threshold,
        validated_triples,
        downgraded_true_positives: downgraded,
        dropped_false_positives: dropped,
        records: out,
    }
}

fn triple_support(
    records: &[ClassifiedRecord],
    dimension: EnsembleDimension,
) -> HashMap<Triple, BTreeSet<String>> {
    let mut support = HashMap::<Triple, BTreeSet<String>>::new();
    for record in records {
        if record.outcome == Outcome::FalseNegative {
            continue;
        }
        if let Some(triple) = triple_of(record) {
            support
                .entry(triple)
                .or_default()
                .insert(dimension.member_of(record).to_string());
        }
    }
    support
}

fn triple_of(record: &ClassifiedRecord) -> Option<Triple> {
    let matched = record.matched_id.as_ref()?;
    Some((
        record.key.student.clone(),
        record.key.question.clone(),
        matched.clone(),
    ))
}
