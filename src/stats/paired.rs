use std::collections::{BTreeMap, BTreeSet};

use crate::classify::{ClassificationResult, EnsembleDimension};
use crate::model::{FileKey, Outcome};

/// `(student, question, other)` where `other` is the member of the dimension
/// that is held fixed while the compared dimension varies.
pub type PairKey = (String, String, String);

/// Binary correctness for every classified file.
///
/// A file with an expected item is correct when it produced its true positive;
/// a clean file is correct when it produced no false positive.
pub fn file_correctness(result: &ClassificationResult) -> BTreeMap<FileKey, bool> {
    let mut with_tp = BTreeSet::new();
    let mut with_fp = BTreeSet::new();
    for record in &result.records {
        if record.outcome == Outcome::TruePositive {
            with_tp.insert(&record.key);
        } else if record.outcome.is_false_positive() {
            with_fp.insert(&record.key);
        }
    }

    result
        .compliance
        .iter()
        .map(|row| {
            let correct = if row.is_clean {
                !with_fp.contains(&row.key)
            } else {
                with_tp.contains(&row.key)
            };
            (row.key.clone(), correct)
        })
        .collect()
}

/// Splits per-file correctness into one paired series per member of
/// `dimension` (e.g. per strategy, keyed by student, question and model).
pub fn correctness_by_group(
    correctness: &BTreeMap<FileKey, bool>,
    dimension: EnsembleDimension,
) -> BTreeMap<String, BTreeMap<PairKey, bool>> {
    let mut groups = BTreeMap::<String, BTreeMap<PairKey, bool>>::new();
    for (key, correct) in correctness {
        let (member, other) = match dimension {
            EnsembleDimension::Strategy => (&key.strategy, &key.model),
            EnsembleDimension::Model => (&key.model, &key.strategy),
        };
        groups.entry(member.clone()).or_default().insert(
            (key.student.clone(), key.question.clone(), other.clone()),
            *correct,
        );
    }
    groups
}
