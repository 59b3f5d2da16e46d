use serde::Serialize;

use crate::config::Thresholds;
use crate::model::{
    ClassifiedRecord, ComplianceRow, ExpectationIndex, FileKey, Outcome, ScoredDetection,
    ScoredFile,
};

pub(crate) const METHOD_SYNTHESIZED_MISS: &str = "synthesized_miss";

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub thresholds: Thresholds,
    pub records: Vec<ClassifiedRecord>,
    pub compliance: Vec<ComplianceRow>,
    /// Files whose (student, question) has no expectation; left unclassified.
    pub missing_expectations: Vec<FileKey>,
}

impl ClassificationResult {
    pub fn noise_filtered_total(&self) -> usize {
        self.compliance.iter().map(|row| row.noise_filtered).sum()
    }

    pub fn null_filtered_total(&self) -> usize {
        self.compliance.iter().map(|row| row.null_filtered).sum()
    }
}

/// Applies the noise floor and acceptance threshold to every scored file.
///
/// Pure in its inputs: the same files, expectations and thresholds always
/// produce the same records in the same order.
pub fn classify(
    files: &[ScoredFile],
    expectations: &ExpectationIndex,
    thresholds: Thresholds,
) -> ClassificationResult {
    let mut records = Vec::new();
    let mut compliance = Vec::with_capacity(files.len());
    let mut missing_expectations = Vec::new();

    for file in files {
        let Some(expectation) = expectations.get(&file.key.student, &file.key.question) else {
            missing_expectations.push(file.key.clone());
            continue;
        };
        let expected_id = expectation.expected_id.as_deref();

        let mut noise_filtered = 0usize;
        let mut duplicate_matches = 0usize;
        let mut evaluated = 0usize;
        let tp_index = if expectation.is_clean {
            None
        } else {
            true_positive_index(&file.detections, expected_id, thresholds)
        };
        let found_tp = tp_index.is_some();

        for (index, scored) in file.detections.iter().enumerate() {
            if scored.semantic_score < thresholds.noise_floor {
                noise_filtered += 1;
                continue;
            }

            let matched_id = accepted_match(scored, thresholds.semantic_threshold);
            let outcome = if expectation.is_clean {
                Outcome::FpClean
            } else {
                match matched_id {
                    Some(matched) if Some(matched) == expected_id => {
                        if tp_index == Some(index) {
                            Outcome::TruePositive
                        } else {
                            Outcome::Duplicate
                        }
                    }
                    Some(_) => Outcome::FpWrong,
                    None => Outcome::FpHallucination,
                }
            };

            if outcome == Outcome::Duplicate {
                duplicate_matches += 1;
            } else {
                evaluated += 1;
            }

            records.push(ClassifiedRecord {
                key: file.key.clone(),
                expected_id: expectation.expected_id.clone(),
                matched_id: matched_id.map(ToOwned::to_owned),
                best_match_id: scored.best_match_id.clone(),
                semantic_score: scored.semantic_score,
                outcome,
                confidence: scored.detection.confidence,
                detection_name: Some(scored.detection.name.clone()),
                method: scored.method.clone(),
            });
        }

        if let Some(expected) = expected_id
            && !found_tp
        {
            records.push(ClassifiedRecord {
                key: file.key.clone(),
                expected_id: Some(expected.to_string()),
                matched_id: None,
                best_match_id: None,
                semantic_score: 0.0,
                outcome: Outcome::FalseNegative,
                confidence: None,
                detection_name: None,
                method: METHOD_SYNTHESIZED_MISS.to_string(),
            });
        }

        compliance.push(ComplianceRow {
            key: file.key.clone(),
            is_clean: expectation.is_clean,
            expected_id: expectation.expected_id.clone(),
            raw_misconceptions: file.raw_misconceptions,
            null_filtered: file.null_filtered,
            noise_filtered,
            duplicate_matches,
            evaluated_misconceptions: evaluated,
        });
    }

    ClassificationResult {
        thresholds,
        records,
        compliance,
        missing_expectations,
    }
}

/// The highest-scoring accepted detection naming the expected item; ties go to
/// the earliest. Other detections naming it are duplicates.
fn true_positive_index(
    detections: &[ScoredDetection],
    expected_id: Option<&str>,
    thresholds: Thresholds,
) -> Option<usize> {
    let expected_id = expected_id?;
    let mut best: Option<(usize, f64)> = None;
    for (index, scored) in detections.iter().enumerate() {
        if scored.semantic_score < thresholds.noise_floor {
            continue;
        }
        if accepted_match(scored, thresholds.semantic_threshold) != Some(expected_id) {
            continue;
        }
        match best {
            Some((_, score)) if scored.semantic_score <= score => {}
            _ => best = Some((index, scored.semantic_score)),
        }
    }
    best.map(|(index, _)| index)
}

fn accepted_match(scored: &ScoredDetection, semantic_threshold: f64) -> Option<&str> {
    if scored.semantic_score >= semantic_threshold {
        scored.best_match_id.as_deref()
    } else {
        None
    }
}
