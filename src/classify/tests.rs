use crate::config::Thresholds;
use crate::matching::fuzzy_match;
use crate::model::{
    ClassifiedRecord, Detection, Expectation, ExpectationIndex, FileKey, GroundTruthCatalog,
    GroundTruthItem, Outcome, ScoredDetection, ScoredFile,
};

use super::sensitivity::{SensitivityCell, select_optimal};
use super::*;

fn key(strategy: &str, model: &str, student: &str, question: &str) -> FileKey {
    FileKey {
        strategy: strategy.to_string(),
        model: model.to_string(),
        student: student.to_string(),
        question: question.to_string(),
    }
}

fn scored(name: &str, best_match_id: Option<&str>, score: f64) -> ScoredDetection {
    ScoredDetection {
        detection: Detection {
            name: name.to_string(),
            ..Detection::default()
        },
        best_match_id: best_match_id.map(ToOwned::to_owned),
        semantic_score: score,
        method: "semantic".to_string(),
    }
}

fn file(key: FileKey, detections: Vec<ScoredDetection>) -> ScoredFile {
    ScoredFile {
        key,
        raw_misconceptions: detections.len(),
        null_filtered: 0,
        detections,
    }
}

fn expectations(entries: &[(&str, &str, Option<&str>, bool)]) -> ExpectationIndex {
    let mut index = ExpectationIndex::default();
    for (student, question, expected_id, is_clean) in entries {
        index.insert(
            student,
            question,
            Expectation {
                expected_id: expected_id.map(ToOwned::to_owned),
                is_clean: *is_clean,
            },
        );
    }
    index
}

fn thresholds(noise_floor: f64, semantic_threshold: f64) -> Thresholds {
    Thresholds {
        noise_floor,
        semantic_threshold,
    }
}

fn outcomes(records: &[ClassifiedRecord]) -> Vec<Outcome> {
    records.iter().map(|record| record.outcome).collect()
}

fn mixed_files() -> Vec<ScoredFile> {
    vec![
        file(
            key("baseline", "model-a", "s1", "q1"),
            vec![
                scored("loop overrun", Some("M1"), 0.92),
                scored("wrong topic", Some("M2"), 0.71),
                scored("vague", Some("M1"), 0.58),
                scored("nitpick", Some("M2"), 0.20),
            ],
        ),
        file(
            key("baseline", "model-a", "s1", "q2"),
            vec![scored("claimed bug", Some("M2"), 0.80)],
        ),
        file(
            key("baseline", "model-a", "s2", "q1"),
            vec![
                scored("close call", Some("M1"), 0.66),
                scored("other", None, 0.60),
            ],
        ),
        file(key("baseline", "model-a", "s2", "q2"), Vec::new()),
    ]
}

fn mixed_expectations() -> ExpectationIndex {
    expectations(&[
        ("s1", "q1", Some("M1"), false),
        ("s1", "q2", None, true),
        ("s2", "q1", Some("M1"), false),
        ("s2", "q2", Some("M2"), false),
    ])
}

#[test]
fn fuzzy_match_then_classify_yields_true_positive() {
    let catalog = vec![GroundTruthItem {
        id: "M1".to_string(),
        name: "Off-by-one".to_string(),
        ..GroundTruthItem::default()
    }];
    let detection = Detection {
        name: "off by one error".to_string(),
        ..Detection::default()
    };
    let result = fuzzy_match(&detection, &catalog, 0.3);
    let files = vec![file(
        key("baseline", "model-a", "s1", "q1"),
        vec![ScoredDetection {
            detection,
            best_match_id: result.best_match_id,
            semantic_score: result.score,
            method: result.method,
        }],
    )];

    let classified = classify(
        &files,
        &expectations(&[("s1", "q1", Some("M1"), false)]),
        thresholds(0.0, 0.3),
    );
    assert_eq!(outcomes(&classified.records), vec![Outcome::TruePositive]);
}

#[test]
fn clean_file_detection_is_fp_clean_never_tp() {
    let files = vec![file(
        key("baseline", "model-a", "s1", "q1"),
        vec![scored("anything", Some("M1"), 0.95)],
    )];
    let classified = classify(
        &files,
        &expectations(&[("s1", "q1", None, true)]),
        thresholds(0.0, 0.5),
    );
    assert_eq!(outcomes(&classified.records), vec![Outcome::FpClean]);
    assert_eq!(classified.records[0].matched_id.as_deref(), Some("M1"));
}

#[test]
fn score_below_noise_floor_is_excluded_not_hallucination() {
    let files = vec![file(
        key("baseline", "model-a", "s1", "q1"),
        vec![scored("nitpick", Some("M2"), 0.50)],
    )];
    let classified = classify(
        &files,
        &expectations(&[("s1", "q1", Some("M1"), false)]),
        thresholds(0.55, 0.65),
    );

    assert!(
        classified
            .records
            .iter()
            .all(|record| record.outcome != Outcome::FpHallucination)
    );
    assert_eq!(outcomes(&classified.records), vec![Outcome::FalseNegative]);
    assert_eq!(classified.compliance[0].noise_filtered, 1);
    assert_eq!(classified.compliance[0].evaluated_misconceptions, 0);
}

#[test]
fn outcome_priority_across_mixed_files() {
    let classified = classify(&mixed_files(), &mixed_expectations(), thresholds(0.55, 0.65));
    assert_eq!(
        outcomes(&classified.records),
        vec![
            Outcome::TruePositive,
            Outcome::FpWrong,
            Outcome::FpHallucination,
            Outcome::FpClean,
            Outcome::TruePositive,
            Outcome::FpHallucination,
            Outcome::FalseNegative,
        ]
    );

    let metrics = compute_metrics(&classified.records);
    assert_eq!(metrics.tp, 2);
    assert_eq!(metrics.fp, 4);
    assert_eq!(metrics.fn_, 1);
    assert_eq!(metrics.fp_clean, 1);
    assert_eq!(metrics.fp_wrong, 1);
    assert_eq!(metrics.fp_hallucination, 2);
    assert!((metrics.precision - 2.0 / 6.0).abs() < 1e-12);
    assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(classified.noise_filtered_total(), 1);
}

#[test]
fn weaker_matching_detection_is_a_duplicate() {
    let files = vec![file(
        key("baseline", "model-a", "s1", "q1"),
        vec![
            scored("weaker", Some("M1"), 0.70),
            scored("stronger", Some("M1"), 0.85),
        ],
    )];
    let classified = classify(
        &files,
        &expectations(&[("s1", "q1", Some("M1"), false)]),
        thresholds(0.5, 0.6),
    );
    assert_eq!(
        outcomes(&classified.records),
        vec![Outcome::Duplicate, Outcome::TruePositive]
    );
    assert_eq!(classified.compliance[0].duplicate_matches, 1);
    assert_eq!(compute_metrics(&classified.records).fp, 0);
}

#[test]
fn missing_expectation_is_audited_not_classified() {
    let files = vec![file(
        key("baseline", "model-a", "ghost", "q9"),
        vec![scored("claim", Some("M1"), 0.9)],
    )];
    let classified = classify(&files, &mixed_expectations(), thresholds(0.5, 0.6));
    assert!(classified.records.is_empty());
    assert_eq!(classified.missing_expectations.len(), 1);
}

#[test]
fn reclassification_is_idempotent() {
    let files = mixed_files();
    let index = mixed_expectations();
    let first = classify(&files, &index, thresholds(0.55, 0.65));
    let second = classify(&files, &index, thresholds(0.55, 0.65));
    assert_eq!(first.records, second.records);
    assert_eq!(first.compliance, second.compliance);
}

#[test]
fn raising_acceptance_threshold_only_moves_toward_misses() {
    let files = mixed_files();
    let index = mixed_expectations();
    let grid = [0.55, 0.6, 0.65, 0.7, 0.8, 0.9, 0.95];

    for pair in grid.windows(2) {
        let lower = classify(&files, &index, thresholds(0.55, pair[0]));
        let higher = classify(&files, &index, thresholds(0.55, pair[1]));

        let lower_detections = lower
            .records
            .iter()
            .filter(|record| record.outcome != Outcome::FalseNegative)
            .collect::<Vec<_>>();
        let higher_detections = higher
            .records
            .iter()
            .filter(|record| record.outcome != Outcome::FalseNegative)
            .collect::<Vec<_>>();
        assert_eq!(lower_detections.len(), higher_detections.len());

        for (before, after) in lower_detections.iter().zip(higher_detections.iter()) {
            let allowed = match before.outcome {
                Outcome::TruePositive => matches!(
                    after.outcome,
                    Outcome::TruePositive | Outcome::FpHallucination
                ),
                Outcome::FpWrong => {
                    matches!(after.outcome, Outcome::FpWrong | Outcome::FpHallucination)
                }
                Outcome::Duplicate => {
                    matches!(after.outcome, Outcome::Duplicate | Outcome::FpHallucination)
                }
                other => after.outcome == other,
            };
            assert!(
                allowed,
                "{:?} -> {:?} at {:?}",
                before.outcome, after.outcome, pair
            );
        }

        let lower_counts = OutcomeCounts::from_records(&lower.records);
        let higher_counts = OutcomeCounts::from_records(&higher.records);
        assert!(higher_counts.tp <= lower_counts.tp);
        assert!(higher_counts.fn_ >= lower_counts.fn_);
    }
}

#[test]
fn every_expected_file_has_exactly_one_tp_or_miss() {
    let files = mixed_files();
    let index = mixed_expectations();

    for (noise_floor, threshold) in [(0.0, 0.0), (0.55, 0.65), (0.7, 0.9), (1.0, 1.0)] {
        let classified = classify(&files, &index, thresholds(noise_floor, threshold));
        for row in classified.compliance.iter().filter(|row| row.expected_id.is_some()) {
            let tp = classified
                .records
                .iter()
                .filter(|record| record.key == row.key && record.outcome == Outcome::TruePositive)
                .count();
            let misses = classified
                .records
                .iter()
                .filter(|record| record.key == row.key && record.outcome == Outcome::FalseNegative)
                .count();
            assert_eq!(tp + misses, 1, "file {} at {noise_floor}/{threshold}", row.key);
        }
    }
}

fn tp_record(strategy: &str, student: &str) -> ClassifiedRecord {
    ClassifiedRecord {
        key: key(strategy, "model-a", student, "q1"),
        expected_id: Some("M1".to_string()),
        matched_id: Some("M1".to_string()),
        best_match_id: Some("M1".to_string()),
        semantic_score: 0.9,
        outcome: Outcome::TruePositive,
        confidence: None,
        detection_name: Some("claim".to_string()),
        method: "semantic".to_string(),
    }
}

fn miss_record(strategy: &str, student: &str) -> ClassifiedRecord {
    ClassifiedRecord {
        matched_id: None,
        best_match_id: None,
        semantic_score: 0.0,
        outcome: Outcome::FalseNegative,
        detection_name: None,
        method: "synthesized_miss".to_string(),
        ..tp_record(strategy, student)
    }
}

#[test]
fn two_of_four_strategies_fail_quorum_of_three() {
    let records = vec![
        tp_record("baseline", "s1"),
        tp_record("taxonomy", "s1"),
        miss_record("cot", "s1"),
        miss_record("socratic", "s1"),
    ];

    let filtered = ensemble_filter(&records, EnsembleDimension::Strategy, 3);
    assert_eq!(
        outcomes(&filtered.records),
        vec![Outcome::FalseNegative; 4]
    );
    assert!(filtered.records.iter().all(|record| record.matched_id.is_none()));
    assert_eq!(filtered.downgraded_true_positives, 2);
    assert_eq!(filtered.validated_triples, 0);
}

#[test]
fn validated_triple_keeps_matching_false_positive() {
    let mut wrong = tp_record("cot", "s1");
    wrong.expected_id = Some("M9".to_string());
    wrong.outcome = Outcome::FpWrong;
    let mut hallucination = tp_record("socratic", "s1");
    hallucination.matched_id = None;
    hallucination.outcome = Outcome::FpHallucination;

    let records = vec![
        tp_record("baseline", "s1"),
        tp_record("taxonomy", "s1"),
        wrong,
        hallucination,
    ];

    let filtered = ensemble_filter(&records, EnsembleDimension::Strategy, 3);
    assert_eq!(
        outcomes(&filtered.records),
        vec![Outcome::TruePositive, Outcome::TruePositive, Outcome::FpWrong]
    );
    assert_eq!(filtered.dropped_false_positives, 1);
}

#[test]
fn raising_quorum_never_adds_true_positives() {
    let records = vec![
        tp_record("baseline", "s1"),
        tp_record("taxonomy", "s1"),
        tp_record("cot", "s1"),
        tp_record("baseline", "s2"),
        tp_record("socratic", "s3"),
        tp_record("cot", "s3"),
        miss_record("taxonomy", "s2"),
    ];

    let mut previous = usize::MAX;
    for threshold in 0..=5 {
        let filtered = ensemble_filter(&records, EnsembleDimension::Strategy, threshold);
        let tp = OutcomeCounts::from_records(&filtered.records).tp;
        assert!(tp <= previous, "tp rose from {previous} to {tp} at N={threshold}");
        previous = tp;
    }
    assert_eq!(previous, 0);
}

#[test]
fn model_dimension_counts_distinct_models() {
    let mut other_model = tp_record("baseline", "s1");
    other_model.key.model = "model-b".to_string();
    let records = vec![tp_record("baseline", "s1"), other_model];

    let by_model = ensemble_filter(&records, EnsembleDimension::Model, 2);
    assert_eq!(OutcomeCounts::from_records(&by_model.records).tp, 2);

    let by_strategy = ensemble_filter(&records, EnsembleDimension::Strategy, 2);
    assert_eq!(OutcomeCounts::from_records(&by_strategy.records).tp, 0);
}

#[test]
fn empty_grid_has_no_optimum() {
    let report = sensitivity_search(&mixed_files(), &mixed_expectations(), &[], &[0.5, 0.6]);
    assert!(report.cells.is_empty());
    assert!(report.optimal.is_none());
}

#[test]
fn grid_cells_match_direct_classification_in_order() {
    let files = mixed_files();
    let index = mixed_expectations();
    let noise_floors = [0.0, 0.55];
    let semantic_thresholds = [0.6, 0.7, 0.9];

    let report = sensitivity_search(&files, &index, &noise_floors, &semantic_thresholds);
    assert_eq!(report.cells.len(), 6);

    let mut position = 0usize;
    for noise_floor in noise_floors {
        for threshold in semantic_thresholds {
            let cell = report.cells[position];
            assert_eq!(cell.noise_floor, noise_floor);
            assert_eq!(cell.semantic_threshold, threshold);

            let direct = classify(&files, &index, thresholds(noise_floor, threshold));
            assert_eq!(cell.metrics, compute_metrics(&direct.records));
            position += 1;
        }
    }

    let best_f1 = report
        .cells
        .iter()
        .map(|cell| cell.metrics.f1)
        .fold(f64::MIN, f64::max);
    let optimal = report.optimal.expect("non-empty grid has an optimum");
    assert_eq!(optimal.metrics.f1, best_f1);
}

#[test]
fn optimum_ties_break_to_first_cell() {
    let base = SensitivityCell {
        noise_floor: 0.1,
        semantic_threshold: 0.2,
        metrics: Metrics {
            f1: 0.5,
            ..Metrics::default()
        },
        noise_filtered: 0,
        evaluated: 0,
    };
    let later = SensitivityCell {
        noise_floor: 0.3,
        ..base
    };
    let optimal = select_optimal(&[base, later]).expect("optimum");
    assert_eq!(optimal.noise_floor, 0.1);
}

#[test]
fn category_breakdown_groups_clean_false_positives() {
    let catalog = GroundTruthCatalog {
        manifest_version: 1,
        misconceptions: vec![GroundTruthItem {
            id: "M1".to_string(),
            name: "Off-by-one".to_string(),
            category: "loops".to_string(),
            ..GroundTruthItem::default()
        }],
    };
    let classified = classify(&mixed_files(), &mixed_expectations(), thresholds(0.55, 0.65));
    let by_category = metrics_by_category(&classified.records, &catalog);

    assert_eq!(by_category["clean"].fp_clean, 1);
    assert_eq!(by_category["loops"].tp, 2);
    assert_eq!(by_category["uncategorized"].fn_, 1);
}

#[test]
fn zero_denominators_yield_zero_metrics() {
    let metrics = compute_metrics(&[]);
    assert_eq!(metrics.precision, 0.0);
    assert_eq!(metrics.recall, 0.0);
    assert_eq!(metrics.f1, 0.0);
}

#[test]
fn metric_kind_names_match_report_keys() {
    let names = MetricKind::ALL.map(MetricKind::as_str);
    assert_eq!(names, ["precision", "recall", "f1"]);
    for kind in MetricKind::ALL {
        assert_eq!(
            serde_json::to_value(kind).expect("serialize metric kind"),
            serde_json::json!(kind.as_str())
        );
    }
}
