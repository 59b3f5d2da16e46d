use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ClassifiedRecord, GroundTruthCatalog, Outcome};

pub const CLEAN_CATEGORY: &str = "clean";
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub tp: usize,
    pub fp_clean: usize,
    pub fp_wrong: usize,
    pub fp_hallucination: usize,
    pub fn_: usize,
}

impl OutcomeCounts {
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::TruePositive => self.tp += 1,
            Outcome::FpClean => self.fp_clean += 1,
            Outcome::FpWrong => self.fp_wrong += 1,
            Outcome::FpHallucination => self.fp_hallucination += 1,
            Outcome::FalseNegative => self.fn_ += 1,
            Outcome::Duplicate => {}
        }
    }

    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ClassifiedRecord>,
    {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.outcome);
        }
        counts
    }

    pub fn fp(&self) -> usize {
        self.fp_clean + self.fp_wrong + self.fp_hallucination
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp())
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall <= 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            tp: self.tp,
            fp: self.fp(),
            fn_: self.fn_,
            fp_clean: self.fp_clean,
            fp_wrong: self.fp_wrong,
            fp_hallucination: self.fp_hallucination,
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub fp_clean: usize,
    pub fp_wrong: usize,
    pub fp_hallucination: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Precision,
    Recall,
    F1,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Precision, MetricKind::Recall, MetricKind::F1];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
        }
    }

    pub fn value(self, counts: &OutcomeCounts) -> f64 {
        match self {
            Self::Precision => counts.precision(),
            Self::Recall => counts.recall(),
            Self::F1 => counts.f1(),
        }
    }
}

pub fn compute_metrics(records: &[ClassifiedRecord]) -> Metrics {
    OutcomeCounts::from_records(records).metrics()
}

pub fn metrics_by<F>(records: &[ClassifiedRecord], group_of: F) -> BTreeMap<String, Metrics>
where
    F: Fn(&ClassifiedRecord) -> String,
{
    let mut grouped = BTreeMap::<String, OutcomeCounts>::new();
    for record in records {
        grouped.entry(group_of(record)).or_default().add(record.outcome);
    }
    grouped
        .into_iter()
        .map(|(group, counts)| (group, counts.metrics()))
        .collect()
}

pub fn metrics_by_strategy(records: &[ClassifiedRecord]) -> BTreeMap<String, Metrics> {
    metrics_by(records, |record| record.key.strategy.clone())
}

pub fn metrics_by_model(records: &[ClassifiedRecord]) -> BTreeMap<String, Metrics> {
    metrics_by(records, |record| record.key.model.clone())
}

/// Groups by the category of the expected item; clean-file records land in
/// [`CLEAN_CATEGORY`].
pub fn metrics_by_category(
    records: &[ClassifiedRecord],
    catalog: &GroundTruthCatalog,
) -> BTreeMap<String, Metrics> {
    metrics_by(records, |record| match record.expected_id.as_deref() {
        None => CLEAN_CATEGORY.to_string(),
        Some(expected) => catalog
            .category_of(expected)
            .map(str::trim)
            .filter(|category| !category.is_empty())
            .unwrap_or(UNCATEGORIZED)
            .to_string(),
    })
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
