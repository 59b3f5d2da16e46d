use std::collections::HashMap;
use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub student_thinking: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthCatalog {
    #[serde(default = "default_manifest_version")]
    pub manifest_version: u32,
    pub misconceptions: Vec<GroundTruthItem>,
}

impl GroundTruthCatalog {
    pub fn items(&self) -> &[GroundTruthItem] {
        &self.misconceptions
    }

    pub fn get(&self, id: &str) -> Option<&GroundTruthItem> {
        self.misconceptions.iter().find(|item| item.id == id)
    }

    pub fn category_of(&self, id: &str) -> Option<&str> {
        self.get(id).map(|item| item.category.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default, alias = "inferred_category_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub student_belief: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Detection {
    pub fn has_text(&self) -> bool {
        !(self.name.trim().is_empty()
            && self.description.trim().is_empty()
            && self.student_belief.trim().is_empty())
    }
}

/// Identity of one detector output file: one (strategy, model) pair judging
/// one (student, question) submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileKey {
    pub strategy: String,
    pub model: String,
    pub student: String,
    pub question: String,
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.strategy, self.model, self.student, self.question
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFile {
    #[serde(flatten)]
    pub key: FileKey,
    #[serde(default)]
    pub misconceptions: Vec<Detection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub expected_id: Option<String>,
    pub is_clean: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectationEntry {
    pub student: String,
    pub question: String,
    #[serde(default)]
    pub expected_id: Option<String>,
    #[serde(default)]
    pub is_clean: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectationManifest {
    #[serde(default = "default_manifest_version")]
    pub manifest_version: u32,
    pub expectations: Vec<ExpectationEntry>,
}

/// Lookup from (student, question) to the seeded expectation.
#[derive(Debug, Clone, Default)]
pub struct ExpectationIndex {
    entries: HashMap<(String, String), Expectation>,
}

impl ExpectationIndex {
    pub fn from_entries(entries: &[ExpectationEntry]) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for entry in entries {
            let expected_id = entry
                .expected_id
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned);

            if entry.is_clean && expected_id.is_some() {
                bail!(
                    "clean submission {}/{} must not carry an expected misconception",
                    entry.student,
                    entry.question
                );
            }
            if !entry.is_clean && expected_id.is_none() {
                bail!(
                    "submission {}/{} is neither clean nor seeded with an expected misconception",
                    entry.student,
                    entry.question
                );
            }

            let key = (entry.student.clone(), entry.question.clone());
            if index.contains_key(&key) {
                bail!(
                    "duplicate expectation for {}/{}",
                    entry.student,
                    entry.question
                );
            }
            index.insert(
                key,
                Expectation {
                    expected_id,
                    is_clean: entry.is_clean,
                },
            );
        }

        Ok(Self { entries: index })
    }

    #[cfg(test)]
    pub fn insert(&mut self, student: &str, question: &str, expectation: Expectation) {
        self.entries
            .insert((student.to_string(), question.to_string()), expectation);
    }

    pub fn get(&self, student: &str, question: &str) -> Option<&Expectation> {
        self.entries
            .get(&(student.to_string(), question.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A detection after matching, before any threshold decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDetection {
    pub detection: Detection,
    pub best_match_id: Option<String>,
    pub semantic_score: f64,
    pub method: String,
}

/// All scored detections of one detector output file plus its filter audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFile {
    pub key: FileKey,
    pub raw_misconceptions: usize,
    pub null_filtered: usize,
    pub detections: Vec<ScoredDetection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    #[serde(rename = "TP")]
    TruePositive,
    FpClean,
    FpWrong,
    FpHallucination,
    FalseNegative,
    Duplicate,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TruePositive => "TP",
            Self::FpClean => "FP_CLEAN",
            Self::FpWrong => "FP_WRONG",
            Self::FpHallucination => "FP_HALLUCINATION",
            Self::FalseNegative => "FALSE_NEGATIVE",
            Self::Duplicate => "DUPLICATE",
        }
    }

    pub fn is_false_positive(self) -> bool {
        matches!(self, Self::FpClean | Self::FpWrong | Self::FpHallucination)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    #[serde(flatten)]
    pub key: FileKey,
    pub expected_id: Option<String>,
    pub matched_id: Option<String>,
    pub best_match_id: Option<String>,
    pub semantic_score: f64,
    pub outcome: Outcome,
    pub confidence: Option<f64>,
    pub detection_name: Option<String>,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRow {
    #[serde(flatten)]
    pub key: FileKey,
    pub is_clean: bool,
    pub expected_id: Option<String>,
    pub raw_misconceptions: usize,
    pub null_filtered: usize,
    pub noise_filtered: usize,
    pub duplicate_matches: usize,
    pub evaluated_misconceptions: usize,
}

fn default_manifest_version() -> u32 {
    1
}
