use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::cli::InputArgs;
use crate::config::AnalysisConfig;
use crate::model::{DetectionFile, ExpectationIndex, ExpectationManifest, GroundTruthCatalog};
use crate::util::{read_json, sha256_file};

#[derive(Debug, Clone, Serialize)]
pub struct InputFingerprint {
    pub path: String,
    pub sha256: String,
}

pub struct LoadedInputs {
    pub catalog: GroundTruthCatalog,
    pub expectations: ExpectationIndex,
    pub files: Vec<DetectionFile>,
    pub fingerprints: BTreeMap<String, InputFingerprint>,
}

pub fn load_inputs(args: &InputArgs) -> Result<LoadedInputs> {
    let catalog = load_catalog(&args.catalog)?;
    let expectations = load_expectations(&args.expectations)?;
    let files = load_detections(&args.detections)?;

    let mut fingerprints = BTreeMap::new();
    for (name, path) in [
        ("catalog", &args.catalog),
        ("expectations", &args.expectations),
        ("detections", &args.detections),
    ] {
        fingerprints.insert(name.to_string(), fingerprint(path)?);
    }

    info!(
        catalog_items = catalog.items().len(),
        expectations = expectations.len(),
        detection_files = files.len(),
        "inputs loaded"
    );

    Ok(LoadedInputs {
        catalog,
        expectations,
        files,
        fingerprints,
    })
}

/// Config file (if any) with command-line overrides applied, validated.
pub fn resolve_config(args: &InputArgs) -> Result<AnalysisConfig> {
    let mut config = AnalysisConfig::load(args.config.as_deref())?;
    if let Some(mode) = args.match_mode {
        config.match_mode = mode;
    }
    if let Some(value) = args.noise_floor {
        config.noise_floor = value;
    }
    if let Some(value) = args.semantic_threshold {
        config.semantic_threshold = value;
    }
    if let Some(value) = args.fuzzy_threshold {
        config.fuzzy_threshold = value;
    }
    config.validate()?;
    Ok(config)
}

pub fn fingerprint(path: &Path) -> Result<InputFingerprint> {
    Ok(InputFingerprint {
        path: path.display().to_string(),
        sha256: sha256_file(path)?,
    })
}

pub fn load_catalog(path: &Path) -> Result<GroundTruthCatalog> {
    let catalog: GroundTruthCatalog = read_json(path, "catalog")?;

    let mut seen = HashSet::new();
    for item in catalog.items() {
        if item.id.trim().is_empty() {
            bail!("catalog {} has an item without an id", path.display());
        }
        if !seen.insert(item.id.as_str()) {
            bail!("catalog {} repeats id {}", path.display(), item.id);
        }
    }

    Ok(catalog)
}

pub fn load_expectations(path: &Path) -> Result<ExpectationIndex> {
    let manifest: ExpectationManifest = read_json(path, "expectations")?;
    ExpectationIndex::from_entries(&manifest.expectations)
        .with_context(|| format!("invalid expectations: {}", path.display()))
}

/// Reads detector output files from JSON Lines; blank lines are skipped.
pub fn load_detections(path: &Path) -> Result<Vec<DetectionFile>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read detections: {}", path.display()))?;

    let mut files = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let file: DetectionFile = serde_json::from_str(line).with_context(|| {
            format!(
                "failed to parse detections {} line {line_number}",
                path.display()
            )
        })?;
        for (field, value) in [
            ("strategy", &file.key.strategy),
            ("model", &file.key.model),
            ("student", &file.key.student),
            ("question", &file.key.question),
        ] {
            if value.trim().is_empty() {
                bail!(
                    "detections {} line {line_number} is missing {field}",
                    path.display()
                );
            }
        }
        files.push(file);
    }

    Ok(files)
}
