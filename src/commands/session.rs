use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::cache::{CacheStats, CachedEmbedder, EmbeddingCache};
use crate::config::{AnalysisConfig, MatchMode};
use crate::matching::{
    MatchStrategy, NullResponseFilter, OnTheFlyStrategy, ScoringOutput, ScoringSummary,
    SimilarityMatcher, score_files, select_strategy,
};
use crate::semantic::{LocalHashEmbedder, resolve_model_config};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::inputs::{InputFingerprint, LoadedInputs};

pub const RUN_MANIFEST_VERSION: u32 = 1;

pub fn build_embedder(config: &AnalysisConfig, cache_db: Option<&Path>) -> Result<CachedEmbedder> {
    let model = resolve_model_config(&config.embedding_model_id);
    let cache = match cache_db {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                ensure_directory(parent)?;
            }
            let cache = EmbeddingCache::open(path, config.cache_prefix_chars, config.cache_max_entries)?;
            cache.register_model(&model)?;
            cache
        }
        None => EmbeddingCache::in_memory(config.cache_prefix_chars, config.cache_max_entries),
    };

    Ok(CachedEmbedder::new(
        Box::new(LocalHashEmbedder::new(model)),
        cache,
    ))
}

/// Null-filters and matches every loaded detection once.
///
/// Catalog embeddings are resolved before the first detection is scored;
/// fuzzy mode never touches the catalog embeddings.
pub fn score_inputs(
    inputs: &LoadedInputs,
    config: &AnalysisConfig,
    embedder: &mut CachedEmbedder,
) -> (ScoringOutput, &'static str) {
    let catalog = inputs.catalog.items();
    let strategy: Box<dyn MatchStrategy> = match config.match_mode {
        MatchMode::Fuzzy => Box::new(OnTheFlyStrategy),
        MatchMode::Semantic | MatchMode::Hybrid => select_strategy(catalog, embedder),
    };
    let matcher = SimilarityMatcher::new(catalog, config, strategy);
    // Cosine similarity never exceeds 1, so the semantic stage cannot fire.
    let null_filter = if config.null_similarity_threshold >= 1.0 {
        NullResponseFilter::keyword_only()
    } else {
        NullResponseFilter::new(embedder, config.null_similarity_threshold)
    };

    let output = score_files(&inputs.files, &matcher, &null_filter, embedder);
    (output, matcher.strategy_label())
}

pub fn new_run_id(command: &str) -> String {
    format!("{command}-{}", utc_compact_string(Utc::now()))
}

/// Audit record written next to every command's outputs.
#[derive(Debug, Serialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub command: String,
    pub generated_at: String,
    pub inputs: BTreeMap<String, InputFingerprint>,
    pub config: AnalysisConfig,
    pub match_strategy: String,
    pub scoring: ScoringSummary,
    pub cache: CacheStats,
    pub outputs: BTreeMap<String, String>,
    pub duration_ms: u128,
    pub status: String,
    pub warnings: Vec<String>,
}

pub struct RunRecorder {
    run_id: String,
    command: &'static str,
    generated_at: String,
    started: Instant,
    out_dir: PathBuf,
    outputs: BTreeMap<String, String>,
    warnings: Vec<String>,
}

impl RunRecorder {
    pub fn start(command: &'static str, out_dir: &Path) -> Result<Self> {
        ensure_directory(out_dir)?;
        Ok(Self {
            run_id: new_run_id(command),
            command,
            generated_at: now_utc_string(),
            started: Instant::now(),
            out_dir: out_dir.to_path_buf(),
            outputs: BTreeMap::new(),
            warnings: Vec::new(),
        })
    }

    pub fn write_output<T: Serialize>(&mut self, name: &str, file_name: &str, value: &T) -> Result<()> {
        let path = self.out_dir.join(file_name);
        write_json_pretty(&path, value)?;
        info!(path = %path.display(), "{name} written");
        self.outputs
            .insert(name.to_string(), path.display().to_string());
        Ok(())
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn finish(
        self,
        inputs: &LoadedInputs,
        config: &AnalysisConfig,
        match_strategy: &str,
        scoring: &ScoringSummary,
        cache: CacheStats,
    ) -> Result<PathBuf> {
        let manifest = RunManifest {
            manifest_version: RUN_MANIFEST_VERSION,
            run_id: self.run_id,
            command: self.command.to_string(),
            generated_at: self.generated_at,
            inputs: inputs.fingerprints.clone(),
            config: config.clone(),
            match_strategy: match_strategy.to_string(),
            scoring: scoring.clone(),
            cache,
            outputs: self.outputs,
            duration_ms: self.started.elapsed().as_millis(),
            status: "completed".to_string(),
            warnings: self.warnings,
        };

        let path = self.out_dir.join(format!("{}_run.json", self.command));
        write_json_pretty(&path, &manifest)?;
        info!(
            path = %path.display(),
            run_id = %manifest.run_id,
            warnings = manifest.warnings.len(),
            "run manifest written"
        );
        Ok(path)
    }
}
