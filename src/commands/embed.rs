use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CacheStats, CachedEmbedder, EmbeddingCache};
use crate::cli::{EmbedArgs, EmbedRefreshMode};
use crate::config::AnalysisConfig;
use crate::matching::NULL_RESPONSE_TEMPLATES;
use crate::semantic::{LocalHashEmbedder, catalog_payload_for_embedding, resolve_model_config};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::inputs::{InputFingerprint, fingerprint, load_catalog};

#[derive(Debug, Serialize)]
struct EmbeddingRunManifest {
    manifest_version: u32,
    run_id: String,
    generated_at: String,
    model_id: String,
    model_name: String,
    embedding_dim: usize,
    normalization: String,
    backend: String,
    cache_db: String,
    catalog: InputFingerprint,
    refresh_mode: String,
    eligible_payloads: usize,
    skipped_empty_items: usize,
    stale_before: usize,
    updated: usize,
    failed: usize,
    stored_rows_after: usize,
    cache: CacheStats,
    duration_ms: u128,
    status: String,
    warnings: Vec<String>,
}

/// Fills the persistent embedding store with every catalog payload and the
/// null-response templates, so later analysis runs start warm.
pub fn run(args: EmbedArgs) -> Result<()> {
    let mut config = AnalysisConfig::load(args.config.as_deref())?;
    if let Some(model_id) = args.model_id.as_ref() {
        config.embedding_model_id = model_id.clone();
    }
    config.validate()?;

    let model = resolve_model_config(&config.embedding_model_id);
    let catalog = load_catalog(&args.catalog)?;

    let cache_db = args
        .cache_db
        .clone()
        .unwrap_or_else(|| args.cache_root.join("embeddings.sqlite"));
    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    if let Some(parent) = cache_db.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_directory(parent)?;
    }

    let cache = EmbeddingCache::open(
        &cache_db,
        config.cache_prefix_chars,
        config.cache_max_entries,
    )?;
    cache.register_model(&model)?;
    let mut embedder = CachedEmbedder::new(Box::new(LocalHashEmbedder::new(model.clone())), cache);

    let started_at = now_utc_string();
    let started = Instant::now();
    let run_id = format!("embed-{}", utc_compact_string(Utc::now()));

    let mut payloads = Vec::<String>::new();
    let mut skipped_empty_items = 0usize;
    for item in catalog.items() {
        match catalog_payload_for_embedding(item) {
            Some(payload) => payloads.push(payload),
            None => skipped_empty_items += 1,
        }
    }
    payloads.extend(NULL_RESPONSE_TEMPLATES.iter().map(|template| template.to_string()));

    let mut stale_before = 0usize;
    let mut updated = 0usize;
    let mut failed = 0usize;
    let mut warnings = Vec::<String>::new();

    for payload in &payloads {
        let stale = !embedder
            .cache()
            .is_stored(&model.model_id, payload, model.dimensions)?;
        if stale {
            stale_before += 1;
        }

        let outcome = match args.refresh_mode {
            EmbedRefreshMode::Full => embedder.refresh(payload),
            EmbedRefreshMode::MissingOrStale if stale => embedder.refresh(payload),
            EmbedRefreshMode::MissingOrStale => continue,
        };
        match outcome {
            Ok(_) => updated += 1,
            Err(err) => {
                failed += 1;
                warn!(error = %err, "payload embedding failed");
                warnings.push(format!("embedding failed: {err}"));
            }
        }
    }

    if skipped_empty_items > 0 {
        warnings.push(format!(
            "{skipped_empty_items} catalog items have no embeddable text"
        ));
    }

    let stored_rows_after = embedder.cache().stored_row_count(&model.model_id)?;
    let manifest = EmbeddingRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: started_at,
        model_id: model.model_id.clone(),
        model_name: model.model_name.clone(),
        embedding_dim: model.dimensions,
        normalization: model.normalization.clone(),
        backend: model.backend.clone(),
        cache_db: cache_db.display().to_string(),
        catalog: fingerprint(&args.catalog)?,
        refresh_mode: args.refresh_mode.as_str().to_string(),
        eligible_payloads: payloads.len(),
        skipped_empty_items,
        stale_before,
        updated,
        failed,
        stored_rows_after,
        cache: embedder.cache().stats(),
        duration_ms: started.elapsed().as_millis(),
        status: if failed == 0 { "completed" } else { "degraded" }.to_string(),
        warnings,
    };

    let manifest_path: PathBuf = manifest_dir.join(format!(
        "embedding_run_{}.json",
        utc_compact_string(Utc::now())
    ));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        model_id = %model.model_id,
        eligible = payloads.len(),
        updated,
        stored_rows_after,
        "embedding refresh completed"
    );

    Ok(())
}
