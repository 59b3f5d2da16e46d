//! Explicit embedding memoization.
//!
//! Entries are keyed by the SHA-256 of `model_id` plus a bounded text prefix.
//! The in-memory tier (moka, bounded by entry count) is always consulted first;
//! an optional SQLite store makes the cache survive across runs (write-through).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use moka::sync::Cache;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, warn};

use crate::semantic::{
    EmbeddingError, EmbeddingProvider, SemanticModelConfig, decode_embedding_blob,
    embedding_text_hash, encode_embedding_blob,
};
use crate::util::now_utc_string;

pub const DEFAULT_CACHE_PREFIX_CHARS: usize = 512;
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub store_hits: usize,
    pub misses: usize,
    pub inserts: usize,
    pub store_errors: usize,
}

pub struct EmbeddingCache {
    prefix_chars: usize,
    entries: Cache<String, Vec<f32>>,
    store: Option<Connection>,
    stats: CacheStats,
}

impl EmbeddingCache {
    pub fn in_memory(prefix_chars: usize, max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_idle(Duration::from_secs(3600))
            .build();

        Self {
            prefix_chars,
            entries,
            store: None,
            stats: CacheStats::default(),
        }
    }

    pub fn with_store(connection: Connection, prefix_chars: usize, max_entries: u64) -> Result<Self> {
        ensure_cache_schema(&connection)?;
        Ok(Self {
            store: Some(connection),
            ..Self::in_memory(prefix_chars, max_entries)
        })
    }

    pub fn open(db_path: &Path, prefix_chars: usize, max_entries: u64) -> Result<Self> {
        let connection = open_cache_connection(db_path)?;
        Self::with_store(connection, prefix_chars, max_entries)
    }

    pub fn cache_key(&self, model_id: &str, text: &str) -> String {
        let prefix = if self.prefix_chars == 0 {
            text.to_string()
        } else {
            text.chars().take(self.prefix_chars).collect::<String>()
        };
        embedding_text_hash(&format!("{model_id}\n{prefix}"))
    }

    pub fn get(&mut self, model_id: &str, text: &str, dimensions: usize) -> Option<Vec<f32>> {
        let key = self.cache_key(model_id, text);
        if let Some(found) = self.entries.get(&key) {
            self.stats.hits += 1;
            return Some(found);
        }

        let stored = match self.store.as_ref() {
            Some(connection) => match load_stored_embedding(connection, &key, model_id, dimensions)
            {
                Ok(value) => value,
                Err(err) => {
                    self.stats.store_errors += 1;
                    warn!(error = %err, "embedding store lookup failed");
                    None
                }
            },
            None => None,
        };

        match stored {
            Some(vector) => {
                self.stats.store_hits += 1;
                self.entries.insert(key, vector.clone());
                Some(vector)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, model_id: &str, text: &str, embedding: &[f32]) {
        let key = self.cache_key(model_id, text);
        if let Some(connection) = self.store.as_ref()
            && let Err(err) = upsert_stored_embedding(connection, &key, model_id, embedding)
        {
            self.stats.store_errors += 1;
            warn!(error = %err, "embedding store write failed");
        }

        self.entries.insert(key, embedding.to_vec());
        self.stats.inserts += 1;
        debug!(entries = self.entries.entry_count(), "embedding cache insert");
    }

    /// Whether the persistent store already holds this text for the model.
    pub fn is_stored(&self, model_id: &str, text: &str, dimensions: usize) -> Result<bool> {
        let Some(connection) = self.store.as_ref() else {
            return Ok(false);
        };
        let key = self.cache_key(model_id, text);
        Ok(load_stored_embedding(connection, &key, model_id, dimensions)?.is_some())
    }

    pub fn register_model(&self, model: &SemanticModelConfig) -> Result<()> {
        match self.store.as_ref() {
            Some(connection) => ensure_model_entry(connection, model),
            None => Ok(()),
        }
    }

    pub fn stored_row_count(&self, model_id: &str) -> Result<usize> {
        let Some(connection) = self.store.as_ref() else {
            return Ok(0);
        };
        let count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM embedding_cache WHERE model_id = ?1",
            [model_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    /// Entries resident in memory once pending evictions are applied.
    #[cfg(test)]
    pub fn resident_entries(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// Drops the in-memory entries; the persistent store is left untouched.
    #[cfg(test)]
    pub fn clear(&mut self) {
        self.entries.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Provider plus cache: every embedding request in a run goes through here.
pub struct CachedEmbedder {
    provider: Box<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedEmbedder {
    pub fn new(provider: Box<dyn EmbeddingProvider>, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    pub fn embed(&mut self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model_id = self.provider.model_id().to_string();
        let dimensions = self.provider.dimensions();
        if let Some(found) = self.cache.get(&model_id, text, dimensions) {
            return Ok(found);
        }

        let vector = self.provider.embed(text)?;
        if vector.len() != dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimensions,
                actual: vector.len(),
            });
        }
        self.cache.insert(&model_id, text, &vector);
        Ok(vector)
    }

    /// Embeds without consulting the cache and overwrites whatever it held.
    pub fn refresh(&mut self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector = self.provider.embed(text)?;
        if vector.len() != self.provider.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.provider.dimensions(),
                actual: vector.len(),
            });
        }
        let model_id = self.provider.model_id().to_string();
        self.cache.insert(&model_id, text, &vector);
        Ok(vector)
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

pub fn open_cache_connection(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open embedding store: {}", db_path.display()))?;

    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL for embedding store")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL for embedding store")?;

    Ok(connection)
}

pub fn ensure_cache_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS embedding_models (
              model_id TEXT PRIMARY KEY,
              backend TEXT NOT NULL,
              model_name TEXT NOT NULL,
              dimensions INTEGER NOT NULL,
              created_at TEXT NOT NULL,
              config_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS embedding_cache (
              cache_key TEXT NOT NULL,
              model_id TEXT NOT NULL,
              embedding BLOB NOT NULL,
              embedding_dim INTEGER NOT NULL,
              created_at TEXT NOT NULL,
              PRIMARY KEY(cache_key, model_id)
            );
            ",
        )
        .context("failed to create embedding store schema")
}

fn ensure_model_entry(connection: &Connection, model: &SemanticModelConfig) -> Result<()> {
    let config_json = serde_json::to_string(model).context("failed to encode model config")?;

    connection.execute(
        "
        INSERT INTO embedding_models(model_id, backend, model_name, dimensions, created_at, config_json)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(model_id) DO UPDATE SET
          backend=excluded.backend,
          model_name=excluded.model_name,
          dimensions=excluded.dimensions,
          config_json=excluded.config_json
        ",
        params![
            model.model_id,
            model.backend,
            model.model_name,
            model.dimensions as i64,
            now_utc_string(),
            config_json,
        ],
    )?;

    Ok(())
}

fn load_stored_embedding(
    connection: &Connection,
    cache_key: &str,
    model_id: &str,
    dimensions: usize,
) -> Result<Option<Vec<f32>>> {
    let row = connection
        .query_row(
            "
            SELECT embedding, embedding_dim
            FROM embedding_cache
            WHERE cache_key = ?1 AND model_id = ?2
            ",
            params![cache_key, model_id],
            |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    let Some((blob, stored_dim)) = row else {
        return Ok(None);
    };
    if stored_dim as usize != dimensions {
        return Ok(None);
    }

    Ok(decode_embedding_blob(&blob, dimensions))
}

fn upsert_stored_embedding(
    connection: &Connection,
    cache_key: &str,
    model_id: &str,
    embedding: &[f32],
) -> Result<()> {
    connection.execute(
        "
        INSERT INTO embedding_cache(cache_key, model_id, embedding, embedding_dim, created_at)
        VALUES(?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(cache_key, model_id) DO UPDATE SET
          embedding=excluded.embedding,
          embedding_dim=excluded.embedding_dim,
          created_at=excluded.created_at
        ",
        params![
            cache_key,
            model_id,
            encode_embedding_blob(embedding),
            embedding.len() as i64,
            now_utc_string(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use rusqlite::Connection;

    use super::*;
    use crate::semantic::LocalHashEmbedder;

    struct CountingProvider {
        inner: LocalHashEmbedder,
        calls: Arc<AtomicUsize>,
    }

    impl EmbeddingProvider for CountingProvider {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }
    }

    #[test]
    fn cached_embedder_calls_provider_once_per_text() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CountingProvider {
            inner: LocalHashEmbedder::default(),
            calls: Arc::clone(&calls),
        };
        let mut embedder = CachedEmbedder::new(
            Box::new(provider),
            EmbeddingCache::in_memory(DEFAULT_CACHE_PREFIX_CHARS, DEFAULT_CACHE_MAX_ENTRIES),
        );

        let first = embedder.embed("loop runs one extra time").expect("embed");
        let second = embedder.embed("loop runs one extra time").expect("embed");
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.cache().stats().hits, 1);
        assert_eq!(embedder.cache().stats().misses, 1);
    }

    #[test]
    fn cache_key_uses_bounded_prefix() {
        let cache = EmbeddingCache::in_memory(4, DEFAULT_CACHE_MAX_ENTRIES);
        assert_eq!(
            cache.cache_key("m", "abcdXYZ"),
            cache.cache_key("m", "abcdQRS")
        );
        assert_ne!(cache.cache_key("m", "abcd"), cache.cache_key("other", "abcd"));
    }

    #[test]
    fn sqlite_store_survives_memory_clear() {
        let connection = Connection::open_in_memory().expect("in-memory sqlite");
        let mut cache =
            EmbeddingCache::with_store(connection, DEFAULT_CACHE_PREFIX_CHARS, DEFAULT_CACHE_MAX_ENTRIES)
                .expect("schema");

        cache.insert("model-a", "null pointer", &[0.25, 0.75]);
        cache.clear();
        assert_eq!(cache.resident_entries(), 0);

        let restored = cache.get("model-a", "null pointer", 2);
        assert_eq!(restored, Some(vec![0.25, 0.75]));
        assert_eq!(cache.stats().store_hits, 1);
        assert_eq!(cache.stored_row_count("model-a").expect("count"), 1);
    }

    #[test]
    fn memory_tier_evicts_beyond_capacity() {
        let mut cache = EmbeddingCache::in_memory(DEFAULT_CACHE_PREFIX_CHARS, 8);
        for index in 0..500 {
            cache.insert("model-a", &format!("detection text {index}"), &[index as f32]);
        }

        assert!(cache.resident_entries() <= 8);
        assert_eq!(cache.stats().inserts, 500);
    }

    #[test]
    fn evicted_entry_is_restored_from_store() {
        let connection = Connection::open_in_memory().expect("in-memory sqlite");
        let mut cache = EmbeddingCache::with_store(connection, DEFAULT_CACHE_PREFIX_CHARS, 4)
            .expect("schema");
        for index in 0..200 {
            cache.insert("model-a", &format!("text {index}"), &[index as f32, 1.0]);
        }
        assert!(cache.resident_entries() <= 4);

        for index in 0..200 {
            let restored = cache.get("model-a", &format!("text {index}"), 2);
            assert_eq!(restored, Some(vec![index as f32, 1.0]));
        }
        assert!(cache.stats().store_hits > 0);
    }

    #[test]
    fn stored_embedding_with_other_dimension_is_a_miss() {
        let connection = Connection::open_in_memory().expect("in-memory sqlite");
        let mut cache =
            EmbeddingCache::with_store(connection, DEFAULT_CACHE_PREFIX_CHARS, DEFAULT_CACHE_MAX_ENTRIES)
                .expect("schema");
        cache.insert("model-a", "text", &[1.0, 0.0]);
        cache.clear();

        assert!(cache.get("model-a", "text", 3).is_none());
        assert!(!cache.is_stored("model-a", "text", 3).expect("lookup"));
        assert!(cache.is_stored("model-a", "text", 2).expect("lookup"));
    }
}
