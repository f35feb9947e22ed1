//! Content-addressed persistent embedding cache
//!
//! A sled-backed key-value store at `~/.claude-rag/embedding_cache.db`.
//! Keys are `SHA-256(text) || model_id`, so the same text embedded under two
//! models never collides, and hash collisions within one model are treated
//! as identity. Values carry the vector plus a creation timestamp; rows
//! older than the TTL read as misses and are deleted lazily.
//!
//! Single writer per process (sled enforces the file lock); readers share
//! the same handle. Eviction is advisory and never required for
//! correctness: a lost row is just a future cache miss.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::error::{Error, Result};

/// Cache hit/miss counters and storage footprint
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CacheStats {
    /// Reads answered from the cache since process start
    pub hits: u64,
    /// Reads that fell through to the model since process start
    pub misses: u64,
    /// Bytes on disk
    pub size_bytes: u64,
    /// Live entries
    pub entries: u64,
}

impl CacheStats {
    /// Hit rate over the process lifetime, in [0, 1]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Persistent embedding cache handle
pub struct EmbeddingCache {
    db: sled::Db,
    ttl_secs: i64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Shared cache handle
pub type SharedEmbeddingCache = Arc<EmbeddingCache>;

impl EmbeddingCache {
    /// Open (or create) the cache at `path` with the given row TTL
    pub fn open(path: &Path, ttl_days: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        Ok(Self {
            db,
            ttl_secs: i64::from(ttl_days) * 86_400,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Open an in-memory cache; used by tests
    pub fn ephemeral() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            ttl_secs: 30 * 86_400,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn key(text: &str, model: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let mut key = Vec::with_capacity(digest.len() + model.len());
        key.extend_from_slice(&digest);
        key.extend_from_slice(model.as_bytes());
        key
    }

    fn encode(vector: &[f32], created_at: i64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + vector.len() * 4 + 8);
        buf.extend_from_slice(&(vector.len() as u32).to_le_bytes());
        for v in vector {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&created_at.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Result<(Vec<f32>, i64)> {
        if bytes.len() < 12 {
            return Err(Error::cache("truncated cache row"));
        }
        let dim = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let expected = 4 + dim * 4 + 8;
        if bytes.len() != expected {
            return Err(Error::cache(format!(
                "cache row length {} does not match dimension {dim}",
                bytes.len()
            )));
        }
        let mut vector = Vec::with_capacity(dim);
        for chunk in bytes[4..4 + dim * 4].chunks_exact(4) {
            vector.push(f32::from_le_bytes(chunk.try_into().unwrap()));
        }
        let created_at = i64::from_le_bytes(bytes[4 + dim * 4..].try_into().unwrap());
        Ok((vector, created_at))
    }

    /// Look up the embedding for `(text, model)`.
    ///
    /// Expired rows report a miss and are deleted in place.
    pub fn get(&self, text: &str, model: &str) -> Result<Option<Vec<f32>>> {
        let key = Self::key(text, model);
        match self.db.get(&key)? {
            Some(bytes) => {
                let (vector, created_at) = Self::decode(&bytes)?;
                let age = Utc::now().timestamp() - created_at;
                if age > self.ttl_secs {
                    self.db.remove(&key)?;
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(vector))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Store the embedding for `(text, model)`; last writer wins
    pub fn put(&self, text: &str, model: &str, vector: &[f32]) -> Result<()> {
        let key = Self::key(text, model);
        let value = Self::encode(vector, Utc::now().timestamp());
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Current counters and footprint
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size_bytes: self.db.size_on_disk().unwrap_or(0),
            entries: self.db.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = EmbeddingCache::ephemeral().unwrap();
        assert_eq!(cache.get("hello", "model-a").unwrap(), None);

        cache.put("hello", "model-a", &[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(
            cache.get("hello", "model-a").unwrap(),
            Some(vec![0.1, 0.2, 0.3])
        );

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn model_id_is_part_of_the_key() {
        let cache = EmbeddingCache::ephemeral().unwrap();
        cache.put("same text", "model-a", &[1.0]).unwrap();
        assert_eq!(cache.get("same text", "model-b").unwrap(), None);
        assert_eq!(cache.get("same text", "model-a").unwrap(), Some(vec![1.0]));
    }

    #[test]
    fn values_round_trip_bit_exact() {
        let cache = EmbeddingCache::ephemeral().unwrap();
        let vector: Vec<f32> = (0..384).map(|i| (i as f32 * 0.137).sin()).collect();
        cache.put("text", "m", &vector).unwrap();
        assert_eq!(cache.get("text", "m").unwrap(), Some(vector));
    }

    #[test]
    fn expired_rows_read_as_miss_and_disappear() {
        let cache = EmbeddingCache::ephemeral().unwrap();
        // Encode a row that is already past the TTL.
        let key = EmbeddingCache::key("old", "m");
        let stale = EmbeddingCache::encode(&[1.0], Utc::now().timestamp() - 40 * 86_400);
        cache.db.insert(key, stale).unwrap();

        assert_eq!(cache.get("old", "m").unwrap(), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let cache = EmbeddingCache::open(&path, 30).unwrap();
            cache.put("persistent", "m", &[0.5, 0.5]).unwrap();
            cache.flush().unwrap();
        }
        let cache = EmbeddingCache::open(&path, 30).unwrap();
        assert_eq!(
            cache.get("persistent", "m").unwrap(),
            Some(vec![0.5, 0.5])
        );
    }
}
