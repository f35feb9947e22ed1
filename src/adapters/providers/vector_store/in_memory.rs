//! In-memory vector store
//!
//! Brute-force cosine search over a concurrent map. No persistence; data is
//! lost on drop. Used by tests and ephemeral development setups, and as the
//! reference implementation the Qdrant wire adapter is checked against:
//! both enforce the same dimension/norm invariants and filter semantics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::domain::error::{Error, Result, StorageErrorKind};
use crate::domain::ports::{ScrollPage, StoreFilter, VectorStore};
use crate::domain::types::MemoryRecord;

/// Map-backed [`VectorStore`] implementation
pub struct InMemoryStore {
    records: DashMap<Uuid, MemoryRecord>,
    collection: String,
    dimension: usize,
    /// Upsert RPC counter; lets tests assert batching behavior
    pub upsert_calls: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store expecting vectors of `dimension`
    pub fn new(collection: &str, dimension: usize) -> Self {
        Self {
            records: DashMap::new(),
            collection: collection.to_string(),
            dimension,
            upsert_calls: AtomicU64::new(0),
        }
    }

    fn check_record(&self, record: &MemoryRecord) -> Result<()> {
        let embedding = record
            .embedding
            .as_ref()
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "record has no embedding"))?;
        if embedding.dimensions() != self.dimension {
            return Err(Error::storage(
                StorageErrorKind::Schema,
                format!(
                    "embedding dimension {} does not match collection dimension {}",
                    embedding.dimensions(),
                    self.dimension
                ),
            ));
        }
        let norm = embedding.l2_norm();
        if (norm - 1.0).abs() > 1e-3 {
            return Err(Error::storage(
                StorageErrorKind::Schema,
                format!("embedding is not L2-normalized (norm = {norm})"),
            ));
        }
        Ok(())
    }

    /// Number of stored records; test hook
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record matching a filter, unscored; test hook
    pub fn matching(&self, filter: &StoreFilter) -> Vec<MemoryRecord> {
        let mut out: Vec<MemoryRecord> = self
            .records
            .iter()
            .filter(|entry| record_matches(entry.value(), filter))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|r| r.id);
        out
    }
}

/// Evaluate a [`StoreFilter`] against one record
pub fn record_matches(record: &MemoryRecord, filter: &StoreFilter) -> bool {
    fn meta_str<'a>(record: &'a MemoryRecord, key: &str) -> Option<&'a str> {
        record.metadata.get(key).and_then(|v| v.as_str())
    }

    if let Some(category) = filter.category {
        if record.category != category {
            return false;
        }
    }
    if let Some(level) = filter.context_level {
        if record.context_level != level {
            return false;
        }
    }
    if let Some(scope) = filter.scope {
        if record.scope != scope {
            return false;
        }
    }
    if let Some(project) = &filter.project_name {
        if record.project_name.as_deref() != Some(project.as_str()) {
            return false;
        }
    }
    if let Some(state) = filter.lifecycle_state {
        if record.lifecycle_state != state {
            return false;
        }
    }
    if let Some(language) = &filter.language {
        if meta_str(record, "language") != Some(language.as_str()) {
            return false;
        }
    }
    if let Some(path) = &filter.file_path {
        if meta_str(record, "file_path") != Some(path.as_str()) {
            return false;
        }
    }
    if let Some(unit_type) = filter.unit_type {
        if meta_str(record, "unit_type") != Some(unit_type.as_str()) {
            return false;
        }
    }
    for tag in &filter.tags {
        if !record.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    if let Some(min) = filter.min_importance {
        if record.importance < min {
            return false;
        }
    }
    if let Some(max) = filter.max_importance {
        if record.importance > max {
            return false;
        }
    }
    if !within(record.created_at, filter.created_after, filter.created_before) {
        return false;
    }
    if let Some(before) = filter.last_accessed_before {
        if record.last_accessed_at >= before {
            return false;
        }
    }
    true
}

fn within(
    ts: DateTime<Utc>,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) -> bool {
    if let Some(after) = after {
        if ts < after {
            return false;
        }
    }
    if let Some(before) = before {
        if ts > before {
            return false;
        }
    }
    true
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, record: &MemoryRecord) -> Result<Uuid> {
        self.check_record(record)?;
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        self.records.insert(record.id, record.clone());
        Ok(record.id)
    }

    async fn batch_upsert(&self, records: &[MemoryRecord]) -> Result<Vec<Uuid>> {
        for record in records {
            self.check_record(record)?;
        }
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            self.records.insert(record.id, record.clone());
            ids.push(record.id);
        }
        Ok(ids)
    }

    async fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.remove(&id).is_some())
    }

    async fn delete_where(&self, filter: &StoreFilter) -> Result<u64> {
        let doomed: Vec<Uuid> = self
            .records
            .iter()
            .filter(|entry| record_matches(entry.value(), filter))
            .map(|entry| *entry.key())
            .collect();
        let count = doomed.len() as u64;
        for id in doomed {
            self.records.remove(&id);
        }
        Ok(count)
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &StoreFilter,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        let mut scored: Vec<(MemoryRecord, f32)> = self
            .records
            .iter()
            .filter(|entry| record_matches(entry.value(), filter))
            .filter_map(|entry| {
                let record = entry.value();
                record.embedding.as_ref().map(|e| {
                    let score = cosine(query, &e.vector).clamp(0.0, 1.0);
                    (record.clone(), score)
                })
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        scored.truncate(k);
        // Search results do not carry vectors, matching the wire adapter.
        for (record, _) in &mut scored {
            record.embedding = None;
        }
        Ok(scored)
    }

    async fn scroll(
        &self,
        filter: &StoreFilter,
        page_size: usize,
        offset: Option<String>,
    ) -> Result<ScrollPage> {
        let after: Option<Uuid> = match offset {
            Some(raw) => Some(Uuid::parse_str(&raw).map_err(|_| {
                Error::storage(StorageErrorKind::Backend, "invalid scroll offset")
            })?),
            None => None,
        };
        let mut matching = self.matching(filter);
        if let Some(after) = after {
            matching.retain(|r| r.id > after);
        }
        let next_offset = if matching.len() > page_size {
            matching.get(page_size - 1).map(|r| r.id.to_string())
        } else {
            None
        };
        matching.truncate(page_size);
        for record in &mut matching {
            record.embedding = None;
        }
        Ok(ScrollPage {
            records: matching,
            next_offset,
        })
    }

    async fn count(&self, filter: &StoreFilter) -> Result<u64> {
        Ok(self
            .records
            .iter()
            .filter(|entry| record_matches(entry.value(), filter))
            .count() as u64)
    }

    async fn collections(&self) -> Result<Vec<String>> {
        Ok(vec![self.collection.clone()])
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Embedding, MemoryCategory};

    fn unit_record(direction: usize, dim: usize) -> MemoryRecord {
        let mut vector = vec![0.0f32; dim];
        vector[direction] = 1.0;
        let mut record = MemoryRecord::new(format!("record {direction}"), MemoryCategory::Fact);
        record.embedding = Some(Embedding {
            vector,
            model: "test".into(),
        });
        record
    }

    #[tokio::test]
    async fn rejects_wrong_dimension() {
        let store = InMemoryStore::new("test", 4);
        let record = unit_record(0, 3);
        assert!(store.upsert(&record).await.is_err());
    }

    #[tokio::test]
    async fn rejects_unnormalized_vectors() {
        let store = InMemoryStore::new("test", 2);
        let mut record = MemoryRecord::new("x", MemoryCategory::Fact);
        record.embedding = Some(Embedding {
            vector: vec![3.0, 4.0],
            model: "test".into(),
        });
        assert!(store.upsert(&record).await.is_err());
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = InMemoryStore::new("test", 3);
        for direction in 0..3 {
            store.upsert(&unit_record(direction, 3)).await.unwrap();
        }
        let results = store
            .search(&[0.0, 1.0, 0.0], 2, &StoreFilter::any())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.content, "record 1");
        assert!(results[0].1 > results[1].1);
    }

    #[tokio::test]
    async fn scroll_pages_through_everything() {
        let store = InMemoryStore::new("test", 2);
        for i in 0..5 {
            let mut record = MemoryRecord::new(format!("r{i}"), MemoryCategory::Fact);
            record.embedding = Some(Embedding {
                vector: vec![1.0, 0.0],
                model: "test".into(),
            });
            store.upsert(&record).await.unwrap();
        }

        let mut seen = 0;
        let mut offset = None;
        loop {
            let page = store.scroll(&StoreFilter::any(), 2, offset).await.unwrap();
            seen += page.records.len();
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, 5);
    }
}
