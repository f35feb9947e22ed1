//! Qdrant vector store over its REST API
//!
//! A stateless wrapper: every operation acquires a pooled connection,
//! performs the HTTP round-trip, and releases the connection on the way out
//! (the guard returns the slot on drop, error paths included). The
//! collection is created on first use with a cosine ANN index, optional
//! int8 scalar quantization, and payload indices over the filterable
//! fields.
//!
//! ## Payload layout
//!
//! Core record fields are flattened to top-level payload keys alongside the
//! record's `metadata` entries. Timestamps are stored twice: RFC 3339
//! strings for round-tripping and `*_unix` floats for server-side range
//! filters. On read, core keys are lifted back into the record and every
//! remaining key lands in `metadata` (a `BTreeMap`, so re-nesting order is
//! deterministic). Unknown payload keys written by other tooling survive a
//! round-trip untouched.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::error::{Error, Result, StorageErrorKind};
use crate::domain::ports::{ScrollPage, StoreFilter, VectorStore};
use crate::domain::types::{
    ContextLevel, LifecycleState, MemoryCategory, MemoryRecord, MemoryScope,
};
use crate::infrastructure::config::{PoolConfig, StorageConfig};

use super::pool::{ConnectionFactory, Pool, PooledConnection};

/// Records per upsert RPC; chunks are all-or-nothing on the server
const UPSERT_CHUNK: usize = 256;

/// Payload keys owned by the record itself; everything else re-nests into
/// `metadata` on read
const CORE_KEYS: &[&str] = &[
    "content",
    "category",
    "context_level",
    "scope",
    "project_name",
    "importance",
    "lifecycle_state",
    "tags",
    "created_at",
    "updated_at",
    "last_accessed_at",
    "created_at_unix",
    "updated_at_unix",
    "last_accessed_at_unix",
    "access_count",
    "embedding_model",
];

/// Fields covered by payload indices
const INDEXED_FIELDS: &[(&str, &str)] = &[
    ("category", "keyword"),
    ("context_level", "keyword"),
    ("project_name", "keyword"),
    ("scope", "keyword"),
    ("lifecycle_state", "keyword"),
    ("language", "keyword"),
    ("file_path", "keyword"),
    ("unit_type", "keyword"),
    ("tags", "keyword"),
    ("importance", "float"),
    ("created_at_unix", "float"),
    ("last_accessed_at_unix", "float"),
];

/// One pooled HTTP client bound to a Qdrant endpoint
pub struct QdrantConnection {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

impl QdrantConnection {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let mut req = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    async fn call(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        let status = response.status();
        let payload: Value = match response.json().await {
            Ok(v) => v,
            Err(_) if status.is_success() => Value::Null,
            Err(e) => return Err(e.into()),
        };

        if status.is_success() {
            return Ok(payload);
        }
        let detail = payload
            .pointer("/status/error")
            .and_then(Value::as_str)
            .unwrap_or("qdrant request failed")
            .to_string();
        let kind = match status {
            StatusCode::NOT_FOUND => StorageErrorKind::NotFound,
            StatusCode::CONFLICT => StorageErrorKind::Conflict,
            s if s.is_server_error() => StorageErrorKind::Transient,
            StatusCode::TOO_MANY_REQUESTS => StorageErrorKind::Transient,
            StatusCode::UNPROCESSABLE_ENTITY => StorageErrorKind::Schema,
            _ => StorageErrorKind::Backend,
        };
        Err(Error::storage(kind, format!("{status}: {detail}")))
    }
}

#[async_trait]
impl PooledConnection for QdrantConnection {
    async fn health_medium(&self) -> Result<()> {
        self.call(reqwest::Method::GET, "/collections", None)
            .await
            .map(|_| ())
            .map_err(|e| Error::ConnectionHealth {
                detail: e.to_string(),
            })
    }

    async fn health_deep(&self) -> Result<()> {
        let path = format!("/collections/{}", self.collection);
        match self.call(reqwest::Method::GET, &path, None).await {
            Ok(_) => Ok(()),
            // A missing collection is a bootstrap condition, not an
            // unhealthy client.
            Err(Error::Storage {
                kind: StorageErrorKind::NotFound,
                ..
            }) => Ok(()),
            Err(e) => Err(Error::ConnectionHealth {
                detail: e.to_string(),
            }),
        }
    }

    async fn close(&self) {
        // reqwest clients release their sockets on drop.
    }
}

/// Creates Qdrant connections for the pool
pub struct QdrantConnectionFactory {
    config: StorageConfig,
}

impl QdrantConnectionFactory {
    /// Build a factory from storage settings
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory<QdrantConnection> for QdrantConnectionFactory {
    async fn create(&self) -> Result<QdrantConnection> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.operation_timeout_secs))
            .build()
            .map_err(|e| Error::ConnectionCreation {
                detail: e.to_string(),
            })?;
        let conn = QdrantConnection {
            http,
            base_url: self.config.qdrant_url.clone(),
            api_key: self.config.qdrant_api_key.clone(),
            collection: self.config.collection_name.clone(),
        };
        // Validate connectivity so creation failures surface here, where
        // the pool's reservation accounting can unwind them.
        conn.call(reqwest::Method::GET, "/collections", None)
            .await
            .map_err(|e| Error::ConnectionCreation {
                detail: e.to_string(),
            })?;
        Ok(conn)
    }
}

/// Qdrant-backed [`VectorStore`]
pub struct QdrantStore {
    pool: Arc<Pool<QdrantConnection>>,
    collection: String,
    dimension: usize,
    quantization: bool,
}

impl QdrantStore {
    /// Build the store and its connection pool
    pub fn new(storage: &StorageConfig, pool_config: PoolConfig, dimension: usize) -> Self {
        let factory = Arc::new(QdrantConnectionFactory::new(storage.clone()));
        Self {
            pool: Pool::new(factory, pool_config),
            collection: storage.collection_name.clone(),
            dimension,
            quantization: storage.quantization,
        }
    }

    /// Pool metrics for status reporting
    pub fn pool_metrics(&self) -> super::pool::PoolMetrics {
        self.pool.metrics()
    }

    /// Close the pool
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn points_path(&self, suffix: &str) -> String {
        format!("/collections/{}/points{suffix}", self.collection)
    }

    fn record_to_payload(record: &MemoryRecord) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("content".into(), record.content.clone().into());
        payload.insert("category".into(), record.category.to_string().into());
        payload.insert(
            "context_level".into(),
            record.context_level.as_str().into(),
        );
        payload.insert("scope".into(), record.scope.to_string().into());
        if let Some(project) = &record.project_name {
            payload.insert("project_name".into(), project.clone().into());
        }
        payload.insert("importance".into(), json!(record.importance));
        payload.insert(
            "lifecycle_state".into(),
            record.lifecycle_state.as_str().into(),
        );
        payload.insert("tags".into(), json!(record.tags));
        payload.insert("created_at".into(), record.created_at.to_rfc3339().into());
        payload.insert("updated_at".into(), record.updated_at.to_rfc3339().into());
        payload.insert(
            "last_accessed_at".into(),
            record.last_accessed_at.to_rfc3339().into(),
        );
        payload.insert(
            "created_at_unix".into(),
            json!(record.created_at.timestamp() as f64),
        );
        payload.insert(
            "updated_at_unix".into(),
            json!(record.updated_at.timestamp() as f64),
        );
        payload.insert(
            "last_accessed_at_unix".into(),
            json!(record.last_accessed_at.timestamp() as f64),
        );
        payload.insert("access_count".into(), record.access_count.into());
        if let Some(embedding) = &record.embedding {
            payload.insert("embedding_model".into(), embedding.model.clone().into());
        }
        // Metadata entries flatten beside the core keys.
        for (key, value) in &record.metadata {
            payload.insert(key.clone(), value.clone());
        }
        payload
    }

    fn payload_to_record(
        id: Uuid,
        payload: &Map<String, Value>,
        vector: Option<Vec<f32>>,
    ) -> Result<MemoryRecord> {
        let text = |key: &str| -> Option<&str> { payload.get(key).and_then(Value::as_str) };
        let parse_ts = |key: &str| -> Result<chrono::DateTime<chrono::Utc>> {
            let raw = text(key).ok_or_else(|| {
                Error::storage(StorageErrorKind::Schema, format!("payload missing `{key}`"))
            })?;
            chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| {
                    Error::storage(StorageErrorKind::Schema, format!("bad `{key}`: {e}"))
                })
        };

        let content = text("content")
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "payload missing `content`"))?
            .to_string();
        let category = text("category")
            .and_then(MemoryCategory::from_string)
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "bad `category`"))?;
        let context_level = text("context_level")
            .and_then(ContextLevel::from_string)
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "bad `context_level`"))?;
        let scope = text("scope")
            .and_then(MemoryScope::from_string)
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "bad `scope`"))?;
        let lifecycle_state = text("lifecycle_state")
            .and_then(LifecycleState::from_string)
            .unwrap_or_default();

        let embedding = vector.map(|v| crate::domain::types::Embedding {
            vector: v,
            model: text("embedding_model").unwrap_or_default().to_string(),
        });

        let mut metadata = BTreeMap::new();
        for (key, value) in payload {
            if !CORE_KEYS.contains(&key.as_str()) {
                metadata.insert(key.clone(), value.clone());
            }
        }

        Ok(MemoryRecord {
            id,
            content,
            embedding,
            category,
            context_level,
            scope,
            project_name: text("project_name").map(str::to_string),
            importance: payload
                .get("importance")
                .and_then(Value::as_f64)
                .unwrap_or(0.5) as f32,
            lifecycle_state,
            tags: payload
                .get("tags")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            created_at: parse_ts("created_at")?,
            updated_at: parse_ts("updated_at")?,
            last_accessed_at: parse_ts("last_accessed_at")?,
            access_count: payload
                .get("access_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            metadata,
        })
    }

    fn filter_to_qdrant(filter: &StoreFilter) -> Option<Value> {
        let mut must: Vec<Value> = Vec::new();
        let mut match_clause = |key: &str, value: Value| {
            must.push(json!({"key": key, "match": {"value": value}}));
        };

        if let Some(category) = filter.category {
            match_clause("category", category.to_string().into());
        }
        if let Some(level) = filter.context_level {
            match_clause("context_level", level.as_str().into());
        }
        if let Some(scope) = filter.scope {
            match_clause("scope", scope.to_string().into());
        }
        if let Some(project) = &filter.project_name {
            match_clause("project_name", project.clone().into());
        }
        if let Some(state) = filter.lifecycle_state {
            match_clause("lifecycle_state", state.as_str().into());
        }
        if let Some(language) = &filter.language {
            match_clause("language", language.clone().into());
        }
        if let Some(path) = &filter.file_path {
            match_clause("file_path", path.clone().into());
        }
        if let Some(unit_type) = filter.unit_type {
            match_clause("unit_type", unit_type.as_str().into());
        }
        for tag in &filter.tags {
            match_clause("tags", tag.clone().into());
        }

        if filter.min_importance.is_some() || filter.max_importance.is_some() {
            let mut range = Map::new();
            if let Some(min) = filter.min_importance {
                range.insert("gte".into(), json!(min));
            }
            if let Some(max) = filter.max_importance {
                range.insert("lte".into(), json!(max));
            }
            must.push(json!({"key": "importance", "range": range}));
        }
        if filter.created_after.is_some() || filter.created_before.is_some() {
            // Date bounds go to the server as numeric Unix seconds.
            let mut range = Map::new();
            if let Some(from) = filter.created_after {
                range.insert("gte".into(), json!(from.timestamp() as f64));
            }
            if let Some(to) = filter.created_before {
                range.insert("lte".into(), json!(to.timestamp() as f64));
            }
            must.push(json!({"key": "created_at_unix", "range": range}));
        }
        if let Some(before) = filter.last_accessed_before {
            must.push(json!({
                "key": "last_accessed_at_unix",
                "range": {"lt": before.timestamp() as f64}
            }));
        }

        if must.is_empty() {
            None
        } else {
            Some(json!({"must": must}))
        }
    }

    fn point_from_result(value: &Value, with_vector: bool) -> Result<(Uuid, MemoryRecord)> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "point id is not a uuid"))?;
        let payload = value
            .get("payload")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "point has no payload"))?;
        let vector = if with_vector {
            value
                .get("vector")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_f64)
                        .map(|v| v as f32)
                        .collect::<Vec<f32>>()
                })
        } else {
            None
        };
        let record = Self::payload_to_record(id, payload, vector)?;
        Ok((id, record))
    }

    fn check_dimension(&self, record: &MemoryRecord) -> Result<()> {
        let embedding = record.embedding.as_ref().ok_or_else(|| {
            Error::storage(StorageErrorKind::Schema, "record has no embedding")
        })?;
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
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self) -> Result<()> {
        let conn = self.pool.acquire().await?;
        let path = format!("/collections/{}", self.collection);
        match conn.call(reqwest::Method::GET, &path, None).await {
            Ok(_) => return Ok(()),
            Err(Error::Storage {
                kind: StorageErrorKind::NotFound,
                ..
            }) => {}
            Err(e) => return Err(e),
        }

        let mut body = json!({
            "vectors": {"size": self.dimension, "distance": "Cosine"}
        });
        if self.quantization {
            body["quantization_config"] = json!({"scalar": {"type": "int8"}});
        }
        conn.call(reqwest::Method::PUT, &path, Some(body)).await?;

        for (field, schema) in INDEXED_FIELDS {
            let index_path = format!("/collections/{}/index?wait=true", self.collection);
            conn.call(
                reqwest::Method::PUT,
                &index_path,
                Some(json!({"field_name": field, "field_schema": schema})),
            )
            .await?;
        }
        tracing::info!(
            collection = %self.collection,
            dimension = self.dimension,
            quantization = self.quantization,
            "collection created"
        );
        Ok(())
    }

    async fn upsert(&self, record: &MemoryRecord) -> Result<Uuid> {
        let ids = self.batch_upsert(std::slice::from_ref(record)).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::internal("upsert returned no id"))
    }

    async fn batch_upsert(&self, records: &[MemoryRecord]) -> Result<Vec<Uuid>> {
        for record in records {
            self.check_dimension(record)?;
        }
        let conn = self.pool.acquire().await?;
        let mut ids = Vec::with_capacity(records.len());
        for chunk in records.chunks(UPSERT_CHUNK) {
            let points: Vec<Value> = chunk
                .iter()
                .map(|record| {
                    ids.push(record.id);
                    json!({
                        "id": record.id.to_string(),
                        "vector": record.embedding.as_ref().map(|e| &e.vector),
                        "payload": Self::record_to_payload(record),
                    })
                })
                .collect();
            conn.call(
                reqwest::Method::PUT,
                &self.points_path("?wait=true"),
                Some(json!({"points": points})),
            )
            .await?;
        }
        Ok(ids)
    }

    async fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        let conn = self.pool.acquire().await?;
        let result = conn
            .call(
                reqwest::Method::POST,
                &self.points_path(""),
                Some(json!({
                    "ids": [id.to_string()],
                    "with_payload": true,
                    "with_vector": true,
                })),
            )
            .await?;
        let points = result
            .pointer("/result")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "malformed points response"))?;
        match points.first() {
            Some(point) => Self::point_from_result(point, true).map(|(_, r)| Some(r)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        // Existence check first so the caller can distinguish a no-op.
        if self.get(id).await?.is_none() {
            return Ok(false);
        }
        let conn = self.pool.acquire().await?;
        conn.call(
            reqwest::Method::POST,
            &self.points_path("/delete?wait=true"),
            Some(json!({"points": [id.to_string()]})),
        )
        .await?;
        Ok(true)
    }

    async fn delete_where(&self, filter: &StoreFilter) -> Result<u64> {
        let count = self.count(filter).await?;
        if count == 0 {
            return Ok(0);
        }
        let conn = self.pool.acquire().await?;
        let clause = Self::filter_to_qdrant(filter).unwrap_or_else(|| json!({}));
        conn.call(
            reqwest::Method::POST,
            &self.points_path("/delete?wait=true"),
            Some(json!({"filter": clause})),
        )
        .await?;
        Ok(count)
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &StoreFilter,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        let conn = self.pool.acquire().await?;
        let mut body = json!({
            "vector": query,
            "limit": k,
            "with_payload": true,
            "params": {"exact": false},
        });
        if let Some(clause) = Self::filter_to_qdrant(filter) {
            body["filter"] = clause;
        }
        let result = conn
            .call(
                reqwest::Method::POST,
                &self.points_path("/search"),
                Some(body),
            )
            .await?;
        let hits = result
            .pointer("/result")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "malformed search response"))?;

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let (_, record) = Self::point_from_result(hit, false)?;
            let score = hit
                .get("score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0) as f32;
            out.push((record, score));
        }
        Ok(out)
    }

    async fn scroll(
        &self,
        filter: &StoreFilter,
        page_size: usize,
        offset: Option<String>,
    ) -> Result<ScrollPage> {
        let conn = self.pool.acquire().await?;
        let mut body = json!({
            "limit": page_size,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(clause) = Self::filter_to_qdrant(filter) {
            body["filter"] = clause;
        }
        if let Some(offset) = offset {
            body["offset"] = offset.into();
        }
        let result = conn
            .call(
                reqwest::Method::POST,
                &self.points_path("/scroll"),
                Some(body),
            )
            .await?;
        let points = result
            .pointer("/result/points")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "malformed scroll response"))?;

        let mut records = Vec::with_capacity(points.len());
        for point in points {
            let (_, record) = Self::point_from_result(point, false)?;
            records.push(record);
        }
        let next_offset = result
            .pointer("/result/next_page_offset")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(ScrollPage {
            records,
            next_offset,
        })
    }

    async fn count(&self, filter: &StoreFilter) -> Result<u64> {
        let conn = self.pool.acquire().await?;
        let mut body = json!({"exact": true});
        if let Some(clause) = Self::filter_to_qdrant(filter) {
            body["filter"] = clause;
        }
        let result = conn
            .call(
                reqwest::Method::POST,
                &self.points_path("/count"),
                Some(body),
            )
            .await?;
        result
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::storage(StorageErrorKind::Schema, "malformed count response"))
    }

    async fn collections(&self) -> Result<Vec<String>> {
        let conn = self.pool.acquire().await?;
        let result = conn
            .call(reqwest::Method::GET, "/collections", None)
            .await?;
        Ok(result
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn backend_name(&self) -> &'static str {
        "qdrant"
    }
}
