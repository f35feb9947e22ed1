//! Qdrant REST adapter against a stubbed HTTP server

use claude_rag::adapters::providers::vector_store::QdrantStore;
use claude_rag::domain::error::Error;
use claude_rag::domain::ports::{StoreFilter, VectorStore};
use claude_rag::domain::types::{Embedding, MemoryCategory, MemoryRecord};
use claude_rag::infrastructure::config::{PoolConfig, StorageConfig};
use serde_json::json;

fn storage_config(url: &str) -> StorageConfig {
    StorageConfig {
        qdrant_url: url.to_string(),
        collection_name: "claude_memory".to_string(),
        ..StorageConfig::default()
    }
}

fn pool_config() -> PoolConfig {
    PoolConfig {
        size: 2,
        min_size: 1,
        timeout_secs: 2,
        recycle_secs: 3600,
        health_check_interval_secs: 3600,
    }
}

fn store_for(server: &mockito::ServerGuard) -> QdrantStore {
    QdrantStore::new(&storage_config(&server.url()), pool_config(), 4)
}

/// Connection creation probes GET /collections; most tests need it stubbed.
fn mock_connectivity(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/collections")
        .with_status(200)
        .with_body(json!({"result": {"collections": [{"name": "claude_memory"}]}, "status": "ok"}).to_string())
        .expect_at_least(1)
        .create()
}

fn unit_record() -> MemoryRecord {
    let mut record = MemoryRecord::new("stored text", MemoryCategory::Fact);
    record.embedding = Some(Embedding {
        vector: vec![1.0, 0.0, 0.0, 0.0],
        model: "test".into(),
    });
    record
}

#[tokio::test]
async fn ensure_collection_bootstraps_schema_and_indices() {
    let mut server = mockito::Server::new_async().await;
    let _connectivity = mock_connectivity(&mut server);

    let missing = server
        .mock("GET", "/collections/claude_memory")
        .with_status(404)
        .with_body(json!({"status": {"error": "not found"}}).to_string())
        .create();
    let create = server
        .mock("PUT", "/collections/claude_memory")
        .match_body(mockito::Matcher::PartialJson(json!({
            "vectors": {"size": 4, "distance": "Cosine"}
        })))
        .with_status(200)
        .with_body(json!({"result": true, "status": "ok"}).to_string())
        .create();
    let indices = server
        .mock("PUT", "/collections/claude_memory/index?wait=true")
        .with_status(200)
        .with_body(json!({"result": true, "status": "ok"}).to_string())
        .expect(12)
        .create();

    let store = store_for(&server);
    store.ensure_collection().await.unwrap();

    missing.assert_async().await;
    create.assert_async().await;
    indices.assert_async().await;
}

#[tokio::test]
async fn search_sends_filter_and_parses_hits() {
    let mut server = mockito::Server::new_async().await;
    let _connectivity = mock_connectivity(&mut server);

    let id = uuid::Uuid::new_v4();
    let search = server
        .mock("POST", "/collections/claude_memory/points/search")
        .match_body(mockito::Matcher::PartialJson(json!({
            "limit": 5,
            "filter": {"must": [{"key": "category", "match": {"value": "fact"}}]}
        })))
        .with_status(200)
        .with_body(
            json!({
                "result": [{
                    "id": id.to_string(),
                    "score": 0.87,
                    "payload": {
                        "content": "stored text",
                        "category": "fact",
                        "context_level": "PROJECT_CONTEXT",
                        "scope": "global",
                        "importance": 0.5,
                        "lifecycle_state": "ACTIVE",
                        "tags": [],
                        "created_at": "2024-05-01T00:00:00Z",
                        "updated_at": "2024-05-01T00:00:00Z",
                        "last_accessed_at": "2024-05-01T00:00:00Z",
                        "created_at_unix": 1714521600.0,
                        "updated_at_unix": 1714521600.0,
                        "last_accessed_at_unix": 1714521600.0,
                        "access_count": 3,
                        "custom": "kept"
                    }
                }],
                "status": "ok"
            })
            .to_string(),
        )
        .create();

    let store = store_for(&server);
    let filter = StoreFilter {
        category: Some(MemoryCategory::Fact),
        ..StoreFilter::default()
    };
    let results = store.search(&[1.0, 0.0, 0.0, 0.0], 5, &filter).await.unwrap();

    search.assert_async().await;
    assert_eq!(results.len(), 1);
    let (record, score) = &results[0];
    assert_eq!(record.id, id);
    assert_eq!(record.content, "stored text");
    assert_eq!(record.access_count, 3);
    assert_eq!(record.metadata.get("custom"), Some(&json!("kept")));
    assert!((score - 0.87).abs() < 1e-6);
}

#[tokio::test]
async fn batch_upsert_chunks_and_validates_dimensions() {
    let mut server = mockito::Server::new_async().await;
    let _connectivity = mock_connectivity(&mut server);

    let upsert = server
        .mock("PUT", "/collections/claude_memory/points?wait=true")
        .with_status(200)
        .with_body(json!({"result": {"status": "acknowledged"}, "status": "ok"}).to_string())
        // 300 records at a 256-record chunk size → 2 RPCs.
        .expect(2)
        .create();

    let store = store_for(&server);
    let records: Vec<MemoryRecord> = (0..300).map(|_| unit_record()).collect();
    let ids = store.batch_upsert(&records).await.unwrap();
    assert_eq!(ids.len(), 300);
    upsert.assert_async().await;

    // A wrong-dimension record never reaches the wire.
    let mut bad = unit_record();
    bad.embedding = Some(Embedding {
        vector: vec![1.0, 0.0],
        model: "test".into(),
    });
    let err = store.batch_upsert(&[bad]).await.unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
}

#[tokio::test]
async fn server_errors_map_to_transient() {
    let mut server = mockito::Server::new_async().await;
    let _connectivity = mock_connectivity(&mut server);

    let _count = server
        .mock("POST", "/collections/claude_memory/points/count")
        .with_status(503)
        .with_body(json!({"status": {"error": "overloaded"}}).to_string())
        .create();

    let store = store_for(&server);
    let err = store.count(&StoreFilter::any()).await.unwrap_err();
    assert!(err.is_transient(), "expected transient, got {err}");
}

#[tokio::test]
async fn count_returns_exact_total()  {
    let mut server = mockito::Server::new_async().await;
    let _connectivity = mock_connectivity(&mut server);

    let _count = server
        .mock("POST", "/collections/claude_memory/points/count")
        .with_status(200)
        .with_body(json!({"result": {"count": 42}, "status": "ok"}).to_string())
        .create();

    let store = store_for(&server);
    assert_eq!(store.count(&StoreFilter::any()).await.unwrap(), 42);
}

#[tokio::test]
async fn unreachable_backend_is_a_creation_failure() {
    // Nothing is listening on this port.
    let config = storage_config("http://127.0.0.1:1");
    let store = QdrantStore::new(&config, pool_config(), 4);
    let err = store.count(&StoreFilter::any()).await.unwrap_err();
    assert!(
        matches!(err, Error::ConnectionCreation { .. }),
        "got {err}"
    );
    assert!(err.is_transient());
}
