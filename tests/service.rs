//! End-to-end scenarios against the in-memory service assembly

use claude_rag::application::{MemoryService, UpdateFields};
use claude_rag::domain::types::ContextLevel;
use claude_rag::infrastructure::config::RagConfig;
use serde_json::json;
use uuid::Uuid;

fn test_config(dir: &tempfile::TempDir) -> RagConfig {
    let mut config = RagConfig::default();
    config.embedding.cache_path = dir.path().join("cache.db");
    config.security.security_log_path = dir.path().join("security.log");
    config
}

fn service(dir: &tempfile::TempDir) -> MemoryService {
    MemoryService::ephemeral(test_config(dir)).unwrap()
}

async fn store_simple(service: &MemoryService, content: &str, category: &str) -> Uuid {
    let envelope = service
        .store(content, category, "global", None, Some("auto"), 0.5, &[], None)
        .await;
    assert_eq!(envelope.status, "success", "{:?}", envelope.error);
    envelope.data.unwrap()
}

#[tokio::test]
async fn store_then_retrieve_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let content = "I prefer Python for backend development";
    let id = store_simple(&service, content, "preference").await;

    // The stub embedder is content-addressed, so the identical query is a
    // perfect semantic match.
    let results = service
        .retrieve(content, 1, None, "semantic", None)
        .await;
    assert_eq!(results.status, "success");
    let results = results.data.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.id, id);
    assert_eq!(results[0].record.content, content);
    assert!(results[0].score >= 0.5, "score = {}", results[0].score);
    // Preferences auto-classify to the user level.
    assert_eq!(
        results[0].record.context_level,
        ContextLevel::UserPreference
    );
}

#[tokio::test]
async fn update_changes_fields_and_reembeds_content() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let id = store_simple(&service, "original content", "fact").await;

    let updated = service
        .update(
            id,
            UpdateFields {
                content: Some("replacement content".into()),
                importance: Some(0.9),
                tags: Some(vec!["updated".into()]),
                ..UpdateFields::default()
            },
        )
        .await;
    assert_eq!(updated.status, "success");
    let record = updated.data.unwrap();
    assert_eq!(record.content, "replacement content");
    assert_eq!(record.importance, 0.9);
    assert_eq!(record.tags, vec!["updated".to_string()]);

    // The new content is findable, the old is not a perfect match anymore.
    let results = service
        .retrieve("replacement content", 1, None, "semantic", None)
        .await
        .data
        .unwrap();
    assert_eq!(results[0].record.id, id);
}

#[tokio::test]
async fn update_unknown_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let envelope = service
        .update(Uuid::new_v4(), UpdateFields::default())
        .await;
    assert_eq!(envelope.status, "error");
    assert_eq!(envelope.error.unwrap().kind, "not_found");
}

#[tokio::test]
async fn delete_reports_existence() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let id = store_simple(&service, "to be deleted", "fact").await;

    assert_eq!(service.delete(id).await.data, Some(true));
    assert_eq!(service.delete(id).await.data, Some(false));
}

#[tokio::test]
async fn injection_is_rejected_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let envelope = service
        .store(
            "'; DROP TABLE users;--",
            "fact",
            "global",
            None,
            None,
            0.5,
            &[],
            None,
        )
        .await;
    assert_eq!(envelope.status, "error");
    let error = envelope.error.unwrap();
    assert_eq!(error.kind, "injection");
    assert!(!error.message.contains("DROP TABLE"));
    assert!(error.message.contains("<redacted>"));

    // No record was created.
    let status = service.get_status().await.data.unwrap();
    assert_eq!(status.memory_count, 0);

    // One security log entry with the operation and kind.
    let log = std::fs::read_to_string(dir.path().join("security.log")).unwrap();
    let lines: Vec<_> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(entry["op"], "store");
    assert_eq!(entry["kind"], "injection");
}

#[tokio::test]
async fn read_only_mode_rejects_mutations_before_io() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.security.read_only_mode = true;
    let service = MemoryService::ephemeral(config).unwrap();

    let envelope = service
        .store("anything", "fact", "global", None, None, 0.5, &[], None)
        .await;
    assert_eq!(envelope.status, "error");
    assert_eq!(envelope.error.unwrap().kind, "read_only");

    let envelope = service.delete(Uuid::new_v4()).await;
    assert_eq!(envelope.error.unwrap().kind, "read_only");

    let envelope = service
        .update(Uuid::new_v4(), UpdateFields::default())
        .await;
    assert_eq!(envelope.error.unwrap().kind, "read_only");

    let envelope = service.expire_sessions().await;
    assert_eq!(envelope.error.unwrap().kind, "read_only");

    // Reads still work.
    let envelope = service.retrieve("query", 5, None, "semantic", None).await;
    assert_eq!(envelope.status, "success");
}

#[tokio::test]
async fn pinned_retrievals_enforce_their_context_level() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let pref = service
        .store(
            "shared phrasing alpha",
            "preference",
            "global",
            None,
            Some("USER_PREFERENCE"),
            0.5,
            &[],
            None,
        )
        .await
        .data
        .unwrap();
    service
        .store(
            "shared phrasing beta",
            "fact",
            "global",
            None,
            Some("PROJECT_CONTEXT"),
            0.5,
            &[],
            None,
        )
        .await
        .data
        .unwrap();
    service
        .store(
            "shared phrasing gamma",
            "context",
            "global",
            None,
            Some("SESSION_STATE"),
            0.5,
            &[],
            None,
        )
        .await
        .data
        .unwrap();

    let results = service
        .retrieve_preferences("shared phrasing alpha", 10)
        .await
        .data
        .unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|r| r.record.context_level == ContextLevel::UserPreference));
    assert!(results.iter().any(|r| r.record.id == pref));

    let results = service
        .retrieve_session_state("shared phrasing gamma", 10)
        .await
        .data
        .unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|r| r.record.context_level == ContextLevel::SessionState));
}

#[tokio::test]
async fn list_total_is_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    for i in 0..7 {
        store_simple(&service, &format!("memory number {i}"), "fact").await;
    }

    let page = service.list(None, 0, 3).await.data.unwrap();
    assert_eq!(page.results.len(), 3);
    assert_eq!(page.total, 7);
    assert!(page.has_more);
    assert!(page.total >= page.results.len() as u64);

    let page = service.list(None, 6, 3).await.data.unwrap();
    assert_eq!(page.results.len(), 1);
    assert!(!page.has_more);

    let filtered = service
        .list(Some(&json!({"category": "commit"})), 0, 10)
        .await
        .data
        .unwrap();
    assert!(filtered.results.is_empty());
    assert_eq!(filtered.total, 0);
}

#[tokio::test]
async fn unknown_filter_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let envelope = service
        .retrieve("q", 5, Some(&json!({"owner": "me"})), "semantic", None)
        .await;
    assert_eq!(envelope.status, "error");
    assert_eq!(envelope.error.unwrap().kind, "validation");
}

#[tokio::test]
async fn session_expiry_sweep_removes_idle_session_state() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    service
        .store(
            "current session scratchpad",
            "context",
            "global",
            None,
            Some("SESSION_STATE"),
            0.5,
            &[],
            None,
        )
        .await
        .data
        .unwrap();

    // Fresh records survive the sweep.
    assert_eq!(service.expire_sessions().await.data, Some(0));
    let status = service.get_status().await.data.unwrap();
    assert_eq!(status.memory_count, 1);
}

#[tokio::test]
async fn status_reports_backend_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    store_simple(&service, "one memory", "fact").await;

    let status = service.get_status().await.data.unwrap();
    assert_eq!(status.storage_backend, "in-memory");
    assert!(!status.read_only_mode);
    assert_eq!(status.memory_count, 1);
    assert_eq!(status.collections, vec!["claude_memory".to_string()]);
}

#[tokio::test]
async fn hybrid_mode_ranks_keyword_overlap_higher_on_dense_ties() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    store_simple(&service, "database connection pooling with retries", "fact").await;
    store_simple(&service, "weekend hiking trip photos", "fact").await;

    let results = service
        .retrieve("connection pooling", 2, None, "hybrid", None)
        .await
        .data
        .unwrap();
    assert!(!results.is_empty());
    assert!(results[0].record.content.contains("pooling"));
    assert!(results[0].scores.keyword > 0.0);
}

#[tokio::test]
async fn cross_project_search_requires_opt_in() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.search.current_project = Some("alpha".into());
    config.search.cross_project_opt_in = vec!["shared".into()];
    let service = MemoryService::ephemeral(config).unwrap();

    // Current project and opted-in projects are fine.
    assert_eq!(
        service
            .search_code("query", Some("alpha"), 5, None, None, "semantic")
            .await
            .status,
        "success"
    );
    assert_eq!(
        service
            .search_code("query", Some("shared"), 5, None, None, "semantic")
            .await
            .status,
        "success"
    );

    // Everything else is a security rejection.
    let envelope = service
        .search_code("query", Some("secret"), 5, None, None, "semantic")
        .await;
    assert_eq!(envelope.status, "error");
    assert_eq!(envelope.error.unwrap().kind, "security");
}
