//! Doc ingestion and git history indexing against the in-memory assembly

use claude_rag::application::MemoryService;
use claude_rag::domain::types::MemoryCategory;
use claude_rag::infrastructure::config::RagConfig;
use git2::{Repository, Signature, Time};
use std::path::Path;

fn test_config(dir: &tempfile::TempDir) -> RagConfig {
    let mut config = RagConfig::default();
    config.embedding.cache_path = dir.path().join("cache.db");
    config.security.security_log_path = dir.path().join("security.log");
    config
}

#[tokio::test]
async fn ingest_docs_chunks_by_heading() {
    let state = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let service = MemoryService::ephemeral(test_config(&state)).unwrap();

    std::fs::write(
        docs.path().join("guide.md"),
        "# Setup\n\nInstall the toolchain first.\n\n## Linux\n\nUse your package manager.\n\n## macOS\n\nUse brew install.\n",
    )
    .unwrap();
    std::fs::write(docs.path().join("notes.txt"), "not markdown").unwrap();

    let report = service
        .ingest_docs(docs.path().to_str().unwrap(), Some("demo"))
        .await
        .data
        .unwrap();
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.chunks, 3);

    let page = service
        .list(Some(&serde_json::json!({"category": "doc"})), 0, 10)
        .await
        .data
        .unwrap();
    assert_eq!(page.results.len(), 3);
    let crumbs: Vec<String> = page
        .results
        .iter()
        .filter_map(|r| r.metadata.get("heading_path"))
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    assert!(crumbs.contains(&"Setup > Linux".to_string()));
}

#[tokio::test]
async fn reingesting_docs_does_not_duplicate() {
    let state = tempfile::tempdir().unwrap();
    let docs = tempfile::tempdir().unwrap();
    let service = MemoryService::ephemeral(test_config(&state)).unwrap();
    std::fs::write(docs.path().join("a.md"), "# One\n\ntext\n").unwrap();

    let dir = docs.path().to_str().unwrap();
    service.ingest_docs(dir, None).await.data.unwrap();
    service.ingest_docs(dir, None).await.data.unwrap();

    let page = service
        .list(Some(&serde_json::json!({"category": "doc"})), 0, 10)
        .await
        .data
        .unwrap();
    assert_eq!(page.results.len(), 1);
}

/// Build a small repository with commits at controlled timestamps.
fn seed_repo(dir: &Path, commits: &[(&str, i64)]) {
    let repo = Repository::init(dir).unwrap();
    let mut parent: Option<git2::Oid> = None;
    for (i, (message, when)) in commits.iter().enumerate() {
        let file = dir.join(format!("file{i}.txt"));
        std::fs::write(&file, format!("change {i}\n")).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_path(Path::new(&format!("file{i}.txt")))
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::new("Dev", "dev@example.com", &Time::new(*when, 0)).unwrap();
        let parents: Vec<git2::Commit> = parent
            .into_iter()
            .map(|oid| repo.find_commit(oid).unwrap())
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap();
        parent = Some(oid);
    }
}

#[tokio::test]
async fn index_git_stores_commits_with_dates_and_stats() {
    let state = tempfile::tempdir().unwrap();
    let repo_dir = tempfile::tempdir().unwrap();
    let service = MemoryService::ephemeral(test_config(&state)).unwrap();

    // One commit in 2023, two in 2024.
    seed_repo(
        repo_dir.path(),
        &[
            ("add telemetry pipeline", 1_690_000_000),   // 2023-07
            ("fix auth token refresh", 1_706_000_000),   // 2024-01
            ("fix auth session expiry", 1_712_000_000),  // 2024-04
        ],
    );

    let report = service
        .index_git(repo_dir.path().to_str().unwrap(), Some("demo"), "auto")
        .await
        .data
        .unwrap();
    assert_eq!(report.commits_indexed, 3);
    assert!(report.diffs_included);

    // Date-bounded search: only the 2024 commits qualify.
    let results = service
        .search_git_commits("fix auth", Some("2024-01-01"), None, 10)
        .await
        .data
        .unwrap();
    assert!(!results.is_empty());
    for result in &results {
        assert_eq!(result.record.category, MemoryCategory::Commit);
        let commit = result.record.commit().expect("commit payload");
        assert!(
            commit.commit_date_unix >= 1_704_067_200.0,
            "commit from {} leaked through the date filter",
            commit.commit_date_unix
        );
        assert_eq!(commit.commit_hash.len(), 40);
        assert_eq!(commit.author, "Dev");
        assert!(commit.files_changed >= 1);
    }
}

#[tokio::test]
async fn reindexing_git_overwrites_instead_of_duplicating() {
    let state = tempfile::tempdir().unwrap();
    let repo_dir = tempfile::tempdir().unwrap();
    let service = MemoryService::ephemeral(test_config(&state)).unwrap();
    seed_repo(repo_dir.path(), &[("initial import", 1_700_000_000)]);

    let path = repo_dir.path().to_str().unwrap();
    service.index_git(path, None, "never").await.data.unwrap();
    service.index_git(path, None, "never").await.data.unwrap();

    let page = service
        .list(Some(&serde_json::json!({"category": "commit"})), 0, 10)
        .await
        .data
        .unwrap();
    assert_eq!(page.results.len(), 1);
}

#[tokio::test]
async fn index_git_rejects_non_repositories() {
    let state = tempfile::tempdir().unwrap();
    let not_repo = tempfile::tempdir().unwrap();
    let service = MemoryService::ephemeral(test_config(&state)).unwrap();

    let envelope = service
        .index_git(not_repo.path().to_str().unwrap(), None, "auto")
        .await;
    assert_eq!(envelope.status, "error");
    assert_eq!(envelope.error.unwrap().kind, "not_found");
}
