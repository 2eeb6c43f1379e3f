//! Structural failure handling and size boundaries at the storage layer.

use std::path::Path;

use codeindex::{Config, Engine, EngineError, RerankerMode, SearchQuery, SqliteIndex};
use tempfile::TempDir;

fn test_config(workspace: &Path) -> Config {
    let mut config = Config::default();
    config.workspace_root = Some(workspace.to_path_buf());
    config.central_index_root = Some(workspace.join(".indexes"));
    config.reranker = RerankerMode::Off;
    config
}

#[test]
fn test_newer_schema_version_is_refused() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("artifact.db");

    // Create a current-schema artifact, then stamp it with a future version.
    drop(SqliteIndex::open_or_init(&db, &[2, 3]).unwrap());
    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute("UPDATE schema_version SET version = 999", [])
        .unwrap();
    drop(conn);

    let err = SqliteIndex::open_or_init(&db, &[2, 3]).unwrap_err();
    match err {
        EngineError::SchemaMismatch { found, supported } => {
            assert_eq!(found, 999);
            assert!(supported < 999);
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn test_garbage_file_is_open_failed() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("artifact.db");
    std::fs::write(&db, b"definitely not a sqlite database, not even close").unwrap();

    let err = SqliteIndex::open_or_init(&db, &[2, 3]).unwrap_err();
    assert!(err.is_corruption(), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_file_is_indexed_truncated() {
    let dir = TempDir::new().unwrap();
    // 11 MB of text; FTS content is capped at 10 MB and the row is flagged.
    let needle = "haystack_needle_token ";
    let mut big = String::with_capacity(11 * 1024 * 1024);
    big.push_str(needle);
    while big.len() < 11 * 1024 * 1024 {
        big.push_str("lorem ipsum filler words here ");
    }
    std::fs::write(dir.path().join("big.txt"), &big).unwrap();

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    let report = engine.reindex(None, None).await.unwrap();
    assert_eq!(report.indexed, 1);

    let files = engine.store().list_files().await.unwrap();
    let record = files.iter().find(|f| f.relative_path == "big.txt").unwrap();
    assert!(record.truncated);
    assert_eq!(record.size, big.len() as u64);

    // Leading content (inside the cap) is still searchable.
    let hits = engine
        .search(SearchQuery::new("haystack_needle_token"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_writer_is_locked_out() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), "text\n").unwrap();

    let engine_a = Engine::open(test_config(dir.path())).await.unwrap();
    let engine_b = Engine::open(test_config(dir.path())).await.unwrap();

    // Hold the repo's write lock through a long-lived guard, then try to
    // index from the second engine.
    let layout = codeindex::IndexLayout::with_root(dir.path().join(".indexes"));
    let guard = layout.acquire_write_lock(engine_a.fingerprint()).unwrap();

    let err = engine_b.reindex(None, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)), "got {err:?}");

    drop(guard);
    assert!(engine_b.reindex(None, None).await.is_ok());
}
