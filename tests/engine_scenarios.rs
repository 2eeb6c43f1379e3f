//! End-to-end scenarios against a real engine over a temporary workspace.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codeindex::{Config, Engine, RerankerMode, SearchQuery, WatcherMode};
use tempfile::TempDir;

fn test_config(workspace: &Path) -> Config {
    let mut config = Config::default();
    config.workspace_root = Some(workspace.to_path_buf());
    config.central_index_root = Some(workspace.join(".indexes"));
    config.reranker = RerankerMode::Off;
    config
}

fn write(workspace: &Path, relative: &str, content: &str) {
    let path = workspace.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_basic_symbol_lookup() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/a.py", "class Widget:\n    def paint(self): pass\n");

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    let report = engine.reindex(None, None).await.unwrap();
    assert!(report.indexed >= 1);
    assert!(report.failed.is_empty());

    let widget = engine.lookup("Widget").await.unwrap().unwrap();
    assert_eq!(widget.kind, "class");
    assert_eq!(widget.defined_in, "src/a.py");
    assert_eq!(widget.line, 1);
    assert_eq!(widget.signature, "class Widget:");

    let paint = engine.lookup("paint").await.unwrap().unwrap();
    assert_eq!(paint.kind, "method");
    assert_eq!(paint.line, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cross_language_content_search() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.py", "# TODO: refactor\n");
    write(dir.path(), "b.js", "// TODO: refactor\n");

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    engine.reindex(None, None).await.unwrap();

    let hits = engine
        .search(SearchQuery::new("TODO refactor").with_limit(10))
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    let mut files: Vec<&str> = hits.iter().map(|h| h.file.as_str()).collect();
    files.sort();
    assert_eq!(files, vec!["a.py", "b.js"]);
    for hit in &hits {
        assert!(hit.snippet.contains("«TODO»"), "snippet was: {}", hit.snippet);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_index_covers_ignored_and_sensitive_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), ".gitignore", "secrets.env\n");
    write(dir.path(), "secrets.env", "API_KEY=abc123\n");
    write(dir.path(), "src/app.py", "print('hello')\n");

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    engine.reindex(None, None).await.unwrap();

    // Ignore patterns must not affect local search.
    let hits = engine.search(SearchQuery::new("API_KEY")).await.unwrap();
    assert!(hits.iter().any(|h| h.file == "secrets.env"));

    // The dotenv plugin also exposes the key as a symbol.
    let key = engine.lookup("API_KEY").await.unwrap().unwrap();
    assert_eq!(key.kind, "variable");
    assert_eq!(key.defined_in, "secrets.env");
    assert_eq!(key.signature, "API_KEY=abc123");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watcher_propagates_deletes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/a.py", "class Widget:\n    def paint(self): pass\n");

    let mut config = test_config(dir.path());
    config.watcher = WatcherMode::On {
        debounce_ms: 100,
        queue_cap: 10_000,
    };
    let engine = Arc::new(Engine::open(config).await.unwrap());
    engine.reindex(None, None).await.unwrap();
    assert!(engine.lookup("Widget").await.unwrap().is_some());

    let watcher = engine.start_watcher().unwrap().unwrap();
    std::fs::remove_file(dir.path().join("src/a.py")).unwrap();

    // Debounce is 100 ms; give the notification source a few seconds.
    let mut gone = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if engine.lookup("Widget").await.unwrap().is_none() {
            gone = true;
            break;
        }
    }
    watcher.shutdown();
    assert!(gone, "deleted file still resolvable after watcher window");

    let files = engine.store().list_files().await.unwrap();
    assert!(!files.iter().any(|f| f.relative_path == "src/a.py"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_degraded_mode_without_plugins() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/a.py", "class Widget:\n    def paint(self): pass\n");

    let engine = Engine::open_degraded(test_config(dir.path())).await.unwrap();
    engine.reindex(None, None).await.unwrap();

    // Content search still works straight off the BM25 index.
    let hits = engine.search(SearchQuery::new("paint")).await.unwrap();
    assert!(hits.iter().any(|h| h.file == "src/a.py"));

    // No plugin ran, so no symbols exist.
    assert!(engine.lookup("paint").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unchanged_file_keeps_indexed_at() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/a.py", "class Widget: pass\n");

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    engine.reindex(None, None).await.unwrap();
    let before = engine.store().list_files().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    engine.reindex(None, None).await.unwrap();
    let after = engine.store().list_files().await.unwrap();

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.relative_path, a.relative_path);
        assert_eq!(b.indexed_at, a.indexed_at, "indexed_at moved for {}", b.relative_path);
        assert_eq!(b.content_hash, a.content_hash);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reindex_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/lib.rs", "pub fn add(a: i32, b: i32) -> i32 { a + b }\n");

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    engine.reindex(None, None).await.unwrap();
    let status_once = engine.status().await.unwrap();

    engine.reindex(None, None).await.unwrap();
    let status_twice = engine.status().await.unwrap();

    assert_eq!(status_once.file_count, status_twice.file_count);
    assert_eq!(status_once.symbol_count, status_twice.symbol_count);
    assert_eq!(status_once.fts_rows, status_twice.fts_rows);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_query_boundaries() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", "hello world\n");

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    engine.reindex(None, None).await.unwrap();

    // Empty query: empty result, no error.
    assert!(engine.search(SearchQuery::new("   ")).await.unwrap().is_empty());

    // Reserved-characters-only query: BadQuery.
    let err = engine.search(SearchQuery::new("((*)")).await.unwrap_err();
    assert!(err.is_bad_query());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_reports_languages_and_counts() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.py", "x = 1\n");
    write(dir.path(), "b.rs", "pub fn f() {}\n");

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    engine.reindex(None, None).await.unwrap();

    let status = engine.status().await.unwrap();
    assert_eq!(status.file_count, 2);
    assert_eq!(status.fts_rows, 2);
    assert!(status.symbol_count >= 1);
    assert_eq!(status.languages.get("python"), Some(&1));
    assert_eq!(status.languages.get("rust"), Some(&1));
    assert!(status.last_indexed.is_some());
    assert!(!status.semantic_enabled);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_elapsed_deadline_yields_partial_timeout_result() {
    let dir = TempDir::new().unwrap();
    for i in 0..20 {
        write(dir.path(), &format!("f{i}.txt"), "some text\n");
    }

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    let report = engine
        .reindex(None, Some(Duration::from_secs(0)))
        .await
        .unwrap();

    // The deadline was already past: nothing dispatched, partial result
    // tagged with the completed count.
    assert_eq!(report.timed_out, Some(report.indexed as usize));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reranker_attaches_secondary_scores() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "widget.rs", "fn paint_widget() { draw(); }\n");
    write(dir.path(), "other.rs", "fn unrelated() { paint_widget(); }\n");

    let mut config = test_config(dir.path());
    config.reranker = RerankerMode::Tfidf;
    let engine = Engine::open(config).await.unwrap();
    engine.reindex(None, None).await.unwrap();

    let hits = engine.search(SearchQuery::new("paint_widget")).await.unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
        assert!(hit.rerank_score.is_some());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multi_repo_search_merges_registered_repos() {
    let central = TempDir::new().unwrap();
    let ws_a = TempDir::new().unwrap();
    let ws_b = TempDir::new().unwrap();
    write(ws_a.path(), "alpha.txt", "shared_needle in repo a\n");
    write(ws_b.path(), "beta.txt", "shared_needle in repo b\n");

    let mut config_a = test_config(ws_a.path());
    config_a.central_index_root = Some(central.path().to_path_buf());
    let mut config_b = test_config(ws_b.path());
    config_b.central_index_root = Some(central.path().to_path_buf());

    let engine_b = Engine::open(config_b).await.unwrap();
    engine_b.reindex(None, None).await.unwrap();

    let registry = central.path().join("registry.json");
    std::fs::write(
        &registry,
        serde_json::json!([
            { "fingerprint": engine_b.fingerprint(), "root": ws_b.path(), "name": "b" }
        ])
        .to_string(),
    )
    .unwrap();

    config_a.repo_registry = Some(registry);
    config_a.multi_repo = true;
    let engine_a = Engine::open(config_a).await.unwrap();
    engine_a.reindex(None, None).await.unwrap();

    let hits = engine_a.search(SearchQuery::new("shared_needle")).await.unwrap();
    let mut files: Vec<&str> = hits.iter().map(|h| h.file.as_str()).collect();
    files.sort();
    assert_eq!(files, vec!["alpha.txt", "beta.txt"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_find_references_through_plugins() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/lib.rs",
        "pub fn helper() {}\n\nfn main() {\n    helper();\n}\n",
    );

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    engine.reindex(None, None).await.unwrap();

    let references = engine.find_references("helper").await.unwrap();
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].relative_path, "src/lib.rs");
    assert_eq!(references[0].line, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_open_existing_requires_an_index() {
    let dir = TempDir::new().unwrap();
    let err = Engine::open_existing(test_config(dir.path())).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_files_are_skipped_as_non_utf8() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150, 0, 1]).unwrap();
    write(dir.path(), "ok.txt", "searchable text\n");

    let engine = Engine::open(test_config(dir.path())).await.unwrap();
    let report = engine.reindex(None, None).await.unwrap();

    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, "blob.bin");
    assert_eq!(report.failed[0].reason, "non_utf8");
}
