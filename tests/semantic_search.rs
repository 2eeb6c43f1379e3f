//! Semantic side-index flow with the deterministic mock provider and the
//! in-memory vector store.

use std::sync::Arc;

use codeindex::use_cases::SemanticIndexUseCase;
use codeindex::{
    EmbeddingProvider, FtsDoc, InMemoryVectorStore, Language, MockEmbeddingProvider, SqliteIndex,
    VectorStore,
};

async fn seed_content(store: &SqliteIndex, path: &str, content: &str) {
    let repo = store.upsert_repository("fp", "/r", "r").await.unwrap();
    let (file_id, _) = store
        .upsert_file(repo, path, &format!("/r/{}", path), Some(Language::Rust), 1, path)
        .await
        .unwrap();
    store
        .index_file_txn(
            file_id,
            &[],
            &[],
            Some(&FtsDoc {
                filepath: path.to_string(),
                filename: path.to_string(),
                content: content.to_string(),
                language: Some(Language::Rust),
                content_hash: path.to_string(),
                truncated: false,
            }),
        )
        .await
        .unwrap();
}

fn side_index(
    store: Arc<SqliteIndex>,
    vectors: Arc<InMemoryVectorStore>,
) -> SemanticIndexUseCase {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new());
    let vectors: Arc<dyn VectorStore> = vectors;
    SemanticIndexUseCase::new(provider, vectors, store, "fp", ('«', '»'))
}

#[tokio::test]
async fn test_semantic_index_and_search() {
    let store = Arc::new(SqliteIndex::in_memory().unwrap());
    let vectors = Arc::new(InMemoryVectorStore::new());
    let semantic = side_index(store.clone(), vectors.clone());

    let painter = "fn paint_widget() { draw_border(); fill_background(); }\n";
    let storage = "fn vacuum_database() { checkpoint_journal(); }\n";
    seed_content(&store, "paint.rs", painter).await;
    seed_content(&store, "storage.rs", storage).await;

    semantic.index_file("paint.rs", Language::Rust, painter).await;
    semantic.index_file("storage.rs", Language::Rust, storage).await;
    assert_eq!(vectors.len().await, 2);

    let hits = semantic.search("paint_widget", 5).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].file, "paint.rs");
    assert!(hits[0].score >= hits.last().unwrap().score);
    assert!(hits[0].snippet.contains("«"), "snippet: {}", hits[0].snippet);
}

#[tokio::test]
async fn test_remove_file_drops_vectors() {
    let store = Arc::new(SqliteIndex::in_memory().unwrap());
    let vectors = Arc::new(InMemoryVectorStore::new());
    let semantic = side_index(store.clone(), vectors.clone());

    seed_content(&store, "a.rs", "fn alpha() {}\n").await;
    semantic.index_file("a.rs", Language::Rust, "fn alpha() {}\n").await;
    assert_eq!(vectors.len().await, 1);

    semantic.remove_file("a.rs").await;
    assert_eq!(vectors.len().await, 0);
}

#[tokio::test]
async fn test_reindex_overwrites_points_in_place() {
    let store = Arc::new(SqliteIndex::in_memory().unwrap());
    let vectors = Arc::new(InMemoryVectorStore::new());
    let semantic = side_index(store.clone(), vectors.clone());

    seed_content(&store, "a.rs", "fn alpha() {}\n").await;
    semantic.index_file("a.rs", Language::Rust, "fn alpha() {}\n").await;
    semantic.index_file("a.rs", Language::Rust, "fn alpha_two() {}\n").await;

    // Same (repo, path, chunk) key, so the point count stays stable.
    assert_eq!(vectors.len().await, 1);
}
