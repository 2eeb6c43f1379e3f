//! Optional dense-vector side-index: chunk, embed in small batches, upsert
//! into the vector store under deterministic point ids. A failing embedding
//! batch makes the side-index lag; it never fails the host pipeline.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::application::{
    ChunkPayload, EmbeddingInput, EmbeddingProvider, ScoredPoint, VectorPoint, VectorStore,
};
use crate::connector::storage::SqliteIndex;
use crate::domain::services::{first_match_line, highlight_terms, make_snippet};
use crate::domain::{chunk_content, EngineError, Language, SearchHit};

/// Maximum chunks per embedding request.
const EMBED_BATCH: usize = 10;

pub struct SemanticIndexUseCase {
    provider: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    store: Arc<SqliteIndex>,
    fingerprint: String,
    delimiters: (char, char),
}

impl SemanticIndexUseCase {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        store: Arc<SqliteIndex>,
        fingerprint: impl Into<String>,
        delimiters: (char, char),
    ) -> Self {
        Self {
            provider,
            vectors,
            store,
            fingerprint: fingerprint.into(),
            delimiters,
        }
    }

    /// Deterministic point id for `(repo_fingerprint, path, chunk_index)`.
    pub fn point_id(fingerprint: &str, path: &str, chunk_index: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(chunk_index.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Chunk and embed one file. Errors are logged and swallowed: the
    /// side-index simply lags behind the relational index.
    pub async fn index_file(&self, relative_path: &str, language: Language, content: &str) {
        let chunks = chunk_content(relative_path, language, content);
        if chunks.is_empty() {
            return;
        }

        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = match self.provider.embed(&texts, EmbeddingInput::Document).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(
                        "Embedding batch failed for {} ({} chunks): {}; side-index will lag",
                        relative_path,
                        batch.len(),
                        e
                    );
                    continue;
                }
            };

            let points: Vec<VectorPoint> = batch
                .iter()
                .zip(embeddings)
                .map(|(chunk, vector)| VectorPoint {
                    id: Self::point_id(&self.fingerprint, relative_path, chunk.chunk_index),
                    vector,
                    payload: ChunkPayload {
                        repo: self.fingerprint.clone(),
                        path: relative_path.to_string(),
                        language: language.as_str().to_string(),
                        chunk_index: chunk.chunk_index,
                        byte_range: (chunk.byte_start, chunk.byte_end),
                    },
                })
                .collect();

            if let Err(e) = self.vectors.upsert(points).await {
                warn!("Vector upsert failed for {}: {}", relative_path, e);
            }
        }
        debug!("Semantic-indexed {} ({} chunks)", relative_path, chunks.len());
    }

    pub async fn remove_file(&self, relative_path: &str) {
        if let Err(e) = self
            .vectors
            .delete_by_path(&self.fingerprint, relative_path)
            .await
        {
            warn!("Vector delete failed for {}: {}", relative_path, e);
        }
    }

    /// Embed the query and search the repo-scoped collection, attaching a
    /// BM25-style snippet from stored content for display.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, EngineError> {
        let embedded = self
            .provider
            .embed(&[query.to_string()], EmbeddingInput::Query)
            .await?;
        let vector = embedded
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::embedding("Provider returned no query embedding"))?;

        let points = self.vectors.search(&self.fingerprint, &vector, limit).await?;
        let terms = highlight_terms(query);

        let mut hits = Vec::with_capacity(points.len());
        for ScoredPoint { payload, score } in points {
            let content = self
                .store
                .file_content(&payload.path)
                .await?
                .unwrap_or_default();
            let chunk_text = content
                .get(payload.byte_range.0..payload.byte_range.1.min(content.len()))
                .unwrap_or(&content);
            hits.push(SearchHit {
                line: first_match_line(&content, &terms),
                file: payload.path,
                snippet: make_snippet(chunk_text, &terms, self.delimiters),
                score,
                language: Some(payload.language),
                rerank_score: None,
            });
        }
        Ok(hits)
    }
}
