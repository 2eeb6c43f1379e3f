use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::EngineError;

/// Payload carried alongside every vector point; everything needed to map a
/// hit back to a file chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub repo: String,
    pub path: String,
    pub language: String,
    pub chunk_index: u32,
    pub byte_range: (usize, usize),
}

/// An upsertable point. The id is derived deterministically from
/// `(repo_fingerprint, path, chunk_index)` so re-indexing overwrites in place.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub payload: ChunkPayload,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

/// The vector database, treated as an opaque KV-of-vectors with cosine
/// distance. Real deployments talk to an external store; tests use the
/// in-memory adapter.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), EngineError>;

    async fn delete_by_path(&self, repo: &str, path: &str) -> Result<(), EngineError>;

    async fn search(
        &self,
        repo: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, EngineError>;
}
