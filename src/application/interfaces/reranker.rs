use async_trait::async_trait;

use crate::domain::{EngineError, SearchHit};

/// One candidate handed to the reranker: the original hit plus the document
/// text it is scored against (filepath + snippet + leading content).
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub hit: SearchHit,
    pub document: String,
}

/// Post-retrieval reordering of the top-K hits by a secondary score.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the hits reordered, each with `rerank_score` attached.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
    ) -> Result<Vec<SearchHit>, EngineError>;
}
