use async_trait::async_trait;

use crate::domain::EngineError;

/// How an embedding input should be tagged for the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingInput {
    Document,
    Query,
}

impl EmbeddingInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingInput::Document => "document",
            EmbeddingInput::Query => "query",
        }
    }
}

/// The embedding provider consumed by the semantic side-index. The HTTP
/// adapter bounds each request at 30 s with up to 3 retries; a failing batch
/// never fails the host indexing pipeline.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(
        &self,
        texts: &[String],
        input: EmbeddingInput,
    ) -> Result<Vec<Vec<f32>>, EngineError>;
}
