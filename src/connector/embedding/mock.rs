use async_trait::async_trait;

use crate::application::{EmbeddingInput, EmbeddingProvider};
use crate::domain::EngineError;

const DIMENSION: usize = 64;

/// Deterministic embedding stand-in for tests: token-hash bag-of-words
/// vectors, so identical texts embed identically and overlapping texts land
/// close under cosine distance.
pub struct MockEmbeddingProvider;

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSION];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty());
        for token in tokens {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for b in token.to_lowercase().bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x1000_0000_01b3);
            }
            vector[(hash % DIMENSION as u64) as usize] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn model(&self) -> &str {
        "mock-hash-64"
    }

    async fn embed(
        &self,
        texts: &[String],
        _input: EmbeddingInput,
    ) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}
