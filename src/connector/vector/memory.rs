use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::{ScoredPoint, VectorPoint, VectorStore};
use crate::domain::EngineError;

/// In-memory cosine vector store. Stands in for the external vector database
/// in tests and single-process setups.
pub struct InMemoryVectorStore {
    points: RwLock<HashMap<String, VectorPoint>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), EngineError> {
        let mut map = self.points.write().await;
        for point in points {
            map.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn delete_by_path(&self, repo: &str, path: &str) -> Result<(), EngineError> {
        let mut map = self.points.write().await;
        map.retain(|_, p| !(p.payload.repo == repo && p.payload.path == path));
        Ok(())
    }

    async fn search(
        &self,
        repo: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, EngineError> {
        let map = self.points.read().await;
        let mut scored: Vec<ScoredPoint> = map
            .values()
            .filter(|p| p.payload.repo == repo)
            .map(|p| ScoredPoint {
                payload: p.payload.clone(),
                score: cosine(&p.vector, vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ChunkPayload;

    fn point(id: &str, repo: &str, path: &str, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: id.to_string(),
            vector,
            payload: ChunkPayload {
                repo: repo.to_string(),
                path: path.to_string(),
                language: "rust".to_string(),
                chunk_index: 0,
                byte_range: (0, 10),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let store = InMemoryVectorStore::new();
        store.upsert(vec![point("a", "r", "f1", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(vec![point("a", "r", "f1", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.len().await, 1);

        let hits = store.search("r", &[0.0, 1.0], 5).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_is_repo_scoped_and_ranked() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                point("a", "r1", "f1", vec![1.0, 0.0]),
                point("b", "r1", "f2", vec![0.5, 0.5]),
                point("c", "r2", "f3", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.search("r1", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.path, "f1");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_delete_by_path() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                point("a", "r", "gone.rs", vec![1.0]),
                point("b", "r", "kept.rs", vec![1.0]),
            ])
            .await
            .unwrap();
        store.delete_by_path("r", "gone.rs").await.unwrap();

        let hits = store.search("r", &[1.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.path, "kept.rs");
    }
}
