//! Content search: FTS by default, the vector side-index when requested and
//! available, and an optional reranker post-pass over the top-K hits.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::use_cases::SemanticIndexUseCase;
use crate::application::{Reranker, RerankCandidate};
use crate::connector::storage::SqliteIndex;
use crate::domain::services::{build_match_expr, first_match_line, highlight_terms};
use crate::domain::{EngineError, SearchHit, SearchQuery};

/// Characters of stored content fed to the reranker per hit.
const RERANK_CONTENT_CHARS: usize = 500;

pub struct SearchCodeUseCase {
    store: Arc<SqliteIndex>,
    reranker: Option<Arc<dyn Reranker>>,
    semantic: Option<Arc<SemanticIndexUseCase>>,
    delimiters: (char, char),
    rerank_top_k: usize,
}

impl SearchCodeUseCase {
    pub fn new(store: Arc<SqliteIndex>, delimiters: (char, char), rerank_top_k: usize) -> Self {
        Self {
            store,
            reranker: None,
            semantic: None,
            delimiters,
            rerank_top_k,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_semantic(mut self, semantic: Arc<SemanticIndexUseCase>) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub async fn execute(&self, query: SearchQuery) -> Result<Vec<SearchHit>, EngineError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        if query.is_semantic() {
            if let Some(ref semantic) = self.semantic {
                info!("Semantic search: {}", query.query());
                match semantic.search(query.query(), query.limit()).await {
                    Ok(hits) if !hits.is_empty() => return Ok(hits),
                    Ok(_) => debug!("Semantic search empty; falling back to FTS"),
                    Err(e) => warn!("Semantic search failed ({}); falling back to FTS", e),
                }
            } else {
                debug!("Semantic requested but side-index unavailable; using FTS");
            }
        }

        self.fts_search(&query).await
    }

    async fn fts_search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, EngineError> {
        let expr = build_match_expr(query.query())?;
        debug!("FTS MATCH: {}", expr);

        let raw = self
            .store
            .query_fts(&expr, query.limit(), query.offset(), self.delimiters)
            .await?;

        let terms = highlight_terms(query.query());
        let hits: Vec<(SearchHit, String)> = raw
            .into_iter()
            .map(|h| {
                let head: String = h.content.chars().take(RERANK_CONTENT_CHARS).collect();
                (
                    SearchHit {
                        line: first_match_line(&h.content, &terms),
                        file: h.filepath,
                        snippet: h.snippet,
                        score: h.score,
                        language: h.language,
                        rerank_score: None,
                    },
                    head,
                )
            })
            .collect();

        let Some(ref reranker) = self.reranker else {
            return Ok(hits.into_iter().map(|(h, _)| h).collect());
        };

        let k = self.rerank_top_k.min(hits.len());
        let mut iter = hits.into_iter();
        let top: Vec<(SearchHit, String)> = iter.by_ref().take(k).collect();
        let tail: Vec<SearchHit> = iter.map(|(h, _)| h).collect();

        let candidates: Vec<RerankCandidate> = top
            .into_iter()
            .map(|(hit, head)| {
                let document = format!("{} {} {}", hit.file, hit.snippet, head);
                RerankCandidate { hit, document }
            })
            .collect();

        debug!("Reranking top {} with {}", k, reranker.name());
        let mut reranked = reranker.rerank(query.query(), candidates).await?;
        reranked.extend(tail);
        Ok(reranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::storage::FtsDoc;
    use crate::domain::Language;

    async fn seeded_store() -> Arc<SqliteIndex> {
        let store = Arc::new(SqliteIndex::in_memory().unwrap());
        let repo = store.upsert_repository("fp", "/r", "r").await.unwrap();

        for (path, content, language) in [
            ("a.py", "# TODO: refactor\n", Language::Python),
            ("b.js", "// TODO: refactor\n", Language::JavaScript),
            ("c.txt", "nothing to see\n", Language::Plaintext),
        ] {
            let (file_id, _) = store
                .upsert_file(repo, path, &format!("/r/{}", path), Some(language), 1, path)
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
                        language: Some(language),
                        content_hash: path.to_string(),
                        truncated: false,
                    }),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_cross_language_content_search() {
        let store = seeded_store().await;
        let search = SearchCodeUseCase::new(store, ('«', '»'), 50);

        let hits = search
            .execute(SearchQuery::new("TODO refactor").with_limit(10))
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        let mut files: Vec<&str> = hits.iter().map(|h| h.file.as_str()).collect();
        files.sort();
        assert_eq!(files, vec!["a.py", "b.js"]);
        for hit in &hits {
            assert!(hit.snippet.contains("«TODO»"), "snippet: {}", hit.snippet);
            assert_eq!(hit.line, 1);
        }
    }

    #[tokio::test]
    async fn test_empty_query_is_empty_result() {
        let store = seeded_store().await;
        let search = SearchCodeUseCase::new(store, ('«', '»'), 50);
        assert!(search.execute(SearchQuery::new("  ")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_only_query_is_bad_query() {
        let store = seeded_store().await;
        let search = SearchCodeUseCase::new(store, ('«', '»'), 50);
        let err = search.execute(SearchQuery::new("(()")).await.unwrap_err();
        assert!(err.is_bad_query());
    }

    #[tokio::test]
    async fn test_semantic_without_side_index_falls_back_to_fts() {
        let store = seeded_store().await;
        let search = SearchCodeUseCase::new(store, ('«', '»'), 50);
        let hits = search
            .execute(SearchQuery::new("refactor").with_semantic(true))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }
}
