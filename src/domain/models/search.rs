use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// A content-search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    query: String,
    semantic: bool,
    limit: usize,
    offset: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            semantic: false,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_semantic(mut self, semantic: bool) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_semantic(&self) -> bool {
        self.semantic
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty()
    }
}

/// A ranked content hit. `score` is normalized so that higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: String,
    pub line: u32,
    pub snippet: String,
    pub score: f32,
    pub language: Option<String>,
    /// Secondary score attached by the reranker post-pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// The single best definition for a symbol lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolHit {
    pub symbol: String,
    pub kind: String,
    pub language: Option<String>,
    pub defined_in: String,
    pub line: u32,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder_defaults() {
        let q = SearchQuery::new("tokenizer");
        assert_eq!(q.limit(), DEFAULT_LIMIT);
        assert_eq!(q.offset(), 0);
        assert!(!q.is_semantic());
    }

    #[test]
    fn test_limit_clamped_to_server_max() {
        let q = SearchQuery::new("x").with_limit(10_000);
        assert_eq!(q.limit(), MAX_LIMIT);
    }

    #[test]
    fn test_empty_detection() {
        assert!(SearchQuery::new("   ").is_empty());
        assert!(!SearchQuery::new("a").is_empty());
    }
}
