use schemars::JsonSchema;
use serde::Serialize;

/// A single hit returned by the search_code tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SearchHitOutput {
    /// Repo-relative path of the matching file
    pub file: String,

    /// 1-indexed line of the first match
    pub line: u32,

    /// Highlighted excerpt around the strongest match
    pub snippet: String,

    /// Relevance score, higher is better
    pub score: f32,

    /// Language tag of the file, when detected
    pub language: Option<String>,

    /// Secondary score from the reranker post-pass, when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// The definition returned by the symbol_lookup tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SymbolLookupOutput {
    pub symbol: String,
    pub kind: String,
    pub language: Option<String>,
    pub defined_in: String,
    pub line: u32,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// The reindex tool result.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ReindexOutput {
    pub indexed: u64,
    pub failed: u64,
}
