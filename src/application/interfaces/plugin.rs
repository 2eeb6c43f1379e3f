use std::path::Path;

use async_trait::async_trait;

use crate::domain::{
    EngineError, IndexShard, Language, ReferenceRecord, SearchHit, SearchQuery, SymbolRecord,
};

/// The uniform capability set every language adapter implements.
///
/// Plugins are constructed lazily by the dispatcher, at most one instance per
/// language per process, and may consult the store directly for the query
/// operations. A plugin with no embedding path must answer `semantic`
/// searches from the full-text index.
#[async_trait]
pub trait LanguagePlugin: Send + Sync {
    fn language(&self) -> Language;

    /// Extension- or pattern-based claim on a path.
    fn supports(&self, path: &Path) -> bool;

    /// Parse one file into an [`IndexShard`]. CPU-bound and synchronous;
    /// the dispatcher runs it on a blocking worker.
    fn index_file(&self, path: &Path, bytes: &[u8]) -> Result<IndexShard, EngineError>;

    async fn get_definition(&self, name: &str) -> Result<Option<SymbolRecord>, EngineError>;

    async fn find_references(&self, name: &str) -> Result<Vec<ReferenceRecord>, EngineError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, EngineError>;
}
