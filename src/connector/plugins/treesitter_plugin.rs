use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::LanguagePlugin;
use crate::connector::parser::TreeSitterSymbolParser;
use crate::connector::storage::SqliteIndex;
use crate::domain::services::{build_match_expr, first_match_line, highlight_terms};
use crate::domain::{
    EngineError, IndexShard, Language, ReferenceRecord, SearchHit, SearchQuery, SymbolRecord,
};

/// The grammar-backed adapter: one instance per language, sharing the
/// process-wide store handle.
pub struct TreeSitterPlugin {
    language: Language,
    store: Arc<SqliteIndex>,
    parser: TreeSitterSymbolParser,
    delimiters: (char, char),
}

impl TreeSitterPlugin {
    pub fn new(language: Language, store: Arc<SqliteIndex>, delimiters: (char, char)) -> Self {
        Self {
            language,
            store,
            parser: TreeSitterSymbolParser::new(),
            delimiters,
        }
    }
}

#[async_trait]
impl LanguagePlugin for TreeSitterPlugin {
    fn language(&self) -> Language {
        self.language
    }

    fn supports(&self, path: &Path) -> bool {
        Language::detect(path) == self.language
    }

    fn index_file(&self, path: &Path, bytes: &[u8]) -> Result<IndexShard, EngineError> {
        let content = String::from_utf8_lossy(bytes);
        let relative = path.to_string_lossy();
        Ok(self.parser.extract(&relative, &content, self.language))
    }

    async fn get_definition(&self, name: &str) -> Result<Option<SymbolRecord>, EngineError> {
        let records = self.store.query_symbol_exact(name, 16).await?;
        Ok(records
            .into_iter()
            .find(|r| r.language == Some(self.language)))
    }

    async fn find_references(&self, name: &str) -> Result<Vec<ReferenceRecord>, EngineError> {
        self.store.references_for_name(name).await
    }

    /// FTS-backed search. This plugin has no embedding path, so `semantic`
    /// queries fall back to the same full-text route.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, EngineError> {
        let expr = build_match_expr(query.query())?;
        let hits = self
            .store
            .query_fts(&expr, query.limit(), query.offset(), self.delimiters)
            .await?;

        let terms = highlight_terms(query.query());
        Ok(hits
            .into_iter()
            .map(|h| SearchHit {
                line: first_match_line(&h.content, &terms),
                file: h.filepath,
                snippet: h.snippet,
                score: h.score,
                language: h.language,
                rerank_score: None,
            })
            .collect())
    }
}
