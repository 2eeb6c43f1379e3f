use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::LanguagePlugin;
use crate::connector::parser::PlainTextParser;
use crate::connector::storage::SqliteIndex;
use crate::domain::services::{build_match_expr, first_match_line, highlight_terms};
use crate::domain::{
    EngineError, IndexShard, Language, ReferenceRecord, SearchHit, SearchQuery, SymbolRecord,
};

/// The universal fallback adapter. Claims every path handed to it, so local
/// indexing always covers the whole tree regardless of ignore files.
pub struct PlainTextPlugin {
    language: Language,
    store: Arc<SqliteIndex>,
    parser: PlainTextParser,
    delimiters: (char, char),
    universal: bool,
}

impl PlainTextPlugin {
    /// Adapter bound to one of the grammarless tags (dotenv, dockerfile, ...).
    pub fn for_language(language: Language, store: Arc<SqliteIndex>, delimiters: (char, char)) -> Self {
        Self {
            language,
            store,
            parser: PlainTextParser::new(),
            delimiters,
            universal: false,
        }
    }

    /// The catch-all instance used when no other plugin claims a path.
    pub fn fallback(store: Arc<SqliteIndex>, delimiters: (char, char)) -> Self {
        Self {
            language: Language::Plaintext,
            store,
            parser: PlainTextParser::new(),
            delimiters,
            universal: true,
        }
    }
}

#[async_trait]
impl LanguagePlugin for PlainTextPlugin {
    fn language(&self) -> Language {
        self.language
    }

    fn supports(&self, path: &Path) -> bool {
        self.universal || Language::detect(path) == self.language
    }

    fn index_file(&self, path: &Path, bytes: &[u8]) -> Result<IndexShard, EngineError> {
        let content = String::from_utf8_lossy(bytes);
        let relative = path.to_string_lossy();
        let language = if self.universal {
            Language::detect(path)
        } else {
            self.language
        };
        Ok(self.parser.extract(&relative, &content, language))
    }

    async fn get_definition(&self, name: &str) -> Result<Option<SymbolRecord>, EngineError> {
        Ok(self.store.query_symbol_exact(name, 1).await?.into_iter().next())
    }

    async fn find_references(&self, name: &str) -> Result<Vec<ReferenceRecord>, EngineError> {
        self.store.references_for_name(name).await
    }

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
