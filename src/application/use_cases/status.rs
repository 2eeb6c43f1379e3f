use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::connector::storage::SqliteIndex;
use crate::domain::{format_iso8601, EngineError};

/// The `get_status` tool payload.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub index_path: String,
    pub file_count: u64,
    pub symbol_count: u64,
    pub fts_rows: u64,
    pub languages: HashMap<String, u64>,
    pub last_indexed: Option<String>,
    pub semantic_enabled: bool,
}

pub struct StatusUseCase {
    store: Arc<SqliteIndex>,
    index_path: PathBuf,
    semantic_enabled: bool,
}

impl StatusUseCase {
    pub fn new(store: Arc<SqliteIndex>, index_path: PathBuf, semantic_enabled: bool) -> Self {
        Self {
            store,
            index_path,
            semantic_enabled,
        }
    }

    pub async fn execute(&self) -> Result<StatusReport, EngineError> {
        let (counts, languages, last_indexed) = self.store.stats().await?;
        Ok(StatusReport {
            index_path: self.index_path.to_string_lossy().to_string(),
            file_count: counts.files,
            symbol_count: counts.symbols,
            fts_rows: counts.fts_rows,
            languages,
            last_indexed: last_indexed.map(format_iso8601),
            semantic_enabled: self.semantic_enabled,
        })
    }
}
