use serde::{Deserialize, Serialize};

use super::Language;

/// A file row as persisted in the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub repo_id: i64,
    pub relative_path: String,
    pub absolute_path: String,
    pub language: Option<Language>,
    pub size: u64,
    pub content_hash: String,
    /// Unix seconds of the last index pass that actually rewrote this file.
    pub indexed_at: i64,
    /// Set when FTS content was cut at the 10 MB cap.
    pub truncated: bool,
}

/// A symbol row joined with its file for query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub kind: super::SymbolKind,
    pub signature: String,
    pub doc: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub column: u32,
    pub parent_id: Option<i64>,
    pub relative_path: String,
    pub language: Option<Language>,
}

/// A reference row joined with the file it occurs in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub id: i64,
    pub symbol_id: Option<i64>,
    pub file_id: i64,
    pub relative_path: String,
    pub line: u32,
    pub column: u32,
    pub kind: super::ReferenceKind,
}
