//! SQLite-backed artifact storage: files, symbols, references, trigram
//! fuzzy lookup, and the BM25 full-text index.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{
    EngineError, FileRecord, IndexCounts, Language, Reference, ReferenceRecord, Symbol, SymbolKind,
    SymbolRecord,
};

/// Current artifact schema version. Opening a newer artifact fails fast.
pub const SCHEMA_VERSION: i64 = 1;

/// FTS content cap: files larger than this are indexed with truncated content.
pub const MAX_FTS_CONTENT_BYTES: usize = 10 * 1024 * 1024;

/// The content-search row written for one file.
#[derive(Debug, Clone)]
pub struct FtsDoc {
    pub filepath: String,
    pub filename: String,
    pub content: String,
    pub language: Option<Language>,
    pub content_hash: String,
    pub truncated: bool,
}

/// A raw hit from the BM25 content index. `score` is already normalized so
/// that higher means more relevant.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub filepath: String,
    pub language: Option<String>,
    pub snippet: String,
    pub score: f32,
    pub content: String,
}

/// SQLite-based artifact storage. One writer per artifact within a process;
/// the connection is shared behind an async mutex.
pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex").finish_non_exhaustive()
    }
}

impl SqliteIndex {
    /// Open an artifact, creating the schema when absent and running forward
    /// migrations otherwise. Artifacts written by a newer engine are refused.
    pub fn open_or_init(path: &Path, prefix_sizes: &[u32]) -> Result<Self, EngineError> {
        let conn = Connection::open(path)
            .map_err(|e| EngineError::open_failed(format!("Failed to open {:?}: {}", path, e)))?;
        Self::from_connection(conn, prefix_sizes)
    }

    pub fn in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::open_failed(format!("Failed to open in-memory db: {}", e)))?;
        Self::from_connection(conn, &[2, 3])
    }

    fn from_connection(conn: Connection, prefix_sizes: &[u32]) -> Result<Self, EngineError> {
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(())).ok();
        conn.busy_timeout(std::time::Duration::from_secs(5)).ok();
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| EngineError::open_failed(format!("Failed to enable FKs: {}", e)))?;

        let ok: String = conn
            .query_row("PRAGMA quick_check(1)", [], |row| row.get(0))
            .map_err(|e| EngineError::open_failed(format!("Integrity check failed: {}", e)))?;
        if ok != "ok" {
            return Err(EngineError::open_failed(format!(
                "Artifact corrupt: {}",
                ok
            )));
        }

        Self::migrate(&conn, prefix_sizes)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &Connection, prefix_sizes: &[u32]) -> Result<(), EngineError> {
        let has_version_table: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(storage_err("Failed to inspect schema"))?;

        if !has_version_table {
            Self::create_schema(conn, prefix_sizes)?;
            debug!("Initialized artifact schema at v{}", SCHEMA_VERSION);
            return Ok(());
        }

        let found: i64 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .map_err(storage_err("Failed to read schema version"))?;

        if found > SCHEMA_VERSION {
            return Err(EngineError::SchemaMismatch {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        // Forward migrations slot in here as versions accrue.
        if found < SCHEMA_VERSION {
            conn.execute("UPDATE schema_version SET version = ?1", params![SCHEMA_VERSION])
                .map_err(storage_err("Failed to bump schema version"))?;
            debug!("Migrated artifact schema v{} -> v{}", found, SCHEMA_VERSION);
        }
        Ok(())
    }

    fn create_schema(conn: &Connection, prefix_sizes: &[u32]) -> Result<(), EngineError> {
        let prefix: Vec<String> = prefix_sizes.iter().map(|n| n.to_string()).collect();
        let prefix = prefix.join(" ");

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE schema_version (version INTEGER NOT NULL);
            INSERT INTO schema_version (version) VALUES ({SCHEMA_VERSION});

            CREATE TABLE repositories (
                id INTEGER PRIMARY KEY,
                fingerprint TEXT NOT NULL UNIQUE,
                root_path TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE files (
                id INTEGER PRIMARY KEY,
                repo_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
                relative_path TEXT NOT NULL,
                absolute_path TEXT NOT NULL,
                language TEXT,
                size INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                indexed_at INTEGER NOT NULL,
                truncated INTEGER NOT NULL DEFAULT 0,
                UNIQUE (repo_id, relative_path)
            );

            CREATE TABLE symbols (
                id INTEGER PRIMARY KEY,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                signature TEXT NOT NULL,
                doc TEXT,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                col INTEGER NOT NULL,
                parent_id INTEGER REFERENCES symbols(id) ON DELETE SET NULL,
                UNIQUE (file_id, name, kind, start_line)
            );
            CREATE INDEX idx_symbols_name ON symbols(name);
            CREATE INDEX idx_symbols_file ON symbols(file_id);
            CREATE INDEX idx_symbols_kind ON symbols(kind);

            CREATE TABLE symbol_references (
                id INTEGER PRIMARY KEY,
                symbol_id INTEGER REFERENCES symbols(id) ON DELETE CASCADE,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                line INTEGER NOT NULL,
                col INTEGER NOT NULL,
                kind TEXT NOT NULL
            );
            CREATE INDEX idx_refs_symbol ON symbol_references(symbol_id);
            CREATE INDEX idx_refs_file ON symbol_references(file_id);

            CREATE TABLE symbol_trigrams (
                symbol_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                trigram TEXT NOT NULL
            );
            CREATE INDEX idx_trigrams_trigram ON symbol_trigrams(trigram);
            CREATE INDEX idx_trigrams_symbol ON symbol_trigrams(symbol_id);

            CREATE VIRTUAL TABLE fts_symbols USING fts5(
                name, signature, doc,
                tokenize = 'porter unicode61'
            );

            CREATE VIRTUAL TABLE bm25_content USING fts5(
                filepath, filename, content, language UNINDEXED,
                tokenize = 'porter unicode61',
                prefix = '{prefix}'
            );

            CREATE TABLE bm25_index_status (
                file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
                filepath TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                indexed_at INTEGER NOT NULL
            );
            "#
        ))
        .map_err(storage_err("Failed to create schema"))?;
        Ok(())
    }

    pub async fn upsert_repository(
        &self,
        fingerprint: &str,
        root_path: &str,
        name: &str,
    ) -> Result<i64, EngineError> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO repositories (fingerprint, root_path, name, created_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(fingerprint) DO UPDATE SET root_path = ?2, name = ?3"#,
            params![fingerprint, root_path, name, now()],
        )
        .map_err(storage_err("Failed to upsert repository"))?;

        conn.query_row(
            "SELECT id FROM repositories WHERE fingerprint = ?1",
            params![fingerprint],
            |row| row.get(0),
        )
        .map_err(storage_err("Failed to read repository id"))
    }

    /// Insert or refresh a file row. Idempotent on content-hash equality:
    /// an unchanged file keeps its `indexed_at` and reports `changed = false`.
    pub async fn upsert_file(
        &self,
        repo_id: i64,
        relative_path: &str,
        absolute_path: &str,
        language: Option<Language>,
        size: u64,
        content_hash: &str,
    ) -> Result<(i64, bool), EngineError> {
        let conn = self.conn.lock().await;

        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, content_hash FROM files WHERE repo_id = ?1 AND relative_path = ?2",
                params![repo_id, relative_path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage_err("Failed to look up file"))?;

        if let Some((id, hash)) = existing {
            if hash == content_hash {
                return Ok((id, false));
            }
            conn.execute(
                r#"UPDATE files SET absolute_path = ?1, language = ?2, size = ?3,
                   content_hash = ?4, indexed_at = ?5, truncated = 0 WHERE id = ?6"#,
                params![
                    absolute_path,
                    language.map(|l| l.as_str()),
                    size as i64,
                    content_hash,
                    now(),
                    id
                ],
            )
            .map_err(storage_err("Failed to update file"))?;
            return Ok((id, true));
        }

        conn.execute(
            r#"INSERT INTO files (repo_id, relative_path, absolute_path, language, size, content_hash, indexed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                repo_id,
                relative_path,
                absolute_path,
                language.map(|l| l.as_str()),
                size as i64,
                content_hash,
                now()
            ],
        )
        .map_err(storage_err("Failed to insert file"))?;
        Ok((conn.last_insert_rowid(), true))
    }

    /// Replace a file's symbols, references, trigrams, and FTS row in one
    /// transaction. Concurrent readers see the pre-state or the post-state,
    /// never a partial file.
    pub async fn index_file_txn(
        &self,
        file_id: i64,
        symbols: &[Symbol],
        references: &[Reference],
        fts: Option<&FtsDoc>,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        let tx = conn
            .unchecked_transaction()
            .map_err(storage_err("Failed to start transaction"))?;

        tx.execute(
            "DELETE FROM fts_symbols WHERE rowid IN (SELECT id FROM symbols WHERE file_id = ?1)",
            params![file_id],
        )
        .map_err(storage_err("Failed to clear symbol FTS rows"))?;
        tx.execute("DELETE FROM symbols WHERE file_id = ?1", params![file_id])
            .map_err(storage_err("Failed to clear symbols"))?;
        tx.execute(
            "DELETE FROM symbol_references WHERE file_id = ?1",
            params![file_id],
        )
        .map_err(storage_err("Failed to clear references"))?;

        let mut ids_by_name: HashMap<&str, i64> = HashMap::new();
        {
            let mut insert = tx
                .prepare(
                    r#"INSERT OR IGNORE INTO symbols
                       (file_id, name, kind, signature, doc, start_line, end_line, col, parent_id)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                )
                .map_err(storage_err("Failed to prepare symbol insert"))?;
            let mut insert_trigram = tx
                .prepare("INSERT INTO symbol_trigrams (symbol_id, trigram) VALUES (?1, ?2)")
                .map_err(storage_err("Failed to prepare trigram insert"))?;
            let mut insert_fts = tx
                .prepare("INSERT INTO fts_symbols (rowid, name, signature, doc) VALUES (?1, ?2, ?3, ?4)")
                .map_err(storage_err("Failed to prepare symbol FTS insert"))?;

            for symbol in symbols {
                let parent_id = symbol
                    .parent
                    .as_deref()
                    .and_then(|p| ids_by_name.get(p))
                    .copied();
                let inserted = insert
                    .execute(params![
                        file_id,
                        symbol.name,
                        symbol.kind.as_str(),
                        symbol.signature,
                        symbol.doc,
                        symbol.start_line,
                        symbol.end_line,
                        symbol.column,
                        parent_id,
                    ])
                    .map_err(storage_err("Failed to insert symbol"))?;
                if inserted == 0 {
                    // Duplicate (file, name, kind, start_line); first wins.
                    continue;
                }
                let id = tx.last_insert_rowid();
                ids_by_name.entry(symbol.name.as_str()).or_insert(id);

                for gram in trigrams(&symbol.name) {
                    insert_trigram
                        .execute(params![id, gram])
                        .map_err(storage_err("Failed to insert trigram"))?;
                }
                insert_fts
                    .execute(params![id, symbol.name, symbol.signature, symbol.doc])
                    .map_err(storage_err("Failed to insert symbol FTS row"))?;
            }

            let mut insert_ref = tx
                .prepare(
                    r#"INSERT INTO symbol_references (symbol_id, file_id, line, col, kind)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                )
                .map_err(storage_err("Failed to prepare reference insert"))?;
            let mut resolve = tx
                .prepare("SELECT id FROM symbols WHERE name = ?1 ORDER BY id LIMIT 1")
                .map_err(storage_err("Failed to prepare reference resolution"))?;

            for reference in references {
                let symbol_id: Option<i64> = resolve
                    .query_row(params![reference.name], |row| row.get(0))
                    .optional()
                    .map_err(storage_err("Failed to resolve reference"))?;
                insert_ref
                    .execute(params![
                        symbol_id,
                        file_id,
                        reference.line,
                        reference.column,
                        reference.kind.as_str(),
                    ])
                    .map_err(storage_err("Failed to insert reference"))?;
            }
        }

        if let Some(doc) = fts {
            tx.execute("DELETE FROM bm25_content WHERE rowid = ?1", params![file_id])
                .map_err(storage_err("Failed to clear content FTS row"))?;
            tx.execute(
                r#"INSERT INTO bm25_content (rowid, filepath, filename, content, language)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![
                    file_id,
                    doc.filepath,
                    doc.filename,
                    doc.content,
                    doc.language.map(|l| l.as_str()),
                ],
            )
            .map_err(storage_err("Failed to insert content FTS row"))?;
            tx.execute(
                r#"INSERT INTO bm25_index_status (file_id, filepath, content_hash, indexed_at)
                   VALUES (?1, ?2, ?3, ?4)
                   ON CONFLICT(file_id) DO UPDATE SET filepath = ?2, content_hash = ?3, indexed_at = ?4"#,
                params![file_id, doc.filepath, doc.content_hash, now()],
            )
            .map_err(storage_err("Failed to update FTS status"))?;
            tx.execute(
                "UPDATE files SET truncated = ?1 WHERE id = ?2",
                params![doc.truncated as i64, file_id],
            )
            .map_err(storage_err("Failed to flag truncation"))?;
        }

        tx.commit().map_err(storage_err("Failed to commit file index"))
    }

    /// Hard-delete a file and everything hanging off it, in one transaction.
    pub async fn delete_file(&self, file_id: i64) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        let tx = conn
            .unchecked_transaction()
            .map_err(storage_err("Failed to start transaction"))?;

        tx.execute(
            "DELETE FROM fts_symbols WHERE rowid IN (SELECT id FROM symbols WHERE file_id = ?1)",
            params![file_id],
        )
        .map_err(storage_err("Failed to delete symbol FTS rows"))?;
        tx.execute("DELETE FROM bm25_content WHERE rowid = ?1", params![file_id])
            .map_err(storage_err("Failed to delete content FTS row"))?;
        // Cascades symbols, references, trigrams, and the FTS status row.
        tx.execute("DELETE FROM files WHERE id = ?1", params![file_id])
            .map_err(storage_err("Failed to delete file"))?;

        tx.commit().map_err(storage_err("Failed to commit delete"))
    }

    pub async fn file_by_path(
        &self,
        repo_id: i64,
        relative_path: &str,
    ) -> Result<Option<FileRecord>, EngineError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            r#"SELECT id, repo_id, relative_path, absolute_path, language, size, content_hash, indexed_at, truncated
               FROM files WHERE repo_id = ?1 AND relative_path = ?2"#,
            params![repo_id, relative_path],
            file_from_row,
        )
        .optional()
        .map_err(storage_err("Failed to query file"))
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                r#"SELECT id, repo_id, relative_path, absolute_path, language, size, content_hash, indexed_at, truncated
                   FROM files ORDER BY relative_path"#,
            )
            .map_err(storage_err("Failed to prepare file listing"))?;
        let rows = stmt
            .query_map([], file_from_row)
            .map_err(storage_err("Failed to list files"))?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row.map_err(storage_err("Failed to read file row"))?);
        }
        Ok(files)
    }

    pub async fn query_symbol_exact(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<SymbolRecord>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!("{SYMBOL_SELECT} WHERE s.name = ?1 LIMIT ?2"))
            .map_err(storage_err("Failed to prepare symbol query"))?;
        collect_symbols(stmt.query_map(params![name, limit as i64], symbol_from_row))
    }

    /// Trigram fuzzy lookup: candidates share at least one 3-gram with the
    /// query; Jaccard similarity over the gram sets is computed exactly and
    /// filtered against the cutoff.
    pub async fn query_symbol_fuzzy(
        &self,
        name: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<(SymbolRecord, f64)>, EngineError> {
        let query_grams = trigrams(name);
        if query_grams.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().await;
        let placeholders = vec!["?"; query_grams.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT symbol_id FROM symbol_trigrams WHERE trigram IN ({placeholders})"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(storage_err("Failed to prepare trigram query"))?;
        let candidate_ids: Vec<i64> = stmt
            .query_map(params_from_iter(query_grams.iter()), |row| row.get(0))
            .map_err(storage_err("Failed to query trigrams"))?
            .filter_map(|r| r.ok())
            .collect();

        let mut scored = Vec::new();
        for id in candidate_ids {
            let record: Option<SymbolRecord> = conn
                .query_row(
                    &format!("{SYMBOL_SELECT} WHERE s.id = ?1"),
                    params![id],
                    symbol_from_row,
                )
                .optional()
                .map_err(storage_err("Failed to load fuzzy candidate"))?;
            if let Some(record) = record {
                let similarity = jaccard(&query_grams, &trigrams(&record.name));
                if similarity >= threshold {
                    scored.push((record, similarity));
                }
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Stemmed/substring symbol search over name, signature, and doc.
    pub async fn query_symbol_fts(
        &self,
        match_expr: &str,
        limit: usize,
    ) -> Result<Vec<SymbolRecord>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "{SYMBOL_SELECT} WHERE s.id IN (SELECT rowid FROM fts_symbols WHERE fts_symbols MATCH ?1) LIMIT ?2"
            ))
            .map_err(fts_err)?;
        collect_symbols(stmt.query_map(params![match_expr, limit as i64], symbol_from_row))
            .map_err(remap_fts_err)
    }

    /// Primary content search. Snippets come straight from the FTS engine
    /// with the configured highlight delimiters; the BM25 rank is negated so
    /// higher means more relevant. Ties break toward shorter paths.
    pub async fn query_fts(
        &self,
        match_expr: &str,
        limit: usize,
        offset: usize,
        delimiters: (char, char),
    ) -> Result<Vec<FtsHit>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                r#"SELECT filepath, language,
                          snippet(bm25_content, 2, ?1, ?2, '…', 20),
                          bm25(bm25_content) AS rank,
                          content
                   FROM bm25_content
                   WHERE bm25_content MATCH ?3
                   ORDER BY rank, length(filepath)
                   LIMIT ?4 OFFSET ?5"#,
            )
            .map_err(fts_err)?;

        let rows = stmt
            .query_map(
                params![
                    delimiters.0.to_string(),
                    delimiters.1.to_string(),
                    match_expr,
                    limit as i64,
                    offset as i64
                ],
                |row| {
                    let rank: f64 = row.get(3)?;
                    Ok(FtsHit {
                        filepath: row.get(0)?,
                        language: row.get(1)?,
                        snippet: row.get(2)?,
                        score: rank.abs() as f32,
                        content: row.get(4)?,
                    })
                },
            )
            .map_err(fts_err)?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row.map_err(fts_err)?);
        }
        Ok(hits)
    }

    /// Stored content for one file, used by the reranker input assembly.
    pub async fn file_content(&self, relative_path: &str) -> Result<Option<String>, EngineError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT content FROM bm25_content WHERE filepath = ?1",
            params![relative_path],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err("Failed to read file content"))
    }

    /// References that point at any symbol with the given name.
    pub async fn references_for_name(
        &self,
        name: &str,
    ) -> Result<Vec<ReferenceRecord>, EngineError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                r#"SELECT r.id, r.symbol_id, r.file_id, f.relative_path, r.line, r.col, r.kind
                   FROM symbol_references r
                   JOIN files f ON f.id = r.file_id
                   JOIN symbols s ON s.id = r.symbol_id
                   WHERE s.name = ?1
                   ORDER BY f.relative_path, r.line"#,
            )
            .map_err(storage_err("Failed to prepare reference query"))?;
        let rows = stmt
            .query_map(params![name], |row| {
                Ok(ReferenceRecord {
                    id: row.get(0)?,
                    symbol_id: row.get(1)?,
                    file_id: row.get(2)?,
                    relative_path: row.get(3)?,
                    line: row.get(4)?,
                    column: row.get(5)?,
                    kind: crate::domain::ReferenceKind::parse(&row.get::<_, String>(6)?),
                })
            })
            .map_err(storage_err("Failed to query references"))?;

        let mut refs = Vec::new();
        for row in rows {
            refs.push(row.map_err(storage_err("Failed to read reference row"))?);
        }
        Ok(refs)
    }

    /// Row counts, per-language histogram, and the newest `indexed_at`.
    pub async fn stats(&self) -> Result<(IndexCounts, HashMap<String, u64>, Option<i64>), EngineError> {
        let conn = self.conn.lock().await;

        let files: i64 = conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(storage_err("Failed to count files"))?;
        let symbols: i64 = conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))
            .map_err(storage_err("Failed to count symbols"))?;
        let fts_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM bm25_index_status", [], |row| row.get(0))
            .map_err(storage_err("Failed to count FTS rows"))?;
        let last_indexed: Option<i64> = conn
            .query_row("SELECT MAX(indexed_at) FROM files", [], |row| row.get(0))
            .map_err(storage_err("Failed to read last indexed time"))?;

        let mut languages = HashMap::new();
        let mut stmt = conn
            .prepare("SELECT COALESCE(language, 'unknown'), COUNT(*) FROM files GROUP BY language")
            .map_err(storage_err("Failed to prepare language histogram"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(storage_err("Failed to query language histogram"))?;
        for row in rows {
            let (lang, count) = row.map_err(storage_err("Failed to read histogram row"))?;
            languages.insert(lang, count as u64);
        }

        Ok((
            IndexCounts {
                files: files as u64,
                symbols: symbols as u64,
                fts_rows: fts_rows as u64,
            },
            languages,
            last_indexed,
        ))
    }

    /// Reclaim space after bulk deletions (export filtering).
    pub async fn compact(&self) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        conn.execute_batch("VACUUM")
            .map_err(storage_err("Failed to vacuum"))
    }

    /// Write a compact, consistent snapshot of this artifact to `dest`.
    /// Readers of the source are unaffected; WAL state is folded in.
    pub async fn vacuum_into(&self, dest: &Path) -> Result<(), EngineError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "VACUUM INTO ?1",
            params![dest.to_string_lossy().to_string()],
        )
        .map_err(storage_err("Failed to snapshot artifact"))?;
        Ok(())
    }
}

const SYMBOL_SELECT: &str = r#"SELECT s.id, s.file_id, s.name, s.kind, s.signature, s.doc,
       s.start_line, s.end_line, s.col, s.parent_id, f.relative_path, f.language
FROM symbols s JOIN files f ON f.id = s.file_id"#;

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn storage_err(context: &'static str) -> impl Fn(rusqlite::Error) -> EngineError {
    move |e| EngineError::storage(format!("{}: {}", context, e))
}

/// FTS MATCH errors on user-supplied expressions are usage errors, not
/// storage failures.
fn fts_err(e: rusqlite::Error) -> EngineError {
    let text = e.to_string();
    if text.contains("fts5") || text.contains("syntax error") || text.contains("unknown special query") {
        EngineError::bad_query(text)
    } else {
        EngineError::storage(format!("FTS query failed: {}", text))
    }
}

fn remap_fts_err(e: EngineError) -> EngineError {
    match e {
        EngineError::Storage(text)
            if text.contains("fts5") || text.contains("syntax error") =>
        {
            EngineError::BadQuery(text)
        }
        other => other,
    }
}

fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        relative_path: row.get(2)?,
        absolute_path: row.get(3)?,
        language: row.get::<_, Option<String>>(4)?.map(|s| Language::parse(&s)),
        size: row.get::<_, i64>(5)? as u64,
        content_hash: row.get(6)?,
        indexed_at: row.get(7)?,
        truncated: row.get::<_, i64>(8)? != 0,
    })
}

fn symbol_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolRecord> {
    Ok(SymbolRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        kind: SymbolKind::parse(&row.get::<_, String>(3)?),
        signature: row.get(4)?,
        doc: row.get(5)?,
        start_line: row.get(6)?,
        end_line: row.get(7)?,
        column: row.get(8)?,
        parent_id: row.get(9)?,
        relative_path: row.get(10)?,
        language: row
            .get::<_, Option<String>>(11)?
            .map(|s| Language::parse(&s)),
    })
}

fn collect_symbols<'a, F>(
    rows: rusqlite::Result<rusqlite::MappedRows<'a, F>>,
) -> Result<Vec<SymbolRecord>, EngineError>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<SymbolRecord>,
{
    let rows = rows.map_err(storage_err("Failed to query symbols"))?;
    let mut symbols = Vec::new();
    for row in rows {
        symbols.push(row.map_err(storage_err("Failed to read symbol row"))?);
    }
    Ok(symbols)
}

/// Lowercased sliding 3-grams; names shorter than three characters fall back
/// to the whole name so they can still intersect.
pub fn trigrams(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.to_lowercase().chars().collect();
    if chars.len() < 3 {
        if chars.is_empty() {
            return Vec::new();
        }
        return vec![chars.iter().collect()];
    }
    let mut grams: Vec<String> = chars.windows(3).map(|w| w.iter().collect()).collect();
    grams.sort();
    grams.dedup();
    grams
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: std::collections::HashSet<&String> = a.iter().collect();
    let set_b: std::collections::HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReferenceKind;

    async fn seed(storage: &SqliteIndex) -> (i64, i64) {
        let repo_id = storage
            .upsert_repository("abc123def456", "/repo", "repo")
            .await
            .unwrap();
        let (file_id, changed) = storage
            .upsert_file(repo_id, "src/a.py", "/repo/src/a.py", Some(Language::Python), 42, "hash1")
            .await
            .unwrap();
        assert!(changed);
        (repo_id, file_id)
    }

    fn widget_symbols() -> Vec<Symbol> {
        vec![
            Symbol::new("Widget", SymbolKind::Class, 1, 2).with_signature("class Widget:"),
            Symbol::new("paint", SymbolKind::Method, 2, 2)
                .with_signature("    def paint(self): pass")
                .with_parent("Widget"),
        ]
    }

    fn widget_fts(content: &str) -> FtsDoc {
        FtsDoc {
            filepath: "src/a.py".to_string(),
            filename: "a.py".to_string(),
            content: content.to_string(),
            language: Some(Language::Python),
            content_hash: "hash1".to_string(),
            truncated: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_file_idempotent_on_hash() {
        let storage = SqliteIndex::in_memory().unwrap();
        let (repo_id, file_id) = seed(&storage).await;

        let (again, changed) = storage
            .upsert_file(repo_id, "src/a.py", "/repo/src/a.py", Some(Language::Python), 42, "hash1")
            .await
            .unwrap();
        assert_eq!(again, file_id);
        assert!(!changed);

        let (_, changed) = storage
            .upsert_file(repo_id, "src/a.py", "/repo/src/a.py", Some(Language::Python), 43, "hash2")
            .await
            .unwrap();
        assert!(changed);
    }

    #[tokio::test]
    async fn test_symbol_roundtrip_and_exact_query() {
        let storage = SqliteIndex::in_memory().unwrap();
        let (_, file_id) = seed(&storage).await;

        storage
            .index_file_txn(
                file_id,
                &widget_symbols(),
                &[Reference::new("Widget", 5, 1, ReferenceKind::Call)],
                Some(&widget_fts("class Widget:\n    def paint(self): pass\n")),
            )
            .await
            .unwrap();

        let found = storage.query_symbol_exact("Widget", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, SymbolKind::Class);
        assert_eq!(found[0].relative_path, "src/a.py");
        assert_eq!(found[0].start_line, 1);

        let methods = storage.query_symbol_exact("paint", 10).await.unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].kind, SymbolKind::Method);
        assert!(methods[0].parent_id.is_some());
    }

    #[tokio::test]
    async fn test_fts_query_returns_snippet_and_positive_score() {
        let storage = SqliteIndex::in_memory().unwrap();
        let (_, file_id) = seed(&storage).await;
        storage
            .index_file_txn(
                file_id,
                &[],
                &[],
                Some(&widget_fts("# TODO: refactor this widget painter\n")),
            )
            .await
            .unwrap();

        let hits = storage
            .query_fts("refactor", 10, 0, ('«', '»'))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.contains("«refactor»"));
        assert!(hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_fts_syntax_error_is_bad_query() {
        let storage = SqliteIndex::in_memory().unwrap();
        let (_, file_id) = seed(&storage).await;
        storage
            .index_file_txn(file_id, &[], &[], Some(&widget_fts("hello world\n")))
            .await
            .unwrap();

        let err = storage
            .query_fts("AND AND ((", 10, 0, ('«', '»'))
            .await
            .unwrap_err();
        assert!(err.is_bad_query(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_delete_file_cascades_everything() {
        let storage = SqliteIndex::in_memory().unwrap();
        let (repo_id, file_id) = seed(&storage).await;
        storage
            .index_file_txn(
                file_id,
                &widget_symbols(),
                &[Reference::new("paint", 9, 3, ReferenceKind::Call)],
                Some(&widget_fts("class Widget:\n")),
            )
            .await
            .unwrap();

        storage.delete_file(file_id).await.unwrap();

        assert!(storage.query_symbol_exact("Widget", 5).await.unwrap().is_empty());
        assert!(storage.query_fts("Widget", 5, 0, ('«', '»')).await.unwrap().is_empty());
        assert!(storage.file_by_path(repo_id, "src/a.py").await.unwrap().is_none());
        let (counts, _, _) = storage.stats().await.unwrap();
        assert_eq!(counts.files, 0);
        assert_eq!(counts.symbols, 0);
        assert_eq!(counts.fts_rows, 0);
    }

    #[tokio::test]
    async fn test_fuzzy_lookup_over_trigrams() {
        let storage = SqliteIndex::in_memory().unwrap();
        let (_, file_id) = seed(&storage).await;
        storage
            .index_file_txn(file_id, &widget_symbols(), &[], None)
            .await
            .unwrap();

        let close = storage
            .query_symbol_fuzzy("Widgets", 0.5, 10)
            .await
            .unwrap();
        assert!(!close.is_empty());
        assert_eq!(close[0].0.name, "Widget");
        assert!(close[0].1 >= 0.5);

        let far = storage
            .query_symbol_fuzzy("Unrelated", 0.7, 10)
            .await
            .unwrap();
        assert!(far.is_empty());
    }

    #[tokio::test]
    async fn test_symbol_fts_matches_signature_and_doc() {
        let storage = SqliteIndex::in_memory().unwrap();
        let (_, file_id) = seed(&storage).await;
        storage
            .index_file_txn(
                file_id,
                &[Symbol::new("render", SymbolKind::Function, 4, 9)
                    .with_signature("def render(surface):")
                    .with_doc("Paints the widget onto a surface.")],
                &[],
                None,
            )
            .await
            .unwrap();

        // Stemmed match against the doc column.
        let by_doc = storage.query_symbol_fts("painting", 10).await.unwrap();
        assert_eq!(by_doc.len(), 1);
        assert_eq!(by_doc[0].name, "render");

        let by_sig = storage.query_symbol_fts("surface", 10).await.unwrap();
        assert_eq!(by_sig.len(), 1);
    }

    #[tokio::test]
    async fn test_reindex_replaces_symbols() {
        let storage = SqliteIndex::in_memory().unwrap();
        let (_, file_id) = seed(&storage).await;
        storage
            .index_file_txn(file_id, &widget_symbols(), &[], None)
            .await
            .unwrap();
        storage
            .index_file_txn(
                file_id,
                &[Symbol::new("Gadget", SymbolKind::Class, 1, 1).with_signature("class Gadget:")],
                &[],
                None,
            )
            .await
            .unwrap();

        assert!(storage.query_symbol_exact("Widget", 5).await.unwrap().is_empty());
        assert_eq!(storage.query_symbol_exact("Gadget", 5).await.unwrap().len(), 1);
    }

    #[test]
    fn test_trigrams() {
        let grams = trigrams("paint");
        assert!(grams.contains(&"pai".to_string()));
        assert!(grams.contains(&"int".to_string()));
        assert_eq!(trigrams("ab"), vec!["ab".to_string()]);
        assert!(trigrams("").is_empty());
    }
}
