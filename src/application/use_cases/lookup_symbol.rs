//! Exact-then-fuzzy symbol lookup with deterministic tie-breaking.

use std::sync::Arc;

use tracing::debug;

use crate::connector::storage::SqliteIndex;
use crate::domain::{EngineError, SymbolHit, SymbolRecord};

/// Upper bound on candidates pulled before tie-breaking.
const CANDIDATE_LIMIT: usize = 64;

pub struct LookupSymbolUseCase {
    store: Arc<SqliteIndex>,
    fuzzy_threshold: f64,
}

impl LookupSymbolUseCase {
    pub fn new(store: Arc<SqliteIndex>, fuzzy_threshold: f64) -> Self {
        Self {
            store,
            fuzzy_threshold,
        }
    }

    /// Find the single best definition for `name`: exact matches first, then
    /// trigram fuzzy matches at or above the similarity cutoff. Ties break
    /// by kind priority, then shorter file path, then lower start line.
    pub async fn execute(&self, name: &str) -> Result<Option<SymbolHit>, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let mut candidates = self.store.query_symbol_exact(name, CANDIDATE_LIMIT).await?;
        if candidates.is_empty() {
            debug!("No exact match for '{}'; trying fuzzy", name);
            candidates = self
                .store
                .query_symbol_fuzzy(name, self.fuzzy_threshold, CANDIDATE_LIMIT)
                .await?
                .into_iter()
                .map(|(record, _)| record)
                .collect();
        }

        candidates.sort_by(|a, b| {
            a.kind
                .priority()
                .cmp(&b.kind.priority())
                .then(a.relative_path.len().cmp(&b.relative_path.len()))
                .then(a.start_line.cmp(&b.start_line))
        });

        Ok(candidates.into_iter().next().map(to_hit))
    }
}

fn to_hit(record: SymbolRecord) -> SymbolHit {
    SymbolHit {
        symbol: record.name,
        kind: record.kind.as_str().to_string(),
        language: record.language.map(|l| l.as_str().to_string()),
        defined_in: record.relative_path,
        line: record.start_line,
        signature: record.signature,
        doc: record.doc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Language, Symbol, SymbolKind};

    async fn seeded_store() -> Arc<SqliteIndex> {
        let store = Arc::new(SqliteIndex::in_memory().unwrap());
        let repo = store.upsert_repository("fp", "/r", "r").await.unwrap();

        // Same name in two files with different kinds; the class must win.
        let (f1, _) = store
            .upsert_file(repo, "src/widget.py", "/r/src/widget.py", Some(Language::Python), 1, "h1")
            .await
            .unwrap();
        store
            .index_file_txn(
                f1,
                &[Symbol::new("Widget", SymbolKind::Class, 3, 9).with_signature("class Widget:")],
                &[],
                None,
            )
            .await
            .unwrap();

        let (f2, _) = store
            .upsert_file(repo, "a.py", "/r/a.py", Some(Language::Python), 1, "h2")
            .await
            .unwrap();
        store
            .index_file_txn(
                f2,
                &[Symbol::new("Widget", SymbolKind::Variable, 1, 1).with_signature("Widget = 1")],
                &[],
                None,
            )
            .await
            .unwrap();

        store
    }

    #[tokio::test]
    async fn test_kind_priority_wins_over_shorter_path() {
        let store = seeded_store().await;
        let lookup = LookupSymbolUseCase::new(store, 0.7);

        let hit = lookup.execute("Widget").await.unwrap().unwrap();
        assert_eq!(hit.kind, "class");
        assert_eq!(hit.defined_in, "src/widget.py");
        assert_eq!(hit.line, 3);
    }

    #[tokio::test]
    async fn test_fuzzy_fallback() {
        let store = seeded_store().await;
        let lookup = LookupSymbolUseCase::new(store, 0.7);

        let hit = lookup.execute("Widgets").await.unwrap();
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().symbol, "Widget");
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let store = seeded_store().await;
        let lookup = LookupSymbolUseCase::new(store, 0.7);
        assert!(lookup.execute("Nonexistent").await.unwrap().is_none());
        assert!(lookup.execute("   ").await.unwrap().is_none());
    }
}
