//! Directory indexing: the per-file pipeline
//! `Discovered → Decoded → Parsed → SymbolsExtracted → FtsWritten → Committed`
//! fanned out over a bounded worker pool. No ignore patterns are consulted;
//! only the central index directory and VCS internals are skipped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::application::use_cases::SemanticIndexUseCase;
use crate::connector::plugins::PluginRegistry;
use crate::connector::storage::{FtsDoc, SqliteIndex, MAX_FTS_CONTENT_BYTES};
use crate::domain::{content_hash, EngineError, Language};

/// Pipeline stage names recorded in per-file failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStage {
    Discovered,
    Decoded,
    Parsed,
    SymbolsExtracted,
    FtsWritten,
    Committed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub stage: IndexStage,
    pub reason: String,
}

/// Outcome of an indexing run. Partial success is the norm: failures are
/// bounded per-file records, never an aborted run.
#[derive(Debug, Default, Serialize)]
pub struct IndexReport {
    pub indexed: u64,
    pub skipped_unreadable: u64,
    pub failed: Vec<FileFailure>,
    /// Set when the deadline elapsed; carries the number of files completed
    /// before the cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<usize>,
}

#[derive(Default)]
struct ReportAccum {
    indexed: u64,
    skipped_unreadable: u64,
    failed: Vec<FileFailure>,
}

pub struct IndexDirectoryUseCase {
    store: Arc<SqliteIndex>,
    registry: Arc<PluginRegistry>,
    semantic: Option<Arc<SemanticIndexUseCase>>,
    worker_count: usize,
    /// Files under this directory are never indexing candidates.
    central_root: Option<PathBuf>,
}

impl IndexDirectoryUseCase {
    pub fn new(
        store: Arc<SqliteIndex>,
        registry: Arc<PluginRegistry>,
        worker_count: usize,
    ) -> Self {
        Self {
            store,
            registry,
            semantic: None,
            worker_count: worker_count.max(1),
            central_root: None,
        }
    }

    pub fn with_semantic(mut self, semantic: Arc<SemanticIndexUseCase>) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn with_central_root(mut self, central_root: PathBuf) -> Self {
        self.central_root = Some(central_root);
        self
    }

    /// Walk `root` and index every readable regular file. Ignore files are
    /// deliberately not consulted: local search must cover `.env` and
    /// friends; filtering happens only at export time.
    pub async fn execute(
        &self,
        repo_id: i64,
        root: &Path,
        deadline: Option<Instant>,
        show_progress: bool,
    ) -> Result<IndexReport, EngineError> {
        let start = Instant::now();
        let files = self.discover(root);
        let total = files.len() as u64;
        info!("Found {} files to index under {:?}", total, root);

        let progress = if show_progress {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.green} {bar:40.green/dim} {pos}/{len} {msg:.dim}")
                    .expect("Invalid progress bar template")
                    .progress_chars("━━─"),
            );
            Some(bar)
        } else {
            None
        };

        let accum = Arc::new(Mutex::new(ReportAccum::default()));
        let expired = Arc::new(AtomicBool::new(false));

        futures_util::stream::iter(files)
            .for_each_concurrent(self.worker_count, |path| {
                let accum = accum.clone();
                let expired = expired.clone();
                let progress = progress.clone();
                async move {
                    if expired.load(Ordering::Relaxed) {
                        return;
                    }
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            expired.store(true, Ordering::Relaxed);
                            return;
                        }
                    }

                    if let Some(ref bar) = progress {
                        bar.set_message(path.to_string_lossy().to_string());
                    }
                    let outcome = self.index_one(repo_id, root, &path).await;
                    let mut accum = accum.lock().await;
                    match outcome {
                        Ok(()) => accum.indexed += 1,
                        Err(FileOutcome::Unreadable) => accum.skipped_unreadable += 1,
                        Err(FileOutcome::Failed(failure)) => accum.failed.push(failure),
                    }
                    if let Some(ref bar) = progress {
                        bar.inc(1);
                    }
                }
            })
            .await;

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        let accum = Arc::try_unwrap(accum)
            .map_err(|_| EngineError::internal("Index accumulator still shared"))?
            .into_inner();

        let mut report = IndexReport {
            indexed: accum.indexed,
            skipped_unreadable: accum.skipped_unreadable,
            failed: accum.failed,
            timed_out: None,
        };
        if expired.load(Ordering::Relaxed) {
            report.timed_out = Some(report.indexed as usize);
        }

        info!(
            "Indexing complete: {} files, {} unreadable, {} failed in {:.2}s",
            report.indexed,
            report.skipped_unreadable,
            report.failed.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(report)
    }

    /// Single-file dispatch used by the watcher. A missing file propagates
    /// the delete through storage and the semantic side-index.
    pub async fn reindex_file(
        &self,
        repo_id: i64,
        root: &Path,
        absolute: &Path,
    ) -> Result<(), EngineError> {
        // The watcher observes the whole workspace; artifact writes and VCS
        // internals must not feed back into the pipeline.
        if let Some(ref central) = self.central_root {
            if absolute.starts_with(central) {
                return Ok(());
            }
        }
        if absolute.components().any(|c| c.as_os_str() == ".git") {
            return Ok(());
        }

        let relative = relative_path(root, absolute);

        if !absolute.exists() {
            if let Some(record) = self.store.file_by_path(repo_id, &relative).await? {
                debug!("Removing deleted file {}", relative);
                self.store.delete_file(record.id).await?;
                if let Some(ref semantic) = self.semantic {
                    semantic.remove_file(&relative).await;
                }
            }
            return Ok(());
        }

        match self.index_one(repo_id, root, absolute).await {
            Ok(()) => Ok(()),
            Err(FileOutcome::Unreadable) => Ok(()),
            Err(FileOutcome::Failed(failure)) => {
                warn!(
                    "Re-index of {} failed at {:?}: {}",
                    failure.path, failure.stage, failure.reason
                );
                Ok(())
            }
        }
    }

    fn discover(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_dir() && name == ".git" {
                    return false;
                }
                if let Some(ref central) = self.central_root {
                    if entry.path() == central.as_path() {
                        return false;
                    }
                }
                true
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    async fn index_one(
        &self,
        repo_id: i64,
        root: &Path,
        absolute: &Path,
    ) -> Result<(), FileOutcome> {
        let relative = relative_path(root, absolute);
        let fail = |stage: IndexStage, reason: String| {
            FileOutcome::Failed(FileFailure {
                path: relative.clone(),
                stage,
                reason,
            })
        };

        // Discovered -> Decoded
        let bytes = match tokio::fs::read(absolute).await {
            Ok(b) => b,
            Err(e) => {
                debug!("Unreadable file {}: {}", relative, e);
                return Err(FileOutcome::Unreadable);
            }
        };
        if bytes.contains(&0) {
            return Err(fail(IndexStage::Decoded, "non_utf8".to_string()));
        }

        let hash = content_hash(&bytes);
        let language = Language::detect(absolute);
        let (file_id, changed) = self
            .store
            .upsert_file(
                repo_id,
                &relative,
                &absolute.to_string_lossy(),
                Some(language),
                bytes.len() as u64,
                &hash,
            )
            .await
            .map_err(|e| fail(IndexStage::Discovered, e.to_string()))?;

        if !changed {
            // Content hash unchanged: leave symbols, FTS rows, and
            // `indexed_at` exactly as they are.
            debug!("Unchanged file {}", relative);
            return Ok(());
        }

        // Decoded -> Parsed -> SymbolsExtracted
        let plugin = self.registry.plugin_for_path(absolute).await;
        let shard = {
            let plugin = plugin.clone();
            let rel = PathBuf::from(&relative);
            let bytes_for_parse = bytes.clone();
            tokio::task::spawn_blocking(move || plugin.index_file(&rel, &bytes_for_parse))
                .await
                .map_err(|e| fail(IndexStage::Parsed, format!("parser task panicked: {}", e)))?
                .map_err(|e| fail(IndexStage::Parsed, e.to_string()))?
        };

        // FtsWritten -> Committed
        let content = String::from_utf8_lossy(&bytes);
        let truncated = content.len() > MAX_FTS_CONTENT_BYTES;
        let fts_content = if truncated {
            truncate_at_char_boundary(&content, MAX_FTS_CONTENT_BYTES).to_string()
        } else {
            content.to_string()
        };
        let filename = absolute
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let doc = FtsDoc {
            filepath: relative.clone(),
            filename,
            content: fts_content,
            language: Some(language),
            content_hash: hash,
            truncated,
        };

        self.store
            .index_file_txn(file_id, &shard.symbols, &shard.references, Some(&doc))
            .await
            .map_err(|e| fail(IndexStage::Committed, e.to_string()))?;

        // The semantic side-index lags rather than failing the pipeline.
        if let Some(ref semantic) = self.semantic {
            semantic.index_file(&relative, language, &content).await;
        }

        debug!(
            "Indexed {} ({} symbols, {} references)",
            relative,
            shard.symbols.len(),
            shard.references.len()
        );
        Ok(())
    }
}

enum FileOutcome {
    Unreadable,
    Failed(FileFailure),
}

fn relative_path(root: &Path, absolute: &Path) -> String {
    absolute
        .strip_prefix(root)
        .unwrap_or(absolute)
        .to_string_lossy()
        .replace('\\', "/")
}

fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_at_char_boundary() {
        let text = "héllo wörld";
        let cut = truncate_at_char_boundary(text, 2);
        assert!(cut.len() <= 2);
        assert!(text.starts_with(cut));
        assert_eq!(truncate_at_char_boundary("abc", 10), "abc");
    }

    #[test]
    fn test_relative_path_normalizes() {
        let root = Path::new("/repo");
        assert_eq!(relative_path(root, Path::new("/repo/src/a.py")), "src/a.py");
    }
}
