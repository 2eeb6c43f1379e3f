//! Shareable index export: snapshot the artifact, drop every file the ignore
//! policy excludes, compact, and emit a deterministic tar.gz with a manifest.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::connector::storage::SqliteIndex;
use crate::domain::services::ExportFilter;
use crate::domain::{EngineError, IndexMetadata};

/// Database file name inside the archive.
const EXPORT_DB_NAME: &str = "code_index.db";
const EXPORT_METADATA_NAME: &str = ".index_metadata.json";
const MANIFEST_NAME: &str = "MANIFEST.json";

#[derive(Debug, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub sha256: String,
}

#[derive(Debug, Serialize)]
pub struct ExportManifest {
    pub entries: Vec<ManifestEntry>,
    pub excluded_patterns: Vec<String>,
}

#[derive(Debug)]
pub struct ExportReport {
    pub archive_path: PathBuf,
    pub archive_sha256: String,
    pub files_dropped: u64,
    pub files_kept: u64,
    pub excluded_patterns: Vec<String>,
}

pub struct ExportIndexUseCase;

impl ExportIndexUseCase {
    /// Produce `output` from `artifact`, filtered by the repo's ignore policy
    /// plus the hard-coded sensitive set. The source artifact is only read.
    pub async fn execute(
        repo_root: &Path,
        artifact: &Path,
        metadata: &IndexMetadata,
        output: &Path,
    ) -> Result<ExportReport, EngineError> {
        let filter = ExportFilter::load(repo_root)?;

        let staging = output.with_extension("staging");
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        let result = Self::run(artifact, metadata, output, &staging, &filter).await;
        let _ = std::fs::remove_dir_all(&staging);
        result
    }

    async fn run(
        artifact: &Path,
        metadata: &IndexMetadata,
        output: &Path,
        staging: &Path,
        filter: &ExportFilter,
    ) -> Result<ExportReport, EngineError> {
        // Consistent snapshot of the source artifact, WAL folded in.
        let staged_db = staging.join(EXPORT_DB_NAME);
        {
            let source = SqliteIndex::open_or_init(artifact, &[2, 3])?;
            source.vacuum_into(&staged_db).await?;
        }

        // Drop excluded files from the copy; cascades symbols, references,
        // trigrams, and FTS rows.
        let staged = SqliteIndex::open_or_init(&staged_db, &[2, 3])?;
        let mut dropped = 0u64;
        let mut kept = 0u64;
        for file in staged.list_files().await? {
            if filter.include(&file.relative_path) {
                kept += 1;
            } else {
                debug!("Export excludes {}", file.relative_path);
                staged.delete_file(file.id).await?;
                dropped += 1;
            }
        }
        staged.compact().await?;
        drop(staged);

        let staged_meta = staging.join(EXPORT_METADATA_NAME);
        let metadata_json = serde_json::to_string_pretty(metadata)
            .map_err(|e| EngineError::export(format!("Failed to encode metadata: {}", e)))?;
        std::fs::write(&staged_meta, metadata_json)?;

        // Entries in sorted order; the manifest itself goes first.
        let mut entries: Vec<(String, PathBuf)> = vec![
            (EXPORT_METADATA_NAME.to_string(), staged_meta.clone()),
            (EXPORT_DB_NAME.to_string(), staged_db.clone()),
        ];
        if let Some(vector_dir) = artifact.parent().map(|p| p.join("vector_index")) {
            if vector_dir.is_dir() {
                for entry in walkdir::WalkDir::new(&vector_dir)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    let name = format!(
                        "vector_index/{}",
                        entry
                            .path()
                            .strip_prefix(&vector_dir)
                            .unwrap_or(entry.path())
                            .to_string_lossy()
                    );
                    entries.push((name, entry.into_path()));
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let manifest = ExportManifest {
            entries: entries
                .iter()
                .map(|(name, path)| {
                    Ok(ManifestEntry {
                        name: name.clone(),
                        sha256: sha256_file(path)?,
                    })
                })
                .collect::<Result<Vec<_>, EngineError>>()?,
            excluded_patterns: filter.excluded_patterns().to_vec(),
        };
        let manifest_path = staging.join(MANIFEST_NAME);
        std::fs::write(
            &manifest_path,
            serde_json::to_string_pretty(&manifest)
                .map_err(|e| EngineError::export(format!("Failed to encode manifest: {}", e)))?,
        )?;
        entries.insert(0, (MANIFEST_NAME.to_string(), manifest_path));

        // Deterministic archive: fixed mtime/ownership/mode, entries in
        // sorted order (manifest first), gzip with no embedded timestamp.
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let out_file = File::create(output)?;
        let encoder = GzEncoder::new(out_file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, path) in &entries {
            let mut file = File::open(path)?;
            let size = file.metadata()?.len();
            let mut header = tar::Header::new_gnu();
            header.set_size(size);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            header.set_cksum();
            builder
                .append_data(&mut header, name, &mut file)
                .map_err(|e| EngineError::export(format!("Failed to append {}: {}", name, e)))?;
        }
        let encoder = builder
            .into_inner()
            .map_err(|e| EngineError::export(format!("Failed to finish archive: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| EngineError::export(format!("Failed to flush archive: {}", e)))?;

        let archive_sha256 = sha256_file(output)?;
        info!(
            "Exported {:?}: {} files kept, {} dropped",
            output, kept, dropped
        );

        Ok(ExportReport {
            archive_path: output.to_path_buf(),
            archive_sha256,
            files_dropped: dropped,
            files_kept: kept,
            excluded_patterns: filter.excluded_patterns().to_vec(),
        })
    }
}

fn sha256_file(path: &Path) -> Result<String, EngineError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
