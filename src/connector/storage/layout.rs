//! Central index layout: per-repository directories keyed by fingerprint,
//! the `current.db` pointer file, artifact naming, metadata sidecars, and
//! the cross-process write lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{
    fingerprint_from_path, fingerprint_from_remote, Config, EngineError, IndexMetadata,
};

/// Name of the pointer file inside a repository's index directory.
pub const CURRENT_POINTER: &str = "current.db";

/// JSON body of the pointer file. A plain file rather than a symlink keeps
/// the layout portable.
#[derive(Debug, Serialize, Deserialize)]
struct CurrentPointer {
    target: String,
}

/// One entry of the repository registry JSON (`MCP_REPO_REGISTRY`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredRepo {
    pub fingerprint: String,
    pub root: PathBuf,
    pub name: String,
}

/// Resolve the workspace root: explicit configuration override first, then
/// the nearest ancestor carrying a `.git` marker, then the current directory.
pub fn workspace_root(config: &Config) -> PathBuf {
    if let Some(ref root) = config.workspace_root {
        return root.clone();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut dir = cwd.as_path();
    loop {
        if dir.join(".git").exists() {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return cwd,
        }
    }
}

/// The central index root and everything beneath it.
pub struct IndexLayout {
    central_root: PathBuf,
}

impl IndexLayout {
    pub fn resolve(config: &Config) -> Self {
        let central_root = config
            .central_index_root
            .clone()
            .unwrap_or_else(|| workspace_root(config).join(".indexes"));
        Self { central_root }
    }

    pub fn with_root(central_root: PathBuf) -> Self {
        Self { central_root }
    }

    pub fn central_root(&self) -> &Path {
        &self.central_root
    }

    /// `<central>/<fingerprint>/`, created on demand.
    pub fn repo_dir(&self, fingerprint: &str) -> Result<PathBuf, EngineError> {
        let dir = self.central_root.join(fingerprint);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn artifact_path(
        &self,
        fingerprint: &str,
        branch: &str,
        commit: &str,
    ) -> Result<PathBuf, EngineError> {
        Ok(self
            .repo_dir(fingerprint)?
            .join(format!("{}_{}.db", sanitize(branch), sanitize(commit))))
    }

    pub fn metadata_path_for(&self, artifact: &Path) -> PathBuf {
        let stem = artifact
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("index");
        artifact.with_file_name(format!("{}.metadata.json", stem))
    }

    /// Resolve the artifact the `current.db` pointer names, or `None` when no
    /// pointer exists. A pointer naming a missing or escaping target is
    /// treated as dangling and ignored.
    pub fn resolve_current(&self, fingerprint: &str) -> Result<Option<PathBuf>, EngineError> {
        let pointer = self.central_root.join(fingerprint).join(CURRENT_POINTER);
        if !pointer.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&pointer)?;
        let parsed: CurrentPointer = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!("Ignoring malformed pointer {:?}: {}", pointer, e);
                return Ok(None);
            }
        };

        let target = self.central_root.join(fingerprint).join(&parsed.target);
        if !target.is_file() {
            warn!("Pointer {:?} names missing artifact {}", pointer, parsed.target);
            return Ok(None);
        }

        // Reject symlink escapes outside the central root.
        let canonical = target.canonicalize()?;
        let root = self
            .central_root
            .canonicalize()
            .unwrap_or_else(|_| self.central_root.clone());
        if !canonical.starts_with(&root) {
            return Err(EngineError::open_failed(format!(
                "Artifact {:?} escapes the central index root",
                canonical
            )));
        }
        Ok(Some(target))
    }

    /// Atomically repoint `current.db` at an artifact file name.
    pub fn set_current(&self, fingerprint: &str, artifact_name: &str) -> Result<(), EngineError> {
        let dir = self.repo_dir(fingerprint)?;
        let body = serde_json::to_string(&CurrentPointer {
            target: artifact_name.to_string(),
        })
        .map_err(|e| EngineError::internal(format!("Failed to encode pointer: {}", e)))?;

        let tmp = dir.join(format!("{}.tmp", CURRENT_POINTER));
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, dir.join(CURRENT_POINTER))?;
        debug!("current.db -> {}", artifact_name);
        Ok(())
    }

    pub fn write_metadata(
        &self,
        artifact: &Path,
        metadata: &IndexMetadata,
    ) -> Result<(), EngineError> {
        let path = self.metadata_path_for(artifact);
        let body = serde_json::to_string_pretty(metadata)
            .map_err(|e| EngineError::internal(format!("Failed to encode metadata: {}", e)))?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Exclusive advisory lock for the single writer of a repository's
    /// artifacts. Held for the duration of an indexing run; readers never
    /// take it.
    pub fn acquire_write_lock(&self, fingerprint: &str) -> Result<WriteLock, EngineError> {
        let path = self.repo_dir(fingerprint)?.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|_| {
            EngineError::storage(format!(
                "Another process is indexing this repository (lock: {:?})",
                path
            ))
        })?;
        Ok(WriteLock { file })
    }

    /// Load the repository registry, or an empty list when none is configured.
    pub fn load_registry(config: &Config) -> Result<Vec<RegisteredRepo>, EngineError> {
        let Some(ref path) = config.repo_registry else {
            return Ok(Vec::new());
        };
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| EngineError::invalid_input(format!("Malformed repo registry: {}", e)))
    }
}

/// Holds the artifact write lock; unlocked on drop.
pub struct WriteLock {
    file: File,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Compute the fingerprint for a repository root: canonical remote URL when
/// one is configured, canonical absolute path otherwise.
pub fn fingerprint_for_root(root: &Path) -> String {
    match discover_remote(root) {
        Some(url) => fingerprint_from_remote(&url),
        None => fingerprint_from_path(root),
    }
}

/// Read the first remote URL out of `.git/config`, preferring `origin`.
pub fn discover_remote(root: &Path) -> Option<String> {
    let config = std::fs::read_to_string(root.join(".git").join("config")).ok()?;

    let mut current_remote: Option<String> = None;
    let mut first_url: Option<String> = None;
    for line in config.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("[remote \"") {
            current_remote = rest.strip_suffix("\"]").map(str::to_string);
        } else if line.starts_with('[') {
            current_remote = None;
        } else if let Some(url) = line.strip_prefix("url = ") {
            if current_remote.as_deref() == Some("origin") {
                return Some(url.trim().to_string());
            }
            if current_remote.is_some() && first_url.is_none() {
                first_url = Some(url.trim().to_string());
            }
        }
    }
    first_url
}

/// Current branch and short commit from `.git`, with quiet fallbacks for
/// repositories without version control.
pub fn branch_and_commit(root: &Path) -> (String, String) {
    let git = root.join(".git");
    let head = match std::fs::read_to_string(git.join("HEAD")) {
        Ok(h) => h.trim().to_string(),
        Err(_) => return ("local".to_string(), "00000000".to_string()),
    };

    if let Some(ref_name) = head.strip_prefix("ref: ") {
        let branch = ref_name
            .strip_prefix("refs/heads/")
            .unwrap_or(ref_name)
            .to_string();
        let commit = std::fs::read_to_string(git.join(ref_name))
            .ok()
            .map(|c| short_commit(c.trim()))
            .or_else(|| packed_ref_commit(&git, ref_name))
            .unwrap_or_else(|| "00000000".to_string());
        (branch, commit)
    } else {
        // Detached HEAD: the file holds the commit itself.
        ("detached".to_string(), short_commit(&head))
    }
}

fn packed_ref_commit(git: &Path, ref_name: &str) -> Option<String> {
    let packed = std::fs::read_to_string(git.join("packed-refs")).ok()?;
    for line in packed.lines() {
        if let Some((hash, name)) = line.split_once(' ') {
            if name == ref_name {
                return Some(short_commit(hash));
            }
        }
    }
    None
}

fn short_commit(hash: &str) -> String {
    hash.chars().take(8).collect()
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = IndexLayout::with_root(dir.path().to_path_buf());

        assert!(layout.resolve_current("abc123").unwrap().is_none());

        let artifact = layout.artifact_path("abc123", "main", "deadbeef").unwrap();
        std::fs::write(&artifact, b"stub").unwrap();
        layout.set_current("abc123", "main_deadbeef.db").unwrap();

        let resolved = layout.resolve_current("abc123").unwrap().unwrap();
        assert_eq!(resolved, artifact);
    }

    #[test]
    fn test_dangling_pointer_is_absent_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = IndexLayout::with_root(dir.path().to_path_buf());
        layout.set_current("abc123", "gone_00000000.db").unwrap();
        assert!(layout.resolve_current("abc123").unwrap().is_none());
    }

    #[test]
    fn test_branch_names_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let layout = IndexLayout::with_root(dir.path().to_path_buf());
        let path = layout
            .artifact_path("abc123", "feature/login", "cafe1234")
            .unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, "feature_login_cafe1234.db");
    }

    #[test]
    fn test_discover_remote_prefers_origin() {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(&git).unwrap();
        std::fs::write(
            git.join("config"),
            r#"[core]
	bare = false
[remote "upstream"]
	url = https://github.com/other/fork.git
[remote "origin"]
	url = git@github.com:owner/repo.git
"#,
        )
        .unwrap();

        assert_eq!(
            discover_remote(dir.path()).as_deref(),
            Some("git@github.com:owner/repo.git")
        );
    }

    #[test]
    fn test_branch_and_commit_without_git() {
        let dir = tempfile::tempdir().unwrap();
        let (branch, commit) = branch_and_commit(dir.path());
        assert_eq!(branch, "local");
        assert_eq!(commit, "00000000");
    }

    #[test]
    fn test_branch_and_commit_from_head() {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(git.join("refs/heads")).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(
            git.join("refs/heads/main"),
            "0123456789abcdef0123456789abcdef01234567\n",
        )
        .unwrap();

        let (branch, commit) = branch_and_commit(dir.path());
        assert_eq!(branch, "main");
        assert_eq!(commit, "01234567");
    }

    #[test]
    fn test_write_lock_excludes_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let layout = IndexLayout::with_root(dir.path().to_path_buf());
        let _held = layout.acquire_write_lock("abc123").unwrap();
        assert!(layout.acquire_write_lock("abc123").is_err());
    }
}
