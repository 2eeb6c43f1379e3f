use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};

use crate::domain::EngineError;

/// The explicit export-time ignore file, gitignore syntax.
pub const MCP_IGNORE_FILE: &str = ".mcp-index-ignore";

/// Patterns that can never be exported, regardless of user ignore files.
pub const SENSITIVE_PATTERNS: &[&str] = &[
    "*.env",
    ".env*",
    "*.key",
    "*.pem",
    "id_rsa*",
    "*.pfx",
    "secrets.*",
    "credentials.*",
];

/// Decides whether a file may be included in an exported artifact.
///
/// Ignore patterns never affect local indexing; they are consulted only here,
/// at export time. Local searches must keep finding `.env` and friends.
pub struct ExportFilter {
    gitignore: Option<Gitignore>,
    mcp_ignore: Option<GlobSet>,
    sensitive: GlobSet,
    excluded_patterns: Vec<String>,
}

impl ExportFilter {
    /// Load ignore sources from the repository root: the `.gitignore` chain
    /// walked from the root plus [`MCP_IGNORE_FILE`]. Missing files are fine.
    pub fn load(repo_root: &Path) -> Result<Self, EngineError> {
        let mut excluded_patterns: Vec<String> =
            SENSITIVE_PATTERNS.iter().map(|p| p.to_string()).collect();

        let mut builder = GitignoreBuilder::new(repo_root);
        let mut saw_gitignore = false;
        for entry in walkdir::WalkDir::new(repo_root)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && entry.file_name() == ".gitignore" {
                if let Some(err) = builder.add(entry.path()) {
                    warn!("Skipping unreadable ignore file {:?}: {}", entry.path(), err);
                } else {
                    saw_gitignore = true;
                }
            }
        }
        let gitignore = if saw_gitignore {
            let gi = builder
                .build()
                .map_err(|e| EngineError::export(format!("Failed to build gitignore set: {}", e)))?;
            excluded_patterns.push(".gitignore patterns".to_string());
            Some(gi)
        } else {
            None
        };

        let mcp_ignore_path = repo_root.join(MCP_IGNORE_FILE);
        let mcp_ignore = if mcp_ignore_path.is_file() {
            let text = std::fs::read_to_string(&mcp_ignore_path)?;
            let mut set = GlobSetBuilder::new();
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                excluded_patterns.push(line.to_string());
                add_pattern(&mut set, line);
            }
            Some(set.build().map_err(|e| {
                EngineError::export(format!("Bad pattern in {}: {}", MCP_IGNORE_FILE, e))
            })?)
        } else {
            None
        };

        let mut sensitive = GlobSetBuilder::new();
        for pattern in SENSITIVE_PATTERNS {
            add_pattern(&mut sensitive, pattern);
        }
        let sensitive = sensitive
            .build()
            .map_err(|e| EngineError::internal(format!("Bad sensitive pattern: {}", e)))?;

        debug!(
            "Export filter loaded: gitignore={}, {}={}",
            gitignore.is_some(),
            MCP_IGNORE_FILE,
            mcp_ignore.is_some()
        );

        Ok(Self {
            gitignore,
            mcp_ignore,
            sensitive,
            excluded_patterns,
        })
    }

    /// A filter with only the hard-coded sensitive set, for exports of repos
    /// with no ignore files at all.
    pub fn sensitive_only() -> Self {
        let mut sensitive = GlobSetBuilder::new();
        for pattern in SENSITIVE_PATTERNS {
            add_pattern(&mut sensitive, pattern);
        }
        Self {
            gitignore: None,
            mcp_ignore: None,
            // The hard-coded patterns are valid globs; build cannot fail here.
            sensitive: sensitive.build().unwrap_or_else(|_| GlobSet::empty()),
            excluded_patterns: SENSITIVE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Whether a repo-relative path may appear in an export.
    pub fn include(&self, relative_path: &str) -> bool {
        let path = Path::new(relative_path);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(relative_path);

        if self.sensitive.is_match(relative_path) || self.sensitive.is_match(file_name) {
            return false;
        }
        if let Some(ref set) = self.mcp_ignore {
            if set.is_match(relative_path) || set.is_match(file_name) {
                return false;
            }
        }
        if let Some(ref gi) = self.gitignore {
            if gi.matched_path_or_any_parents(path, false).is_ignore() {
                return false;
            }
        }
        true
    }

    pub fn excluded_patterns(&self) -> &[String] {
        &self.excluded_patterns
    }
}

/// Add a gitignore-style pattern to a glob set: a trailing `/` means a whole
/// directory, and a pattern with no directory component matches anywhere in
/// the tree.
fn add_pattern(builder: &mut GlobSetBuilder, pattern: &str) {
    let mut variants = Vec::new();
    if let Some(dir) = pattern.strip_suffix('/') {
        variants.push(format!("{}/**", dir));
        if !dir.contains('/') {
            variants.push(format!("**/{}/**", dir));
        }
    } else {
        variants.push(pattern.to_string());
        if !pattern.contains('/') {
            variants.push(format!("**/{}", pattern));
        }
    }
    for v in variants {
        if let Ok(glob) = Glob::new(&v) {
            builder.add(glob);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_set_blocks_env_files() {
        let filter = ExportFilter::sensitive_only();
        assert!(!filter.include(".env"));
        assert!(!filter.include(".env.local"));
        assert!(!filter.include("config/secrets.env"));
        assert!(!filter.include("deploy/server.key"));
        assert!(!filter.include("certs/tls.pem"));
        assert!(!filter.include(".ssh/id_rsa"));
        assert!(!filter.include("secrets.yaml"));
        assert!(!filter.include("credentials.json"));
    }

    #[test]
    fn test_sensitive_set_allows_source() {
        let filter = ExportFilter::sensitive_only();
        assert!(filter.include("src/main.rs"));
        assert!(filter.include("environment.md"));
        assert!(filter.include("README"));
    }

    #[test]
    fn test_gitignore_patterns_apply() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target/\n*.log\n").unwrap();

        let filter = ExportFilter::load(dir.path()).unwrap();
        assert!(!filter.include("target/debug/app"));
        assert!(!filter.include("build.log"));
        assert!(filter.include("src/lib.rs"));
    }

    #[test]
    fn test_mcp_ignore_patterns_apply() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MCP_IGNORE_FILE), "fixtures/\n*.snap\n").unwrap();

        let filter = ExportFilter::load(dir.path()).unwrap();
        assert!(!filter.include("tests/golden.snap"));
        assert!(!filter.include("fixtures/big/blob.bin"));
        assert!(filter.include("tests/golden.rs"));
    }
}
