use std::path::PathBuf;

/// Reranker selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankerMode {
    Off,
    Tfidf,
}

/// Semantic side-index configuration. Off unless an embedding provider is
/// reachable and credentials resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticMode {
    Off,
    On {
        provider_url: String,
        model: String,
        api_key_env: String,
    },
}

/// File-watcher configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherMode {
    Off,
    On { debounce_ms: u64, queue_cap: usize },
}

/// Immutable engine configuration, resolved once in `main` and threaded
/// through every operation. All file-system paths in the core flow through
/// here; nothing else reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit workspace root override. Falls back to `MCP_WORKSPACE_ROOT`,
    /// then the nearest ancestor with a `.git` marker, then the current dir.
    pub workspace_root: Option<PathBuf>,
    /// Central index root. Defaults to `<workspace>/.indexes`.
    pub central_index_root: Option<PathBuf>,
    /// Repository registry JSON for multi-repo queries.
    pub repo_registry: Option<PathBuf>,
    pub multi_repo: bool,
    /// Indexing worker pool size. Defaults to `min(cpu_count, 8)`.
    pub worker_count: Option<usize>,
    pub fts_prefix_sizes: Vec<u32>,
    pub fuzzy_threshold: f64,
    pub rerank_top_k: usize,
    pub snippet_delimiters: (char, char),
    pub reranker: RerankerMode,
    pub semantic: SemanticMode,
    pub watcher: WatcherMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: None,
            central_index_root: None,
            repo_registry: None,
            multi_repo: false,
            worker_count: None,
            fts_prefix_sizes: vec![2, 3],
            fuzzy_threshold: 0.7,
            rerank_top_k: 50,
            snippet_delimiters: ('«', '»'),
            reranker: RerankerMode::Tfidf,
            semantic: SemanticMode::Off,
            watcher: WatcherMode::On {
                debounce_ms: 200,
                queue_cap: 10_000,
            },
        }
    }
}

impl Config {
    /// Apply the documented environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("MCP_WORKSPACE_ROOT") {
            if !root.is_empty() {
                config.workspace_root = Some(PathBuf::from(root));
            }
        }
        if let Ok(path) = std::env::var("MCP_INDEX_STORAGE_PATH") {
            if !path.is_empty() {
                config.central_index_root = Some(PathBuf::from(path));
            }
        }
        if let Ok(registry) = std::env::var("MCP_REPO_REGISTRY") {
            if !registry.is_empty() {
                config.repo_registry = Some(PathBuf::from(registry));
            }
        }
        if let Ok(flag) = std::env::var("MCP_ENABLE_MULTI_REPO") {
            config.multi_repo = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        // The semantic side-index turns on when a provider is configured;
        // credentials stay in the environment variable the provider names.
        if let Ok(url) = std::env::var("MCP_EMBEDDING_PROVIDER_URL") {
            if !url.is_empty() {
                config.semantic = SemanticMode::On {
                    provider_url: url,
                    model: std::env::var("MCP_EMBEDDING_MODEL")
                        .unwrap_or_else(|_| "voyage-code-3".to_string()),
                    api_key_env: std::env::var("MCP_EMBEDDING_API_KEY_ENV")
                        .unwrap_or_else(|_| "VOYAGE_API_KEY".to_string()),
                };
            }
        }

        config
    }

    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(8)
        })
    }

    pub fn semantic_enabled(&self) -> bool {
        !matches!(self.semantic, SemanticMode::Off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fts_prefix_sizes, vec![2, 3]);
        assert_eq!(config.fuzzy_threshold, 0.7);
        assert_eq!(config.rerank_top_k, 50);
        assert_eq!(config.snippet_delimiters, ('«', '»'));
        assert!(!config.semantic_enabled());
    }

    #[test]
    fn test_worker_count_capped() {
        let config = Config::default();
        assert!(config.effective_worker_count() <= 8);
        assert!(config.effective_worker_count() >= 1);
    }
}
