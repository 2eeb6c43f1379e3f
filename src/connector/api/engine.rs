//! Engine assembly: resolves repository identity, opens the artifact behind
//! the `current.db` pointer, and wires storage, plugins, reranker, and the
//! optional semantic side-index from one immutable [`Config`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::application::use_cases::{
    ExportIndexUseCase, ExportReport, IndexDirectoryUseCase, IndexReport, LookupSymbolUseCase,
    SearchCodeUseCase, SemanticIndexUseCase, StatusReport, StatusUseCase,
};
use crate::application::{EmbeddingProvider, Reranker, VectorStore};
use crate::connector::embedding::HttpEmbeddingProvider;
use crate::connector::plugins::PluginRegistry;
use crate::connector::reranker::TfidfReranker;
use crate::connector::storage::{
    branch_and_commit, fingerprint_for_root, workspace_root, IndexLayout, SqliteIndex,
    SCHEMA_VERSION,
};
use crate::connector::vector::InMemoryVectorStore;
use crate::connector::watcher::{WatchOptions, WatchService};
use crate::domain::{
    Config, EngineError, IndexMetadata, RerankerMode, SearchHit, SearchQuery, SemanticMode,
    SymbolHit, WatcherMode,
};

pub struct Engine {
    config: Config,
    workspace: PathBuf,
    fingerprint: String,
    branch: String,
    commit: String,
    artifact_path: PathBuf,
    layout: IndexLayout,
    repo_id: i64,
    store: Arc<SqliteIndex>,
    registry: Arc<PluginRegistry>,
    reranker: Option<Arc<dyn Reranker>>,
    semantic: Option<Arc<SemanticIndexUseCase>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Open the engine for the configured workspace, creating a fresh
    /// artifact when none exists yet.
    pub async fn open(config: Config) -> Result<Self, EngineError> {
        Self::open_inner(config, true, true).await
    }

    /// Open only when an index already exists; `NotFound` otherwise. Used by
    /// query-only entry points that must not create empty artifacts.
    pub async fn open_existing(config: Config) -> Result<Self, EngineError> {
        Self::open_inner(config, false, true).await
    }

    /// Open with every language plugin disabled: the degraded, FTS-only mode.
    pub async fn open_degraded(config: Config) -> Result<Self, EngineError> {
        Self::open_inner(config, true, false).await
    }

    async fn open_inner(
        config: Config,
        create: bool,
        plugins_enabled: bool,
    ) -> Result<Self, EngineError> {
        let workspace = workspace_root(&config);
        let fingerprint = fingerprint_for_root(&workspace);
        let layout = IndexLayout::resolve(&config);
        let (branch, commit) = branch_and_commit(&workspace);

        let artifact_path = match layout.resolve_current(&fingerprint)? {
            Some(path) => path,
            None if create => {
                let path = layout.artifact_path(&fingerprint, &branch, &commit)?;
                debug!("Creating artifact {:?}", path);
                path
            }
            None => {
                return Err(EngineError::not_found(format!(
                    "No index found for {} under {:?}",
                    fingerprint,
                    layout.central_root()
                )))
            }
        };

        let store = Arc::new(SqliteIndex::open_or_init(
            &artifact_path,
            &config.fts_prefix_sizes,
        )?);

        if layout.resolve_current(&fingerprint)?.is_none() {
            let name = artifact_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("index.db");
            layout.set_current(&fingerprint, name)?;
        }

        let repo_name = workspace
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("workspace")
            .to_string();
        let repo_id = store
            .upsert_repository(&fingerprint, &workspace.to_string_lossy(), &repo_name)
            .await?;

        let registry = if plugins_enabled {
            Arc::new(PluginRegistry::new(store.clone(), config.snippet_delimiters))
        } else {
            Arc::new(PluginRegistry::disabled(store.clone(), config.snippet_delimiters))
        };

        let reranker: Option<Arc<dyn Reranker>> = match config.reranker {
            RerankerMode::Off => None,
            RerankerMode::Tfidf => Some(Arc::new(TfidfReranker::new())),
        };

        let semantic = match config.semantic {
            SemanticMode::Off => None,
            SemanticMode::On {
                ref provider_url,
                ref model,
                ref api_key_env,
            } => {
                let provider: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbeddingProvider::new(
                    provider_url.clone(),
                    model.clone(),
                    api_key_env,
                ));
                let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
                Some(Arc::new(SemanticIndexUseCase::new(
                    provider,
                    vectors,
                    store.clone(),
                    fingerprint.clone(),
                    config.snippet_delimiters,
                )))
            }
        };

        info!(
            "Engine open: repo {} ({}) artifact {:?}",
            repo_name, fingerprint, artifact_path
        );

        Ok(Self {
            config,
            workspace,
            fingerprint,
            branch,
            commit,
            artifact_path,
            layout,
            repo_id,
            store,
            registry,
            reranker,
            semantic,
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn store(&self) -> Arc<SqliteIndex> {
        self.store.clone()
    }

    fn index_use_case(&self) -> IndexDirectoryUseCase {
        let mut use_case = IndexDirectoryUseCase::new(
            self.store.clone(),
            self.registry.clone(),
            self.config.effective_worker_count(),
        )
        .with_central_root(self.layout.central_root().to_path_buf());
        if let Some(ref semantic) = self.semantic {
            use_case = use_case.with_semantic(semantic.clone());
        }
        use_case
    }

    pub fn lookup_use_case(&self) -> LookupSymbolUseCase {
        LookupSymbolUseCase::new(self.store.clone(), self.config.fuzzy_threshold)
    }

    pub fn search_use_case(&self) -> SearchCodeUseCase {
        let mut use_case = SearchCodeUseCase::new(
            self.store.clone(),
            self.config.snippet_delimiters,
            self.config.rerank_top_k,
        );
        if let Some(ref reranker) = self.reranker {
            use_case = use_case.with_reranker(reranker.clone());
        }
        if let Some(ref semantic) = self.semantic {
            use_case = use_case.with_semantic(semantic.clone());
        }
        use_case
    }

    pub fn status_use_case(&self) -> StatusUseCase {
        StatusUseCase::new(
            self.store.clone(),
            self.artifact_path.clone(),
            self.semantic.is_some(),
        )
    }

    pub async fn lookup(&self, name: &str) -> Result<Option<SymbolHit>, EngineError> {
        self.lookup_use_case().execute(name).await
    }

    /// All recorded use sites of a symbol name, via the plugin that owns the
    /// definition when one is loaded, the fallback adapter otherwise.
    pub async fn find_references(
        &self,
        name: &str,
    ) -> Result<Vec<crate::domain::ReferenceRecord>, EngineError> {
        let plugin = match self.lookup(name).await? {
            Some(hit) => {
                let probe = PathBuf::from(&hit.defined_in);
                self.registry.plugin_for_path(&probe).await
            }
            None => self.registry.fallback(),
        };
        plugin.find_references(name).await
    }

    /// Content search. With `MCP_ENABLE_MULTI_REPO` set and a registry
    /// configured, results from every registered repository's current
    /// artifact are merged by score.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<SearchHit>, EngineError> {
        let mut hits = self.search_use_case().execute(query.clone()).await?;

        if self.config.multi_repo {
            let registered = IndexLayout::load_registry(&self.config)?;
            for repo in registered {
                if repo.fingerprint == self.fingerprint {
                    continue;
                }
                match self.search_sibling(&repo.fingerprint, &query).await {
                    Ok(sibling) => hits.extend(sibling),
                    Err(e) => warn!("Multi-repo search skipped {}: {}", repo.fingerprint, e),
                }
            }
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            hits.truncate(query.limit());
        }

        Ok(hits)
    }

    async fn search_sibling(
        &self,
        fingerprint: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchHit>, EngineError> {
        let Some(artifact) = self.layout.resolve_current(fingerprint)? else {
            return Ok(Vec::new());
        };
        let store = Arc::new(SqliteIndex::open_or_init(
            &artifact,
            &self.config.fts_prefix_sizes,
        )?);
        SearchCodeUseCase::new(
            store,
            self.config.snippet_delimiters,
            self.config.rerank_top_k,
        )
        .execute(query.clone())
        .await
    }

    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        self.status_use_case().execute().await
    }

    /// Full or single-path re-index. Takes the cross-process write lock for
    /// the duration; a full run refreshes the metadata sidecar and pointer.
    pub async fn reindex(
        &self,
        path: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<IndexReport, EngineError> {
        let _lock = self.layout.acquire_write_lock(&self.fingerprint)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let dispatcher = self.index_use_case();

        match path {
            Some(single) => {
                let absolute = if single.is_absolute() {
                    single.to_path_buf()
                } else {
                    self.workspace.join(single)
                };
                dispatcher
                    .reindex_file(self.repo_id, &self.workspace, &absolute)
                    .await?;
                Ok(IndexReport {
                    indexed: 1,
                    ..Default::default()
                })
            }
            None => {
                let report = dispatcher
                    .execute(self.repo_id, &self.workspace, deadline, false)
                    .await?;
                self.write_metadata().await?;
                Ok(report)
            }
        }
    }

    /// Full index with a progress bar, for the CLI.
    pub async fn index_with_progress(&self) -> Result<IndexReport, EngineError> {
        let _lock = self.layout.acquire_write_lock(&self.fingerprint)?;
        let report = self
            .index_use_case()
            .execute(self.repo_id, &self.workspace, None, true)
            .await?;
        self.write_metadata().await?;
        Ok(report)
    }

    async fn write_metadata(&self) -> Result<(), EngineError> {
        let (counts, languages, _) = self.store.stats().await?;
        let metadata = IndexMetadata::new(
            SCHEMA_VERSION,
            self.branch.clone(),
            self.commit.clone(),
            counts,
            languages,
        );
        self.layout.write_metadata(&self.artifact_path, &metadata)
    }

    /// Produce a filtered, shareable archive of the current artifact.
    pub async fn export(&self, output: &Path) -> Result<ExportReport, EngineError> {
        let (counts, languages, _) = self.store.stats().await?;
        let metadata = IndexMetadata::new(
            SCHEMA_VERSION,
            self.branch.clone(),
            self.commit.clone(),
            counts,
            languages,
        );
        ExportIndexUseCase::execute(&self.workspace, &self.artifact_path, &metadata, output).await
    }

    /// Start watching the workspace, dispatching coalesced events into the
    /// indexing pipeline. Returns `None` when the watcher is configured off.
    pub fn start_watcher(self: &Arc<Self>) -> Result<Option<WatchService>, EngineError> {
        let WatcherMode::On {
            debounce_ms,
            queue_cap,
        } = self.config.watcher
        else {
            return Ok(None);
        };

        let dispatcher = Arc::new(self.index_use_case());
        let service = WatchService::start(
            self.workspace.clone(),
            self.repo_id,
            dispatcher,
            WatchOptions {
                debounce_ms,
                queue_cap,
            },
            tokio::runtime::Handle::current(),
        )?;
        Ok(Some(service))
    }
}
