//! Compile-time plugin registry. Constructors are keyed by language tag and
//! instantiated lazily: a process holds at most one instance per language.

mod plaintext_plugin;
mod treesitter_plugin;

pub use plaintext_plugin::*;
pub use treesitter_plugin::*;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::application::LanguagePlugin;
use crate::connector::storage::SqliteIndex;
use crate::domain::Language;

/// Languages with a registered adapter constructor. Everything else falls
/// through to the plaintext instance.
const REGISTERED: &[Language] = &[
    Language::Rust,
    Language::Python,
    Language::JavaScript,
    Language::TypeScript,
    Language::Go,
    Language::Cpp,
    Language::Php,
    Language::Dotenv,
    Language::Dockerfile,
    Language::Makefile,
];

fn construct(
    language: Language,
    store: Arc<SqliteIndex>,
    delimiters: (char, char),
) -> Arc<dyn LanguagePlugin> {
    if language.has_grammar() {
        Arc::new(TreeSitterPlugin::new(language, store, delimiters))
    } else {
        Arc::new(PlainTextPlugin::for_language(language, store, delimiters))
    }
}

pub struct PluginRegistry {
    store: Arc<SqliteIndex>,
    delimiters: (char, char),
    /// When false the engine runs in the degraded FTS-only mode: no language
    /// plugin ever loads and every path goes to the plaintext fallback.
    enabled: bool,
    instances: RwLock<HashMap<Language, Arc<dyn LanguagePlugin>>>,
    fallback: Arc<dyn LanguagePlugin>,
}

impl PluginRegistry {
    pub fn new(store: Arc<SqliteIndex>, delimiters: (char, char)) -> Self {
        let fallback = Arc::new(PlainTextPlugin::fallback(store.clone(), delimiters));
        Self {
            store,
            delimiters,
            enabled: true,
            instances: RwLock::new(HashMap::new()),
            fallback,
        }
    }

    /// Registry with all language plugins disabled; content search keeps
    /// working straight off the BM25 index.
    pub fn disabled(store: Arc<SqliteIndex>, delimiters: (char, char)) -> Self {
        let mut registry = Self::new(store, delimiters);
        registry.enabled = false;
        registry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fallback(&self) -> Arc<dyn LanguagePlugin> {
        self.fallback.clone()
    }

    /// Resolve the plugin whose `supports` claims this path, constructing it
    /// on first use. Unclaimed paths get the plaintext fallback.
    pub async fn plugin_for_path(&self, path: &Path) -> Arc<dyn LanguagePlugin> {
        if !self.enabled {
            return self.fallback.clone();
        }

        let language = Language::detect(path);
        if !REGISTERED.contains(&language) {
            return self.fallback.clone();
        }

        if let Some(plugin) = self.instances.read().await.get(&language) {
            if plugin.supports(path) {
                return plugin.clone();
            }
            return self.fallback.clone();
        }

        let mut instances = self.instances.write().await;
        let plugin = instances
            .entry(language)
            .or_insert_with(|| {
                debug!("Loading {} plugin", language);
                construct(language, self.store.clone(), self.delimiters)
            })
            .clone();
        if plugin.supports(path) {
            plugin
        } else {
            self.fallback.clone()
        }
    }

    /// Languages that have been instantiated so far.
    pub async fn loaded_languages(&self) -> Vec<Language> {
        self.instances.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PluginRegistry {
        let store = Arc::new(SqliteIndex::in_memory().unwrap());
        PluginRegistry::new(store, ('«', '»'))
    }

    #[tokio::test]
    async fn test_lazy_single_instance_per_language() {
        let registry = registry();
        assert!(registry.loaded_languages().await.is_empty());

        let a = registry.plugin_for_path(Path::new("src/a.rs")).await;
        let b = registry.plugin_for_path(Path::new("src/b.rs")).await;
        assert_eq!(a.language(), Language::Rust);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.loaded_languages().await, vec![Language::Rust]);
    }

    #[tokio::test]
    async fn test_unknown_extension_falls_back_to_plaintext() {
        let registry = registry();
        let plugin = registry.plugin_for_path(Path::new("LICENSE")).await;
        assert_eq!(plugin.language(), Language::Plaintext);
        assert!(registry.loaded_languages().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_registry_never_loads_plugins() {
        let store = Arc::new(SqliteIndex::in_memory().unwrap());
        let registry = PluginRegistry::disabled(store, ('«', '»'));
        let plugin = registry.plugin_for_path(Path::new("src/a.rs")).await;
        assert_eq!(plugin.language(), Language::Plaintext);
        assert!(registry.loaded_languages().await.is_empty());
    }

    #[tokio::test]
    async fn test_dotenv_paths_get_dotenv_plugin() {
        let registry = registry();
        let plugin = registry.plugin_for_path(Path::new(".env.local")).await;
        assert_eq!(plugin.language(), Language::Dotenv);
    }
}
