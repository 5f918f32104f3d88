//! Backend factory for storage layer initialization.
//!
//! Centralizes backend creation so the CLI, the orchestrator builder and
//! tests pick backends the same way.
//!
//! # Architecture
//!
//! ```text
//! BackendFactory
//!   ├── create_graph_store() → Arc<dyn CodeGraphStore>   (StorageMode)
//!   ├── create_text_index()  → Option<Arc<dyn TextIndex>>
//!   └── create_classifier()  → Arc<dyn IntentClassifier>
//! ```
//!
//! # Graceful Degradation
//!
//! The graph store is required and its errors propagate. The text index and
//! the LLM classifier are optional: failures are logged and the retriever
//! falls back to heuristic scoring, the decomposer to keywords.

use crate::config::TaskscopeConfig;
use crate::intent::{IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier};
use crate::llm::AnthropicClient;
use crate::storage::graph::{InMemoryGraphStore, SqliteGraphStore};
use crate::storage::index::SqliteTextIndex;
use crate::Result;
use crate::storage::{CodeGraphStore, StorageMode, TextIndex};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Storage backends for one run.
pub struct BackendSet {
    /// Code graph.
    pub graph: Arc<dyn CodeGraphStore>,
    /// Full-text index, when it could be opened.
    pub text_index: Option<Arc<dyn TextIndex>>,
}

impl BackendSet {
    /// Returns true if full-text search is available.
    #[must_use]
    pub fn has_text_index(&self) -> bool {
        self.text_index.is_some()
    }
}

/// Factory for creating storage backends.
pub struct BackendFactory;

impl BackendFactory {
    /// Creates the graph store and text index for a configuration.
    ///
    /// In memory mode the text index is in-memory too.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store cannot be created.
    pub fn create_all(config: &TaskscopeConfig) -> Result<BackendSet> {
        let graph = Self::create_graph_store(config)?;
        let text_index = if config.storage.mode == StorageMode::Memory {
            match SqliteTextIndex::in_memory() {
                Ok(index) => Some(Arc::new(index) as Arc<dyn TextIndex>),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create in-memory text index");
                    None
                },
            }
        } else {
            Self::create_text_index(&config.text_index_path())
        };
        Ok(BackendSet { graph, text_index })
    }

    /// Creates the graph store selected by `storage.mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, or
    /// [`crate::Error::FeatureNotEnabled`] for `falkordb` without the feature.
    pub fn create_graph_store(config: &TaskscopeConfig) -> Result<Arc<dyn CodeGraphStore>> {
        match config.storage.mode {
            StorageMode::Sqlite => {
                let path = config.graph_db_path();
                let store = SqliteGraphStore::new(&path)?;
                tracing::debug!(path = %path.display(), "Created SQLite graph store");
                Ok(Arc::new(store))
            },
            StorageMode::Memory => Ok(Arc::new(InMemoryGraphStore::new())),
            StorageMode::Falkordb => Self::create_falkor(config),
        }
    }

    #[cfg(feature = "falkordb")]
    fn create_falkor(config: &TaskscopeConfig) -> Result<Arc<dyn CodeGraphStore>> {
        let store = crate::storage::graph::FalkorGraphStore::new(
            &config.storage.falkor_url,
            config.storage.falkor_graph.clone(),
            Duration::from_millis(config.storage.falkor_timeout_ms),
        )?;
        if !store.health_check() {
            return Err(crate::Error::BackendUnavailable {
                backend: "falkordb".to_string(),
                cause: format!("no PING reply from {}", config.storage.falkor_url),
            });
        }
        tracing::debug!(graph = %config.storage.falkor_graph, "Created FalkorDB graph store");
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "falkordb"))]
    fn create_falkor(_config: &TaskscopeConfig) -> Result<Arc<dyn CodeGraphStore>> {
        Err(crate::Error::FeatureNotEnabled("falkordb".to_string()))
    }

    /// Creates the text index (`SQLite` FTS5).
    ///
    /// Returns `None` if initialization fails.
    pub fn create_text_index(path: &Path) -> Option<Arc<dyn TextIndex>> {
        match SqliteTextIndex::new(path) {
            Ok(index) => {
                tracing::debug!(path = %path.display(), "Created SQLite text index");
                Some(Arc::new(index))
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to create SQLite text index"
                );
                None
            },
        }
    }

    /// Creates the fallback intent classifier.
    ///
    /// The LLM classifier is used only when enabled and an API key is
    /// available; otherwise keywords.
    #[must_use]
    pub fn create_classifier(config: &TaskscopeConfig) -> Arc<dyn IntentClassifier> {
        if !config.decomposition.use_llm {
            return Arc::new(KeywordIntentClassifier::new());
        }
        let client = match AnthropicClient::from_config(&config.llm) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "LLM intent classification unavailable, using keywords");
                return Arc::new(KeywordIntentClassifier::new());
            },
        };
        Arc::new(
            LlmIntentClassifier::new(
                Arc::new(client),
                Duration::from_millis(config.decomposition.llm_timeout_ms),
            )
            .with_min_confidence(config.decomposition.min_llm_confidence),
        )
    }
}
