//! Configuration management.

mod services;

pub use services::{
    AgentConfig, AnalysisConfig, ClarificationConfig, ContextConfig, DEFAULT_BROAD_QUERY_FILE_COUNT,
    DEFAULT_MAX_RESULTS, DEFAULT_RELEVANCE_THRESHOLD, DEFAULT_UNCLEAR_TARGET_FILE_COUNT,
    DEFAULT_UNCLEAR_TARGET_SIMILARITY, DEFAULT_WORD_THRESHOLD, DecompositionConfig, LlmConfig,
    LogFormat, LoggingConfig, RetrievalConfig, StorageConfig, VerificationConfig,
};
pub(crate) use services::{env_flag, env_parse};

use crate::storage::StorageMode;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for taskscope.
#[derive(Debug, Clone)]
pub struct TaskscopeConfig {
    /// Per-project data directory (graph database, text index).
    pub data_dir: PathBuf,
    /// Graph storage.
    pub storage: StorageConfig,
    /// File retrieval.
    pub retrieval: RetrievalConfig,
    /// Seed + Expand.
    pub analysis: AnalysisConfig,
    /// Ambiguity detection.
    pub clarification: ClarificationConfig,
    /// Prompt assembly.
    pub context: ContextConfig,
    /// Task decomposition.
    pub decomposition: DecompositionConfig,
    /// Build/test verification.
    pub verification: VerificationConfig,
    /// Code agent.
    pub agent: AgentConfig,
    /// LLM intent classification.
    pub llm: LlmConfig,
    /// Logging and metrics.
    pub logging: LoggingConfig,
    /// Path the configuration was loaded from, if any.
    pub source: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Retrieval section.
    pub retrieval: Option<ConfigFileRetrieval>,
    /// Clarification section.
    pub clarification: Option<ConfigFileClarification>,
    /// Context section.
    pub context: Option<ConfigFileContext>,
    /// Decomposition section.
    pub decomposition: Option<ConfigFileDecomposition>,
    /// Verification section.
    pub verification: Option<ConfigFileVerification>,
    /// Agent section.
    pub agent: Option<ConfigFileAgent>,
    /// LLM section.
    pub llm: Option<ConfigFileLlm>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// `[storage]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// `sqlite`, `falkordb` or `memory`.
    pub mode: Option<String>,
    /// `SQLite` database path.
    pub sqlite_path: Option<String>,
    /// `FalkorDB` URL.
    pub falkor_url: Option<String>,
    /// `FalkorDB` graph key.
    pub falkor_graph: Option<String>,
    /// `FalkorDB` timeout.
    pub falkor_timeout_ms: Option<u64>,
}

/// `[retrieval]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRetrieval {
    /// Relevance cutoff.
    pub relevance_threshold: Option<f32>,
    /// Result cap.
    pub max_results: Option<usize>,
    /// Worker threads.
    pub workers: Option<usize>,
    /// Discovery cache TTL in seconds.
    pub discovery_ttl_secs: Option<u64>,
    /// Preview cache capacity.
    pub preview_cache_capacity: Option<usize>,
    /// Max seeds for Seed + Expand.
    pub max_seeds: Option<usize>,
    /// Neighbours admitted per seed.
    pub max_expansion_per_seed: Option<usize>,
}

/// `[clarification]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileClarification {
    /// Question cap.
    pub max_questions: Option<usize>,
    /// Strong candidate similarity.
    pub unclear_target_similarity: Option<f32>,
    /// Strong candidate count.
    pub unclear_target_file_count: Option<usize>,
    /// Broad query file count.
    pub broad_query_file_count: Option<usize>,
}

/// `[context]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileContext {
    /// Prompt size cap.
    pub max_prompt_chars: Option<usize>,
    /// Files rendered.
    pub max_files: Option<usize>,
    /// Components rendered.
    pub max_components: Option<usize>,
    /// Relationships rendered.
    pub max_relationships: Option<usize>,
}

/// `[decomposition]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDecomposition {
    /// Word threshold.
    pub word_threshold: Option<usize>,
    /// Search term cap.
    pub max_search_terms: Option<usize>,
    /// LLM classification toggle.
    pub use_llm: Option<bool>,
    /// LLM budget.
    pub llm_timeout_ms: Option<u64>,
}

/// `[verification]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileVerification {
    /// Build command.
    pub build_command: Option<String>,
    /// Test command.
    pub test_command: Option<String>,
    /// Build budget in seconds.
    pub build_timeout_secs: Option<u64>,
    /// Test budget in seconds.
    pub test_timeout_secs: Option<u64>,
}

/// `[agent]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileAgent {
    /// Agent command.
    pub command: Option<String>,
    /// Budget in seconds.
    pub timeout_secs: Option<u64>,
    /// Force simulation.
    pub simulate: Option<bool>,
}

/// `[llm]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
}

/// `[logging]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
    /// Prometheus recorder toggle.
    pub metrics: Option<bool>,
}

impl Default for TaskscopeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".taskscope"),
            storage: StorageConfig::default(),
            retrieval: RetrievalConfig::default(),
            analysis: AnalysisConfig::default(),
            clarification: ClarificationConfig::default(),
            context: ContextConfig::default(),
            decomposition: DecompositionConfig::default(),
            verification: VerificationConfig::default(),
            agent: AgentConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
            source: None,
        }
    }
}

impl TaskscopeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let mut config = Self::from_config_file(file);
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. `TASKSCOPE_CONFIG_PATH`
    /// 2. Platform-specific config dir (`~/Library/Application Support/taskscope/` on macOS)
    /// 3. XDG config dir (`~/.config/taskscope/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        for path in Self::candidate_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable config file");
                },
            }
        }
        Self::default()
    }

    /// Loads from an explicit path if given, else the default locations, then
    /// applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error only when an explicit path cannot be loaded.
    pub fn load(explicit: Option<&Path>) -> crate::Result<Self> {
        let config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default(),
        };
        Ok(config.with_env_overrides())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(p) = std::env::var("TASKSCOPE_CONFIG_PATH") {
            paths.push(PathBuf::from(p));
        }
        if let Some(base_dirs) = directories::BaseDirs::new() {
            paths.push(base_dirs.config_dir().join("taskscope").join("config.toml"));
            paths.push(
                base_dirs
                    .home_dir()
                    .join(".config")
                    .join("taskscope")
                    .join("config.toml"),
            );
        }
        paths
    }

    /// Applies `TASKSCOPE_*` environment overrides to every section.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TASKSCOPE_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        self.storage = self.storage.with_env_overrides();
        self.retrieval = self.retrieval.with_env_overrides();
        self.analysis = self.analysis.with_env_overrides();
        self.clarification = self.clarification.with_env_overrides();
        self.context = self.context.with_env_overrides();
        self.decomposition = self.decomposition.with_env_overrides();
        self.verification = self.verification.with_env_overrides();
        self.agent = self.agent.with_env_overrides();
        self.logging = self.logging.with_env_overrides();
        if self.llm.api_key.is_none()
            && let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
        {
            self.llm.api_key = Some(SecretString::from(key));
        }
        self
    }

    /// Converts a `ConfigFile` to `TaskscopeConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(storage) = file.storage {
            if let Some(mode) = storage.mode.as_deref().and_then(StorageMode::parse) {
                config.storage.mode = mode;
            }
            if let Some(path) = storage.sqlite_path {
                config.storage.sqlite_path = Some(PathBuf::from(path));
            }
            if let Some(url) = storage.falkor_url {
                config.storage.falkor_url = url;
            }
            if let Some(graph) = storage.falkor_graph {
                config.storage.falkor_graph = graph;
            }
            if let Some(ms) = storage.falkor_timeout_ms {
                config.storage.falkor_timeout_ms = ms;
            }
        }
        if let Some(retrieval) = file.retrieval {
            if let Some(v) = retrieval.relevance_threshold {
                config.retrieval.relevance_threshold = v.clamp(0.0, 1.0);
            }
            if let Some(v) = retrieval.max_results {
                config.retrieval.max_results = v;
            }
            if let Some(v) = retrieval.workers {
                config.retrieval.workers = v.max(1);
            }
            if let Some(v) = retrieval.discovery_ttl_secs {
                config.retrieval.discovery_ttl = Duration::from_secs(v);
            }
            if let Some(v) = retrieval.preview_cache_capacity {
                config.retrieval.preview_cache_capacity = v.max(1);
            }
            if let Some(v) = retrieval.max_seeds {
                config.analysis.max_seeds = v;
            }
            if let Some(v) = retrieval.max_expansion_per_seed {
                config.analysis.max_expansion_per_seed = v;
            }
        }
        if let Some(clarification) = file.clarification {
            if let Some(v) = clarification.max_questions {
                config.clarification.max_questions = v;
            }
            if let Some(v) = clarification.unclear_target_similarity {
                config.clarification.unclear_target_similarity = v.clamp(0.0, 1.0);
            }
            if let Some(v) = clarification.unclear_target_file_count {
                config.clarification.unclear_target_file_count = v;
            }
            if let Some(v) = clarification.broad_query_file_count {
                config.clarification.broad_query_file_count = v;
            }
        }
        if let Some(context) = file.context {
            if let Some(v) = context.max_prompt_chars {
                config.context.max_prompt_chars = v;
            }
            if let Some(v) = context.max_files {
                config.context.max_files = v;
            }
            if let Some(v) = context.max_components {
                config.context.max_components = v;
            }
            if let Some(v) = context.max_relationships {
                config.context.max_relationships = v;
            }
        }
        if let Some(decomposition) = file.decomposition {
            if let Some(v) = decomposition.word_threshold {
                config.decomposition.word_threshold = v;
            }
            if let Some(v) = decomposition.max_search_terms {
                config.decomposition.max_search_terms = v;
            }
            if let Some(v) = decomposition.use_llm {
                config.decomposition.use_llm = v;
            }
            if let Some(v) = decomposition.llm_timeout_ms {
                config.decomposition.llm_timeout_ms = v;
            }
        }
        if let Some(verification) = file.verification {
            config.verification.build_command = verification.build_command;
            config.verification.test_command = verification.test_command;
            if let Some(v) = verification.build_timeout_secs {
                config.verification.build_timeout = Duration::from_secs(v);
            }
            if let Some(v) = verification.test_timeout_secs {
                config.verification.test_timeout = Duration::from_secs(v);
            }
        }
        if let Some(agent) = file.agent {
            config.agent.command = agent.command;
            if let Some(v) = agent.timeout_secs {
                config.agent.timeout = Duration::from_secs(v);
            }
            if let Some(v) = agent.simulate {
                config.agent.simulate = v;
            }
        }
        if let Some(llm) = file.llm {
            config.llm.model = llm.model;
            config.llm.api_key = llm.api_key.map(SecretString::from);
            config.llm.base_url = llm.base_url;
        }
        if let Some(logging) = file.logging {
            config.logging.level = logging.level;
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            config.logging.file = logging.file.map(PathBuf::from);
            if let Some(v) = logging.metrics {
                config.logging.metrics = v;
            }
        }

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the storage mode.
    #[must_use]
    pub const fn with_storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage.mode = mode;
        self
    }

    /// Resolves the `SQLite` graph database path.
    #[must_use]
    pub fn graph_db_path(&self) -> PathBuf {
        self.storage
            .sqlite_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("graph.db"))
    }

    /// Resolves the text index database path.
    #[must_use]
    pub fn text_index_path(&self) -> PathBuf {
        self.data_dir.join("text.db")
    }
}
