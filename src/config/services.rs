//! Per-service settings.
//!
//! Each struct carries the tuned defaults, `with_*` builders and
//! `with_env_overrides` for its `TASKSCOPE_*` variables. The thresholds are
//! empirical and kept as named, overridable values.

use crate::storage::StorageMode;
use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default relevance cutoff; files must score strictly above it.
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.3;
/// Default number of retrieved files.
pub const DEFAULT_MAX_RESULTS: usize = 10;
/// Similarity above which a retrieved file counts as a strong candidate.
pub const DEFAULT_UNCLEAR_TARGET_SIMILARITY: f32 = 0.7;
/// Strong candidates needed (exclusive) before the target is unclear.
pub const DEFAULT_UNCLEAR_TARGET_FILE_COUNT: usize = 3;
/// Matched files needed (exclusive) before a broad query is flagged.
pub const DEFAULT_BROAD_QUERY_FILE_COUNT: usize = 10;
/// Word count beyond which a query is complex.
pub const DEFAULT_WORD_THRESHOLD: usize = 30;

/// Reads and parses an environment variable, ignoring unset or malformed values.
pub(crate) fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(variable = name, value = %raw, "Ignoring malformed environment override");
    }
    parsed
}

/// Reads a boolean environment variable (`1`/`true`/`yes`/`on`).
pub(crate) fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Task decomposition settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecompositionConfig {
    /// Queries with more words than this are complex.
    pub word_threshold: usize,
    /// Maximum search terms per sub-task.
    pub max_search_terms: usize,
    /// Whether to consult the LLM intent classifier.
    pub use_llm: bool,
    /// LLM classification budget in milliseconds.
    pub llm_timeout_ms: u64,
    /// Minimum LLM confidence to trust its label over keywords.
    pub min_llm_confidence: f32,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            word_threshold: DEFAULT_WORD_THRESHOLD,
            max_search_terms: 8,
            use_llm: false,
            llm_timeout_ms: 2_000,
            min_llm_confidence: 0.5,
        }
    }
}

impl DecompositionConfig {
    /// Loads defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `TASKSCOPE_WORD_THRESHOLD`, `TASKSCOPE_INTENT_USE_LLM` and
    /// `TASKSCOPE_INTENT_LLM_TIMEOUT_MS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("TASKSCOPE_WORD_THRESHOLD") {
            self.word_threshold = v;
        }
        if let Some(v) = env_flag("TASKSCOPE_INTENT_USE_LLM") {
            self.use_llm = v;
        }
        if let Some(v) = env_parse("TASKSCOPE_INTENT_LLM_TIMEOUT_MS") {
            self.llm_timeout_ms = v;
        }
        self
    }

    /// Sets the word threshold.
    #[must_use]
    pub const fn with_word_threshold(mut self, word_threshold: usize) -> Self {
        self.word_threshold = word_threshold;
        self
    }
}

/// File retrieval settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    /// Files must score strictly above this.
    pub relevance_threshold: f32,
    /// Maximum files returned.
    pub max_results: usize,
    /// Worker threads for scoring and preview reads.
    pub workers: usize,
    /// Discovery cache TTL.
    pub discovery_ttl: Duration,
    /// Lines kept per preview.
    pub preview_lines: usize,
    /// Preview cache size before eviction kicks in.
    pub preview_cache_capacity: usize,
    /// Files larger than this are skipped for previews.
    pub max_file_bytes: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            workers: 8,
            discovery_ttl: Duration::from_secs(300),
            preview_lines: 50,
            preview_cache_capacity: 100,
            max_file_bytes: 1024 * 1024,
        }
    }
}

impl RetrievalConfig {
    /// Loads defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `TASKSCOPE_RELEVANCE_THRESHOLD`, `TASKSCOPE_MAX_RESULTS`,
    /// `TASKSCOPE_RETRIEVAL_WORKERS` and `TASKSCOPE_DISCOVERY_TTL_SECS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<f32>("TASKSCOPE_RELEVANCE_THRESHOLD") {
            self.relevance_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_parse("TASKSCOPE_MAX_RESULTS") {
            self.max_results = v;
        }
        if let Some(v) = env_parse::<usize>("TASKSCOPE_RETRIEVAL_WORKERS") {
            self.workers = v.max(1);
        }
        if let Some(v) = env_parse("TASKSCOPE_DISCOVERY_TTL_SECS") {
            self.discovery_ttl = Duration::from_secs(v);
        }
        self
    }

    /// Sets the relevance threshold.
    #[must_use]
    pub const fn with_relevance_threshold(mut self, threshold: f32) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    /// Sets the result cap.
    #[must_use]
    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the discovery cache TTL.
    #[must_use]
    pub const fn with_discovery_ttl(mut self, ttl: Duration) -> Self {
        self.discovery_ttl = ttl;
        self
    }
}

/// Seed + Expand settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Seed cap.
    pub max_seeds: usize,
    /// One-hop neighbours admitted per seed.
    pub max_expansion_per_seed: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_seeds: 50,
            max_expansion_per_seed: 3,
        }
    }
}

impl AnalysisConfig {
    /// Applies `TASKSCOPE_MAX_SEEDS` and `TASKSCOPE_MAX_EXPANSION_PER_SEED`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("TASKSCOPE_MAX_SEEDS") {
            self.max_seeds = v;
        }
        if let Some(v) = env_parse("TASKSCOPE_MAX_EXPANSION_PER_SEED") {
            self.max_expansion_per_seed = v;
        }
        self
    }
}

/// Ambiguity detection settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClarificationConfig {
    /// Questions asked at most.
    pub max_questions: usize,
    /// Similarity above which a file is a strong candidate.
    pub unclear_target_similarity: f32,
    /// Strong candidates needed (exclusive) before the target is unclear.
    pub unclear_target_file_count: usize,
    /// Matched files needed (exclusive) before a broad query is flagged.
    pub broad_query_file_count: usize,
}

impl Default for ClarificationConfig {
    fn default() -> Self {
        Self {
            max_questions: 3,
            unclear_target_similarity: DEFAULT_UNCLEAR_TARGET_SIMILARITY,
            unclear_target_file_count: DEFAULT_UNCLEAR_TARGET_FILE_COUNT,
            broad_query_file_count: DEFAULT_BROAD_QUERY_FILE_COUNT,
        }
    }
}

impl ClarificationConfig {
    /// Loads defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `TASKSCOPE_MAX_QUESTIONS`, `TASKSCOPE_UNCLEAR_TARGET_SIMILARITY`
    /// and `TASKSCOPE_BROAD_QUERY_FILE_COUNT`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("TASKSCOPE_MAX_QUESTIONS") {
            self.max_questions = v;
        }
        if let Some(v) = env_parse::<f32>("TASKSCOPE_UNCLEAR_TARGET_SIMILARITY") {
            self.unclear_target_similarity = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_parse("TASKSCOPE_BROAD_QUERY_FILE_COUNT") {
            self.broad_query_file_count = v;
        }
        self
    }

    /// Sets the question cap.
    #[must_use]
    pub const fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions;
        self
    }
}

/// Prompt assembly limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Files rendered in the prompt.
    pub max_files: usize,
    /// Components rendered in the prompt.
    pub max_components: usize,
    /// Relationships rendered in the prompt.
    pub max_relationships: usize,
    /// Preview lines per file.
    pub preview_lines: usize,
    /// Hard cap on prompt size in characters.
    pub max_prompt_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_components: 8,
            max_relationships: 8,
            preview_lines: 50,
            max_prompt_chars: 24_000,
        }
    }
}

impl ContextConfig {
    /// Applies `TASKSCOPE_MAX_PROMPT_CHARS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("TASKSCOPE_MAX_PROMPT_CHARS") {
            self.max_prompt_chars = v;
        }
        self
    }

    /// Sets the prompt size cap.
    #[must_use]
    pub const fn with_max_prompt_chars(mut self, max_prompt_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self
    }
}

/// Build/test verification settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationConfig {
    /// Build command override (shell words).
    pub build_command: Option<String>,
    /// Test command override (shell words).
    pub test_command: Option<String>,
    /// Build budget.
    pub build_timeout: Duration,
    /// Test budget.
    pub test_timeout: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            build_command: None,
            test_command: None,
            build_timeout: Duration::from_secs(120),
            test_timeout: Duration::from_secs(180),
        }
    }
}

impl VerificationConfig {
    /// Applies `TASKSCOPE_BUILD_COMMAND`, `TASKSCOPE_TEST_COMMAND`,
    /// `TASKSCOPE_BUILD_TIMEOUT_SECS` and `TASKSCOPE_TEST_TIMEOUT_SECS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TASKSCOPE_BUILD_COMMAND")
            && !v.trim().is_empty()
        {
            self.build_command = Some(v);
        }
        if let Ok(v) = std::env::var("TASKSCOPE_TEST_COMMAND")
            && !v.trim().is_empty()
        {
            self.test_command = Some(v);
        }
        if let Some(v) = env_parse("TASKSCOPE_BUILD_TIMEOUT_SECS") {
            self.build_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse("TASKSCOPE_TEST_TIMEOUT_SECS") {
            self.test_timeout = Duration::from_secs(v);
        }
        self
    }
}

/// Code agent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// External agent command (shell words). `None` selects the simulated agent.
    pub command: Option<String>,
    /// Agent budget per prompt.
    pub timeout: Duration,
    /// Forces the simulated agent.
    pub simulate: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout: Duration::from_secs(600),
            simulate: false,
        }
    }
}

impl AgentConfig {
    /// Applies `TASKSCOPE_AGENT_COMMAND`, `TASKSCOPE_AGENT_TIMEOUT_SECS` and
    /// `TASKSCOPE_SIMULATE_AGENT`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TASKSCOPE_AGENT_COMMAND")
            && !v.trim().is_empty()
        {
            self.command = Some(v);
        }
        if let Some(v) = env_parse("TASKSCOPE_AGENT_TIMEOUT_SECS") {
            self.timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_flag("TASKSCOPE_SIMULATE_AGENT") {
            self.simulate = v;
        }
        self
    }
}

/// Graph storage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backend.
    pub mode: StorageMode,
    /// `SQLite` database path; defaults to `<data_dir>/graph.db`.
    pub sqlite_path: Option<PathBuf>,
    /// `FalkorDB` connection URL.
    pub falkor_url: String,
    /// `FalkorDB` graph key.
    pub falkor_graph: String,
    /// `FalkorDB` response timeout in milliseconds.
    pub falkor_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            sqlite_path: None,
            falkor_url: "redis://127.0.0.1:6379".to_string(),
            falkor_graph: "taskscope".to_string(),
            falkor_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    /// Applies `TASKSCOPE_STORAGE_MODE`, `TASKSCOPE_GRAPH_DB_PATH`,
    /// `TASKSCOPE_FALKOR_URL` and `TASKSCOPE_FALKOR_GRAPH`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TASKSCOPE_STORAGE_MODE") {
            match StorageMode::parse(&v) {
                Some(mode) => self.mode = mode,
                None => {
                    tracing::warn!(value = %v, "Unknown storage mode, keeping {}", self.mode.as_str());
                },
            }
        }
        if let Ok(v) = std::env::var("TASKSCOPE_GRAPH_DB_PATH") {
            self.sqlite_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("TASKSCOPE_FALKOR_URL") {
            self.falkor_url = v;
        }
        if let Ok(v) = std::env::var("TASKSCOPE_FALKOR_GRAPH") {
            self.falkor_graph = v;
        }
        self
    }
}

/// LLM settings for intent classification.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<SecretString>,
    /// Base URL override.
    pub base_url: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive (e.g. `info`, `taskscope=debug`).
    pub level: Option<String>,
    /// Output format.
    pub format: LogFormat,
    /// Log file instead of stderr.
    pub file: Option<PathBuf>,
    /// Install the Prometheus recorder.
    pub metrics: bool,
}

impl LoggingConfig {
    /// Applies `TASKSCOPE_LOG_FORMAT`, `TASKSCOPE_LOG_FILE` and `TASKSCOPE_METRICS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TASKSCOPE_LOG_FORMAT") {
            self.format = LogFormat::parse(&v);
        }
        if let Ok(v) = std::env::var("TASKSCOPE_LOG_FILE") {
            self.file = Some(PathBuf::from(v));
        }
        if let Some(v) = env_flag("TASKSCOPE_METRICS") {
            self.metrics = v;
        }
        self
    }
}
