//! # Taskscope
//!
//! Query understanding and context retrieval for code-generation agents.
//!
//! Taskscope turns a free-text request ("add auth middleware", "fix the login
//! bug") into one precisely-scoped prompt per sub-task. It decides what the
//! agent should see and in what order work should happen:
//!
//! - Task decomposition into ordered, dependency-aware phases
//! - Relevance-scored file retrieval with cached discovery
//! - Seed + Expand relationship analysis over a persisted code graph
//! - Ambiguity detection with optional clarifying questions
//! - Deterministic, size-bounded context assembly
//! - A workflow state machine that runs the agent, verifies and re-indexes
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskscope::services::{WorkflowOrchestrator, RunOptions};
//! use taskscope::storage::graph::SqliteGraphStore;
//!
//! let store = Arc::new(SqliteGraphStore::new(".taskscope/graph.db")?);
//! let orchestrator = WorkflowOrchestrator::builder(".", store).build();
//! let result = orchestrator.run("refactor the AuthService and then add unit tests", &RunOptions::transparent());
//! assert!(result.is_complex);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod agent;
pub mod cli;
pub mod config;
pub mod intent;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::TaskscopeConfig;
pub use models::{
    Decomposition, EnhancedContext, ExecutionPlan, GraphContext, GraphEdge, GraphNode,
    RetrievedFile, SubTask, TaskType,
};
pub use services::{
    ClarificationEngine, ContextAssembler, FileRetriever, RelationshipAnalyzer, RunOptions,
    TaskDecomposer, WorkflowOrchestrator,
};
pub use storage::CodeGraphStore;

/// Error type for taskscope operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed config values, edges pointing at unknown nodes |
/// | `OperationFailed` | I/O errors, SQL failures, agent process failures |
/// | `BackendUnavailable` | Graph or text backend cannot be reached |
/// | `Timeout` | External process or LLM call exceeded its budget |
/// | `FeatureNotEnabled` | Selecting a backend compiled out by feature flags |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail
    /// - Filesystem reads fail
    /// - The agent process exits unsuccessfully
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A storage backend could not be reached.
    #[error("backend '{backend}' unavailable: {cause}")]
    BackendUnavailable {
        /// Backend name.
        backend: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation exceeded its time budget.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The budget in milliseconds.
        timeout_ms: u64,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Shorthand for [`Error::OperationFailed`].
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for taskscope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
