//! Workflow run types.

use super::clarification::Clarification;
use super::context::{ClassInfo, Relationship};
use super::retrieval::RetrievedFile;
use super::task::{Decomposition, TaskId, TaskType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the workflow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Splitting the query into sub-tasks.
    Decompose,
    /// Showing the plan or files and waiting for confirmation.
    PreviewAndConfirm,
    /// Single-task execution.
    SimplePath,
    /// Phased multi-task execution.
    ComplexPath,
    /// Running build and tests.
    BuildTestVerify,
    /// Updating the code graph.
    IndexSync,
    /// Terminal success state.
    Done,
    /// Terminal failure state.
    Error,
}

impl WorkflowState {
    /// Returns the state as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Decompose => "decompose",
            Self::PreviewAndConfirm => "preview_and_confirm",
            Self::SimplePath => "simple_path",
            Self::ComplexPath => "complex_path",
            Self::BuildTestVerify => "build_test_verify",
            Self::IndexSync => "index_sync",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every task completed.
    Completed,
    /// Some tasks failed or were skipped.
    PartiallyCompleted,
    /// The user declined or the run was interrupted.
    Cancelled,
    /// Nothing completed.
    Failed,
}

impl RunStatus {
    /// Returns true for `Completed`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// Response from the code-generation agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Raw response text.
    pub response_text: String,
    /// Files the agent changed.
    pub modified_files: Vec<String>,
    /// Short summary.
    pub summary: String,
    /// True when produced without invoking a real agent.
    pub simulated: bool,
}

/// Outcome of one sub-task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The agent ran.
    Completed {
        /// Agent response.
        response: AgentResponse,
    },
    /// The agent failed.
    Failed {
        /// Raw error message.
        error: String,
    },
    /// Not attempted.
    Skipped {
        /// Why.
        reason: String,
    },
}

impl TaskOutcome {
    /// Returns true for `Completed`.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Per-task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task ID.
    pub task_id: TaskId,
    /// Task type.
    pub task_type: TaskType,
    /// Files retrieved for this task.
    pub files: Vec<RetrievedFile>,
    /// Outcome.
    pub outcome: TaskOutcome,
    /// Prompt length in characters.
    pub prompt_chars: usize,
}

/// Result of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReport {
    /// Command line.
    pub command: String,
    /// Exit status zero and no timeout.
    pub success: bool,
    /// Exit code, if the process exited.
    pub exit_code: Option<i32>,
    /// Captured stdout (tail).
    pub stdout: String,
    /// Captured stderr (tail).
    pub stderr: String,
    /// Wall time.
    pub duration_ms: u64,
    /// Whether the timeout elapsed.
    pub timed_out: bool,
}

/// Build and test verification result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Build step, when a build command was known.
    pub build: Option<CommandReport>,
    /// Test step, when a test command was known.
    pub tests: Option<CommandReport>,
}

impl VerificationReport {
    /// True if every step that ran succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.build.as_ref().is_none_or(|r| r.success)
            && self.tests.as_ref().is_none_or(|r| r.success)
    }
}

/// Index synchronization result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Files re-indexed.
    pub records_updated: usize,
    /// Nodes written.
    pub nodes_created: usize,
    /// Cache entries invalidated.
    pub cache_entries_updated: usize,
}

/// Complete result of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Query as given.
    pub query: String,
    /// Overall status.
    pub status: RunStatus,
    /// Whether the complex path ran.
    pub is_complex: bool,
    /// Visited states in order.
    pub states: Vec<WorkflowState>,
    /// Decomposition, when it ran.
    pub decomposition: Option<Decomposition>,
    /// Per-task results.
    pub task_results: Vec<TaskResult>,
    /// Deduplicated files.
    pub files: Vec<RetrievedFile>,
    /// Deduplicated classes.
    pub classes: Vec<ClassInfo>,
    /// Deduplicated relationships.
    pub relationships: Vec<Relationship>,
    /// Union of modified files.
    pub modified_files: Vec<String>,
    /// Collected clarifications.
    pub clarifications: Vec<Clarification>,
    /// Verification, when it ran.
    pub verification: Option<VerificationReport>,
    /// Verification error, when it could not run.
    pub verification_error: Option<String>,
    /// Index sync, when it ran.
    pub sync: Option<SyncReport>,
    /// Index sync error.
    pub sync_error: Option<String>,
    /// Fatal error message.
    pub error: Option<String>,
    /// Wall time.
    pub duration_ms: u64,
}

impl WorkflowResult {
    /// Creates an empty result for a query.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            status: RunStatus::Completed,
            is_complex: false,
            states: Vec::new(),
            decomposition: None,
            task_results: Vec::new(),
            files: Vec::new(),
            classes: Vec::new(),
            relationships: Vec::new(),
            modified_files: Vec::new(),
            clarifications: Vec::new(),
            verification: None,
            verification_error: None,
            sync: None,
            sync_error: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Records a state transition.
    pub fn enter(&mut self, state: WorkflowState) {
        tracing::debug!(state = %state, "Workflow state");
        self.states.push(state);
    }

    /// Returns the last visited state.
    #[must_use]
    pub fn final_state(&self) -> Option<WorkflowState> {
        self.states.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(success: bool) -> CommandReport {
        CommandReport {
            command: "cargo build".to_string(),
            success,
            exit_code: Some(i32::from(!success)),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
            timed_out: false,
        }
    }

    #[test]
    fn test_verification_success() {
        assert!(VerificationReport::default().success());
        let failing = VerificationReport {
            build: Some(report(true)),
            tests: Some(report(false)),
        };
        assert!(!failing.success());
    }

    #[test]
    fn test_enter_records_states() {
        let mut result = WorkflowResult::new("q");
        result.enter(WorkflowState::Decompose);
        result.enter(WorkflowState::Done);
        assert_eq!(result.final_state(), Some(WorkflowState::Done));
        assert_eq!(result.states.len(), 2);
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_string(&TaskOutcome::Failed {
            error: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"failed","error":"boom"}"#);
    }
}
