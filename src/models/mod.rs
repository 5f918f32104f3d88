//! Data models for taskscope.
//!
//! This module contains the core data structures passed between the
//! decomposer, retriever, analyzer, clarification engine and orchestrator.
//! Everything here except the graph types is created fresh per run.

mod clarification;
mod context;
pub mod graph;
mod retrieval;
mod task;
mod workflow;

pub use clarification::{
    Ambiguity, AmbiguityKind, Clarification, ClarificationOutcome, ClarificationQuestion, Impact,
};
pub use context::{
    ArchitecturalInsights, ClassInfo, EXPANDED_CONFIDENCE, EnhancedContext, GraphContext,
    Relationship, SEED_CONFIDENCE,
};
pub use graph::{
    Direction, EdgeType, GraphEdge, GraphNode, NodeId, NodeType, ProjectId, ProjectRecord,
    normalize_path, path_suffix_match,
};
pub use retrieval::{FileKind, RetrievedFile};
pub use task::{
    Complexity, ContextFilter, Decomposition, ExecutionPhase, ExecutionPlan, SubTask, TaskId,
    TaskType,
};
pub use workflow::{
    AgentResponse, CommandReport, RunStatus, SyncReport, TaskOutcome, TaskResult,
    VerificationReport, WorkflowResult, WorkflowState,
};
