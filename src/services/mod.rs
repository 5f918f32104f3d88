//! Business logic services.
//!
//! Services implement the pipeline on top of the storage backends:
//!
//! | Service | Role |
//! |---------|------|
//! | [`TaskDecomposer`] | Query → ordered sub-tasks and phases |
//! | [`FileRetriever`] | Relevance-scored file retrieval |
//! | [`RelationshipAnalyzer`] | Seed + Expand over the code graph |
//! | [`ClarificationEngine`] | Ambiguity detection and questions |
//! | [`ContextAssembler`] | Size-bounded prompt per task |
//! | [`WorkflowOrchestrator`] | The state machine tying them together |

pub mod aggregation;
mod backend_factory;
pub mod clarification;
pub mod context_assembler;
pub mod decomposer;
pub mod graph_analysis;
pub mod index_sync;
mod orchestrator;
pub(crate) mod process;
pub mod relevance;
pub mod retrieval;
pub mod retrieval_cache;
pub mod task_patterns;
pub mod verification;

pub use backend_factory::{BackendFactory, BackendSet};
pub use clarification::ClarificationEngine;
pub use context_assembler::ContextAssembler;
pub use decomposer::TaskDecomposer;
pub use graph_analysis::RelationshipAnalyzer;
pub use index_sync::{GraphIndexSync, IndexSync};
pub use orchestrator::{
    CancellationToken, RunOptions, WorkflowOrchestrator, WorkflowOrchestratorBuilder,
};
pub use retrieval::FileRetriever;
pub use retrieval_cache::RetrievalCache;
pub use verification::{CommandVerifier, Verifier};
