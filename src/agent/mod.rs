//! Code-generation agent adapters.
//!
//! The agent is an external collaborator: it receives the assembled prompt
//! and reports what it changed. Two adapters exist:
//!
//! | Adapter | Use Case |
//! |---------|----------|
//! | [`ProcessAgent`] | Runs an external command with the prompt on stdin |
//! | [`SimulatedAgent`] | Returns canned data; used when no command is configured or when running inside an agent |

mod process;
mod simulated;

pub use process::{ProcessAgent, parse_agent_output};
pub use simulated::SimulatedAgent;

use crate::Result;
use crate::config::AgentConfig;
use crate::models::AgentResponse;
use std::path::Path;
use std::sync::Arc;

/// Environment variable set for agent child processes.
///
/// If it is present when taskscope starts, taskscope is itself being driven
/// by an agent and must not invoke another one.
pub const NESTED_AGENT_MARKER: &str = "TASKSCOPE_AGENT_ACTIVE";

/// Trait for code-generation agents.
pub trait CodeAgent: Send + Sync {
    /// Short adapter name for logs.
    fn name(&self) -> &'static str;

    /// Executes a prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent cannot run, exits unsuccessfully or
    /// exceeds its time budget.
    fn execute(&self, prompt: &str) -> Result<AgentResponse>;
}

/// Returns true if the nested-agent marker is set.
#[must_use]
pub fn is_nested() -> bool {
    std::env::var_os(NESTED_AGENT_MARKER).is_some_and(|v| !v.is_empty())
}

/// Selects the agent adapter for a project.
///
/// The simulated agent is used when forced by configuration, when no
/// command is configured, or when running nested inside another agent.
#[must_use]
pub fn select_agent(config: &AgentConfig, root: &Path) -> Arc<dyn CodeAgent> {
    select_agent_with(config, root, is_nested())
}

fn select_agent_with(config: &AgentConfig, root: &Path, nested: bool) -> Arc<dyn CodeAgent> {
    match &config.command {
        Some(command) if !config.simulate && !nested => {
            tracing::debug!(command = %command, "Using external agent");
            Arc::new(ProcessAgent::new(command.clone(), root, config.timeout))
        },
        _ => {
            let reason = if nested {
                "nested agent detected"
            } else if config.simulate {
                "simulation forced"
            } else {
                "no agent command configured"
            };
            tracing::info!(reason, "Using simulated agent");
            Arc::new(SimulatedAgent::new())
        },
    }
}
