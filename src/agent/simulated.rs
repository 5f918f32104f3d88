//! Simulated agent.

use super::CodeAgent;
use crate::Result;
use crate::models::AgentResponse;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns canned responses without running anything.
///
/// Reports no modified files unless configured with
/// [`SimulatedAgent::with_modified_files`].
#[derive(Debug, Default)]
pub struct SimulatedAgent {
    modified_files: Vec<String>,
    calls: AtomicUsize,
}

impl SimulatedAgent {
    /// Creates a simulated agent that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports these files as modified on every call.
    #[must_use]
    pub fn with_modified_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modified_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Number of prompts executed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl CodeAgent for SimulatedAgent {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn execute(&self, prompt: &str) -> Result<AgentResponse> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(call = n, prompt_chars = prompt.len(), "Simulated agent call");
        Ok(AgentResponse {
            response_text: format!(
                "Simulated run {n}: received a prompt of {} characters.",
                prompt.chars().count()
            ),
            modified_files: self.modified_files.clone(),
            summary: "Simulated agent; no changes applied".to_string(),
            simulated: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_response() {
        let agent = SimulatedAgent::new().with_modified_files(["src/a.ts"]);
        let response = agent.execute("hello").unwrap();
        assert!(response.simulated);
        assert_eq!(response.modified_files, vec!["src/a.ts"]);
        assert!(response.response_text.contains("5 characters"));
        assert_eq!(agent.calls(), 1);
    }
}
