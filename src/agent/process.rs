//! External process agent.

// Static regexes are compiled from literals.
#![allow(clippy::expect_used)]

use super::{CodeAgent, NESTED_AGENT_MARKER};
use crate::models::AgentResponse;
use crate::services::process::ShellCommand;
use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Maximum summary length taken from plain-text output.
const SUMMARY_CHARS: usize = 200;

static MODIFIED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*[-*]?\s*(?:modified|created|updated|wrote|edited)(?:\s+file)?:\s*`?([^\s`]+)`?\s*$")
        .expect("static regex: modified file line")
});

/// Structured agent output.
#[derive(Debug, Deserialize)]
struct AgentOutput {
    #[serde(alias = "response", alias = "result", alias = "text", default)]
    response_text: String,
    #[serde(alias = "files_modified", alias = "changed_files", default)]
    modified_files: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Runs an external command per prompt.
///
/// The prompt is written to the command's stdin and the command runs in the
/// project root with [`NESTED_AGENT_MARKER`] set. Output is parsed with
/// [`parse_agent_output`].
#[derive(Debug, Clone)]
pub struct ProcessAgent {
    command: String,
    root: PathBuf,
    timeout: Duration,
}

impl ProcessAgent {
    /// Creates an agent running `command` in `root`.
    #[must_use]
    pub fn new(command: impl Into<String>, root: &Path, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            root: root.to_path_buf(),
            timeout,
        }
    }
}

impl CodeAgent for ProcessAgent {
    fn name(&self) -> &'static str {
        "process"
    }

    #[instrument(
        skip(self, prompt),
        fields(operation = "agent_execute", prompt_chars = prompt.len())
    )]
    fn execute(&self, prompt: &str) -> Result<AgentResponse> {
        let start = Instant::now();
        let report = ShellCommand::new(&self.command, &self.root, self.timeout)
            .with_stdin(prompt)
            .with_env(NESTED_AGENT_MARKER, "1")
            .run()?;
        metrics::histogram!("agent_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);

        if report.timed_out {
            metrics::counter!("agent_executions_total", "outcome" => "timeout").increment(1);
            return Err(Error::Timeout {
                operation: "agent_execute".to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if !report.success {
            metrics::counter!("agent_executions_total", "outcome" => "failure").increment(1);
            let code = report
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(Error::operation(
                "agent_execute",
                format!("exit {code}: {}", report.stderr.trim()),
            ));
        }
        metrics::counter!("agent_executions_total", "outcome" => "success").increment(1);
        Ok(parse_agent_output(&report.stdout))
    }
}

/// Parses agent stdout.
///
/// JSON output with `response_text`/`response`, `modified_files` and
/// `summary` is taken as is. Plain text is kept verbatim, modified files
/// come from lines such as `Modified: src/a.ts`, and the summary is the
/// first non-empty line.
#[must_use]
pub fn parse_agent_output(stdout: &str) -> AgentResponse {
    let trimmed = stdout.trim();
    if trimmed.starts_with('{')
        && let Ok(output) = serde_json::from_str::<AgentOutput>(trimmed)
    {
        let summary = output
            .summary
            .unwrap_or_else(|| first_line(&output.response_text));
        return AgentResponse {
            response_text: output.response_text,
            modified_files: output.modified_files,
            summary,
            simulated: false,
        };
    }

    let mut modified_files: Vec<String> = Vec::new();
    for caps in MODIFIED_LINE.captures_iter(trimmed) {
        let path = caps[1].to_string();
        if !modified_files.contains(&path) {
            modified_files.push(path);
        }
    }
    AgentResponse {
        response_text: trimmed.to_string(),
        modified_files,
        summary: first_line(trimmed),
        simulated: false,
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(SUMMARY_CHARS).collect())
        .unwrap_or_default()
}
