//! Human-readable rendering for CLI commands.
//!
//! Every command also supports `--format json`, which serializes the
//! underlying model with `serde_json` instead.

use crate::config::{LogFormat, TaskscopeConfig};
use crate::models::{
    CommandReport, Decomposition, EnhancedContext, RetrievedFile, SyncReport, TaskOutcome,
    WorkflowResult,
};
use crate::{Error, Result};
use serde::Serialize;
use std::fmt::Write as _;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain text (default).
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses output format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Serializes a value as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::operation("serialize_output", e))
}

/// Renders a ranked file list.
#[must_use]
pub fn render_files(files: &[RetrievedFile]) -> String {
    if files.is_empty() {
        return "No relevant files found.\n".to_string();
    }
    let mut out = format!("Found {} files:\n", files.len());
    for file in files {
        let _ = writeln!(
            out,
            "  [{:.2}] {} ({})",
            file.similarity,
            file.location(),
            file.kind.as_str()
        );
    }
    out
}

/// Renders a decomposition as a phased plan.
#[must_use]
pub fn render_plan(decomposition: &Decomposition) -> String {
    let mut out = format!(
        "{} query, {} task(s) in {} phase(s)\n",
        if decomposition.is_complex { "Complex" } else { "Simple" },
        decomposition.tasks.len(),
        decomposition.plan.phases.len()
    );
    if decomposition.plan.cycle_detected {
        out.push_str("Warning: dependency cycle detected, remaining tasks flushed into one phase\n");
    }
    for phase in &decomposition.plan.phases {
        let _ = writeln!(out, "Phase {}:", phase.index + 1);
        for id in &phase.task_ids {
            let Some(task) = decomposition.task(id) else {
                continue;
            };
            let _ = write!(
                out,
                "  {} [{}] {} (priority {}, {})",
                task.id,
                task.task_type.as_str(),
                task.description,
                task.priority,
                task.complexity.as_str()
            );
            if !task.dependencies.is_empty() {
                let deps: Vec<&str> = task.dependencies.iter().map(|d| d.as_str()).collect();
                let _ = write!(out, " after {}", deps.join(", "));
            }
            out.push('\n');
        }
    }
    out
}

/// Renders an assembled context: the prompt followed by a short footer.
#[must_use]
pub fn render_context(context: &EnhancedContext) -> String {
    let mut out = context.prompt.clone();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "\n-- intent: {}, files: {}, classes: {}, relationships: {}{}",
        context.intent.as_str(),
        context.files.len(),
        context.classes.len(),
        context.relationships.len(),
        if context.truncated { ", truncated" } else { "" }
    );
    out
}

/// Renders an index sync report.
#[must_use]
pub fn render_sync(report: &SyncReport) -> String {
    format!(
        "Index updated: {} file(s), {} node(s), {} cache entr{} invalidated\n",
        report.records_updated,
        report.nodes_created,
        report.cache_entries_updated,
        if report.cache_entries_updated == 1 { "y" } else { "ies" }
    )
}

fn render_command(out: &mut String, label: &str, report: &CommandReport) {
    let outcome = if report.timed_out {
        "timed out"
    } else if report.success {
        "passed"
    } else {
        "failed"
    };
    let _ = writeln!(
        out,
        "  {label}: {outcome} ({}, {} ms)",
        report.command, report.duration_ms
    );
    if !report.success {
        let lines: Vec<&str> = report.stderr.trim().lines().collect();
        for line in &lines[lines.len().saturating_sub(5)..] {
            let _ = writeln!(out, "    {line}");
        }
    }
}

/// Renders the result of a workflow run.
#[must_use]
pub fn render_result(result: &WorkflowResult) -> String {
    let mut out = format!(
        "Status: {} ({} path, {} ms)\n",
        result.status.as_str(),
        if result.is_complex { "complex" } else { "simple" },
        result.duration_ms
    );

    for task in &result.task_results {
        let _ = write!(out, "  {} [{}] ", task.task_id, task.task_type.as_str());
        match &task.outcome {
            TaskOutcome::Completed { response } => {
                let _ = write!(out, "completed");
                if response.simulated {
                    out.push_str(" (simulated)");
                }
                if !response.summary.is_empty() {
                    let _ = write!(out, ": {}", response.summary);
                }
            },
            TaskOutcome::Failed { error } => {
                let _ = write!(out, "failed: {error}");
            },
            TaskOutcome::Skipped { reason } => {
                let _ = write!(out, "skipped: {reason}");
            },
        }
        out.push('\n');
    }

    if !result.clarifications.is_empty() {
        out.push_str("Clarifications:\n");
        for c in &result.clarifications {
            let _ = writeln!(out, "  {} -> {}", c.question, c.answer);
        }
    }

    let _ = writeln!(
        out,
        "Files: {}, classes: {}, relationships: {}",
        result.files.len(),
        result.classes.len(),
        result.relationships.len()
    );
    if !result.modified_files.is_empty() {
        out.push_str("Modified:\n");
        for path in &result.modified_files {
            let _ = writeln!(out, "  {path}");
        }
    }

    if let Some(verification) = &result.verification {
        out.push_str("Verification:\n");
        if let Some(build) = &verification.build {
            render_command(&mut out, "build", build);
        }
        if let Some(tests) = &verification.tests {
            render_command(&mut out, "tests", tests);
        }
    }
    if let Some(e) = &result.verification_error {
        let _ = writeln!(out, "Verification skipped: {e}");
    }
    if let Some(sync) = &result.sync {
        out.push_str(&render_sync(sync));
    }
    if let Some(e) = &result.sync_error {
        let _ = writeln!(out, "Index sync failed: {e}");
    }
    if let Some(e) = &result.error {
        let _ = writeln!(out, "Error: {e}");
    }
    out
}

/// Renders the effective configuration as TOML-like text.
///
/// The API key is never printed.
#[must_use]
pub fn render_config(config: &TaskscopeConfig) -> String {
    let mut out = String::new();
    match &config.source {
        Some(path) => {
            let _ = writeln!(out, "# loaded from {}", path.display());
        },
        None => out.push_str("# built-in defaults\n"),
    }
    let _ = writeln!(out, "data_dir = {:?}\n", config.data_dir.display().to_string());

    let s = &config.storage;
    let _ = writeln!(out, "[storage]\nmode = \"{}\"", s.mode.as_str());
    let _ = writeln!(out, "falkor_url = {:?}", s.falkor_url);
    let _ = writeln!(out, "falkor_graph = {:?}\n", s.falkor_graph);

    let r = &config.retrieval;
    let _ = writeln!(out, "[retrieval]\nrelevance_threshold = {}", r.relevance_threshold);
    let _ = writeln!(out, "max_results = {}", r.max_results);
    let _ = writeln!(out, "workers = {}", r.workers);
    let _ = writeln!(out, "discovery_ttl_secs = {}\n", r.discovery_ttl.as_secs());

    let c = &config.clarification;
    let _ = writeln!(out, "[clarification]\nmax_questions = {}", c.max_questions);
    let _ = writeln!(out, "unclear_target_similarity = {}", c.unclear_target_similarity);
    let _ = writeln!(out, "broad_query_file_count = {}\n", c.broad_query_file_count);

    let x = &config.context;
    let _ = writeln!(out, "[context]\nmax_files = {}", x.max_files);
    let _ = writeln!(out, "max_prompt_chars = {}\n", x.max_prompt_chars);

    let d = &config.decomposition;
    let _ = writeln!(out, "[decomposition]\nword_threshold = {}", d.word_threshold);
    let _ = writeln!(out, "use_llm = {}\n", d.use_llm);

    let v = &config.verification;
    let _ = writeln!(out, "[verification]\nbuild_timeout_secs = {}", v.build_timeout.as_secs());
    let _ = writeln!(out, "test_timeout_secs = {}\n", v.test_timeout.as_secs());

    let a = &config.agent;
    let _ = writeln!(
        out,
        "[agent]\ncommand = {:?}",
        a.command.as_deref().unwrap_or("")
    );
    let _ = writeln!(out, "simulate = {}\n", a.simulate);

    let _ = writeln!(
        out,
        "[llm]\napi_key = \"{}\"\n",
        if config.llm.api_key.is_some() { "<set>" } else { "<unset>" }
    );

    let l = &config.logging;
    let _ = writeln!(
        out,
        "[logging]\nformat = \"{}\"",
        match l.format {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    );
    let _ = writeln!(out, "metrics = {}", l.metrics);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AgentResponse, FileKind, RunStatus, TaskId, TaskResult, TaskType, VerificationReport,
    };
    use secrecy::SecretString;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("other"), OutputFormat::Text);
    }

    #[test]
    fn test_render_files() {
        assert_eq!(render_files(&[]), "No relevant files found.\n");
        let files = vec![RetrievedFile::new("src/auth/login.ts", FileKind::Source, 0.82)];
        let out = render_files(&files);
        assert!(out.starts_with("Found 1 files:"));
        assert!(out.contains("[0.82] src/auth/login.ts (source)"));
    }

    #[test]
    fn test_render_result_lists_outcomes() {
        let mut result = WorkflowResult::new("fix login");
        result.status = RunStatus::PartiallyCompleted;
        result.task_results = vec![
            TaskResult {
                task_id: TaskId::sequential(1),
                task_type: TaskType::Fix,
                files: Vec::new(),
                outcome: TaskOutcome::Completed {
                    response: AgentResponse {
                        summary: "patched".to_string(),
                        simulated: true,
                        ..AgentResponse::default()
                    },
                },
                prompt_chars: 10,
            },
            TaskResult {
                task_id: TaskId::sequential(2),
                task_type: TaskType::Test,
                files: Vec::new(),
                outcome: TaskOutcome::Failed {
                    error: "exit 1: boom".to_string(),
                },
                prompt_chars: 10,
            },
        ];
        result.verification = Some(VerificationReport::default());
        result.sync = Some(SyncReport {
            records_updated: 1,
            nodes_created: 3,
            cache_entries_updated: 1,
        });

        let out = render_result(&result);
        assert!(out.starts_with("Status: partially_completed"));
        assert!(out.contains("completed (simulated): patched"));
        assert!(out.contains("failed: exit 1: boom"));
        assert!(out.contains("1 cache entry invalidated"));
    }

    #[test]
    fn test_render_config_hides_api_key() {
        let mut config = TaskscopeConfig::default();
        config.llm.api_key = Some(SecretString::from("sk-secret".to_string()));
        let out = render_config(&config);
        assert!(out.contains("api_key = \"<set>\""));
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("[retrieval]"));
    }

    #[test]
    fn test_to_json() {
        let json = to_json(&SyncReport::default()).unwrap();
        assert!(json.contains("\"records_updated\": 0"));
    }
}
