//! Prompt assembly.
//!
//! Renders an [`EnhancedContext`] into a structured prompt. Sections are
//! always emitted in the same order, empty ones included:
//!
//! 1. Pre-search summary
//! 2. Role
//! 3. Task, clarifications and assumptions
//! 4. Pre-discovered files (top 5, previews of at most 50 lines)
//! 5. Components (top 8)
//! 6. Relationships (top 8)
//! 7. Packages
//! 8. Expected response format
//! 9. Quality, execution and constraints
//!
//! The same input always yields the same prompt. Prompts longer than
//! `max_prompt_chars` are cut and end with [`TRUNCATION_MARKER`].

use crate::config::ContextConfig;
use crate::models::{
    Clarification, EnhancedContext, GraphContext, RetrievedFile, TaskType,
};
use crate::services::clarification::CLARIFICATIONS_HEADING;
use std::fmt::Write as _;
use tracing::instrument;

/// Appended to a prompt that was cut to size.
pub const TRUNCATION_MARKER: &str = "\n\n[... context truncated to fit the prompt budget ...]\n";

const NONE_FOUND: &str = "_None found._\n";

/// Returns the role statement for a task type.
#[must_use]
pub const fn role_for(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Analyze => {
            "You are a senior engineer analyzing an existing codebase. Explain structure and \
             behavior precisely and do not modify files."
        },
        TaskType::Create => {
            "You are a senior engineer adding new functionality that fits the existing \
             architecture and conventions."
        },
        TaskType::Modify => {
            "You are a senior engineer changing existing behavior with minimal, well-scoped edits."
        },
        TaskType::Refactor => {
            "You are a senior engineer restructuring code without changing its observable behavior."
        },
        TaskType::Test => {
            "You are a senior test engineer writing focused, deterministic tests in the \
             project's existing style."
        },
        TaskType::Fix => "You are a senior engineer diagnosing a defect and fixing its root cause.",
        TaskType::Document => {
            "You are a technical writer documenting code accurately for its maintainers."
        },
        TaskType::Configure => {
            "You are a build engineer making precise, reversible configuration changes."
        },
        TaskType::General => "You are a senior software engineer working in this codebase.",
    }
}

/// Returns the expected response format for a task type.
#[must_use]
pub const fn response_format_for(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Analyze => {
            "- Summary of findings\n- Relevant files with `path:line` references\n\
             - Open questions or risks\n"
        },
        TaskType::Create | TaskType::Modify | TaskType::Configure => {
            "- List of files changed or created\n- The change for each file\n\
             - How the change was verified\n"
        },
        TaskType::Refactor => {
            "- Refactoring plan\n- Files changed, with the behavior-preserving rationale\n\
             - Tests run before and after\n"
        },
        TaskType::Test => {
            "- Test files created or changed\n- What each test covers\n- Test command and result\n"
        },
        TaskType::Fix => {
            "- Root cause\n- The fix, per file\n- Regression test or reproduction steps\n"
        },
        TaskType::Document => "- Documents changed or created\n- Summary of each change\n",
        TaskType::General => "- Summary of what was done\n- Files touched\n",
    }
}

const QUALITY_SECTION: &str = "\
# Quality Standards
- Follow the conventions of the surrounding code.
- Keep changes minimal and focused on the task.
- Do not introduce new dependencies without need.

# Execution
- Start from the pre-discovered files and components above.
- Read a file before changing it.
- Run the build and tests when you change code.

# Constraints
- Do not modify files unrelated to the task.
- Do not remove existing tests.
- Report anything you could not complete.
";

/// Builds the final prompt for one task.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    /// Creates an assembler with the given limits.
    #[must_use]
    pub const fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Builds the enhanced context and its prompt.
    #[instrument(skip_all, fields(operation = "assemble_context", intent = %intent))]
    pub fn build(
        &self,
        query: &str,
        intent: TaskType,
        clarifications: &[Clarification],
        files: &[RetrievedFile],
        graph: &GraphContext,
    ) -> EnhancedContext {
        let assumptions = assumptions_for(clarifications, files, graph);
        let files: Vec<RetrievedFile> = files.iter().take(self.config.max_files).cloned().collect();
        let classes: Vec<_> =
            graph.classes.iter().take(self.config.max_components).cloned().collect();
        let relationships: Vec<_> = graph
            .relationships
            .iter()
            .take(self.config.max_relationships)
            .cloned()
            .collect();

        let mut prompt = String::new();
        self.write_summary(&mut prompt, files.len(), graph);
        let _ = write!(prompt, "# Role\n{}\n\n", role_for(intent));
        write_task(&mut prompt, query, clarifications, &assumptions);
        self.write_files(&mut prompt, &files);

        prompt.push_str("# Components\n");
        if classes.is_empty() {
            prompt.push_str(NONE_FOUND);
        }
        for class in &classes {
            let location = class.line_range.map_or_else(
                || class.file_path.clone(),
                |(s, e)| format!("{}:{s}-{e}", class.file_path),
            );
            let origin = if class.is_seed { "direct" } else { "related" };
            let _ = writeln!(
                prompt,
                "- {} ({}) in {location} [{origin}]",
                class.name, class.node_type
            );
        }
        prompt.push('\n');

        prompt.push_str("# Relationships\n");
        if relationships.is_empty() {
            prompt.push_str(NONE_FOUND);
        }
        for relationship in &relationships {
            let _ = writeln!(prompt, "- {}", relationship.display_line());
        }
        prompt.push('\n');

        prompt.push_str("# Packages\n");
        if graph.packages.is_empty() {
            prompt.push_str(NONE_FOUND);
        }
        for package in &graph.packages {
            let _ = writeln!(prompt, "- {package}");
        }
        prompt.push('\n');

        let _ = write!(
            prompt,
            "# Expected Response Format\n{}\n",
            response_format_for(intent)
        );
        prompt.push_str(QUALITY_SECTION);

        let (prompt, truncated) = truncate_prompt(prompt, self.config.max_prompt_chars);
        metrics::histogram!("context_prompt_chars").record(prompt.len() as f64);
        if truncated {
            metrics::counter!("context_truncated_total").increment(1);
            tracing::debug!(max = self.config.max_prompt_chars, "Prompt truncated");
        }

        EnhancedContext {
            original_query: query.to_string(),
            intent,
            clarifications: clarifications.to_vec(),
            assumptions,
            files,
            classes,
            relationships,
            packages: graph.packages.clone(),
            prompt,
            truncated,
        }
    }

    fn write_summary(&self, prompt: &mut String, file_count: usize, graph: &GraphContext) {
        let _ = write!(
            prompt,
            "# Pre-Search Results\n\
             Before this prompt was written, the codebase was searched and {file_count} \
             relevant files, {} components and {} relationships were found. Start from these \
             and search further only where they fall short.\n",
            graph.classes.len().min(self.config.max_components),
            graph.relationships.len().min(self.config.max_relationships),
        );
        if !graph.insights.patterns.is_empty() {
            let _ = writeln!(prompt, "Architecture: {}.", graph.insights.patterns.join(", "));
        }
        if !graph.insights.hotspots.is_empty() {
            let _ = writeln!(prompt, "Hotspots: {}.", graph.insights.hotspots.join(", "));
        }
        prompt.push('\n');
    }

    fn write_files(&self, prompt: &mut String, files: &[RetrievedFile]) {
        prompt.push_str("# Pre-Discovered Files\n");
        if files.is_empty() {
            prompt.push_str(NONE_FOUND);
        }
        for file in files {
            let _ = writeln!(
                prompt,
                "## {} (relevance {:.2}, {})",
                file.location(),
                file.similarity,
                file.kind.as_str()
            );
            if !file.preview.is_empty() {
                let preview: Vec<&str> =
                    file.preview.lines().take(self.config.preview_lines).collect();
                let _ = write!(prompt, "```\n{}\n```\n", preview.join("\n"));
            }
        }
        prompt.push('\n');
    }
}

fn write_task(
    prompt: &mut String,
    query: &str,
    clarifications: &[Clarification],
    assumptions: &[String],
) {
    let _ = write!(prompt, "# Task\n{}\n\n", query.trim());
    // A clarified query already carries its answers.
    if !clarifications.is_empty() && !query.contains(CLARIFICATIONS_HEADING) {
        prompt.push_str("## Clarifications\n");
        for c in clarifications {
            let _ = writeln!(prompt, "- {} {}", c.question, c.answer);
        }
        prompt.push('\n');
    }
    if !assumptions.is_empty() {
        prompt.push_str("## Assumptions\n");
        for a in assumptions {
            let _ = writeln!(prompt, "- {a}");
        }
        prompt.push('\n');
    }
}

fn assumptions_for(
    clarifications: &[Clarification],
    files: &[RetrievedFile],
    graph: &GraphContext,
) -> Vec<String> {
    let mut assumptions = Vec::new();
    if files.is_empty() {
        assumptions.push("No files matched the request; locate the relevant code first.".to_string());
    }
    if graph.used_fallback && !files.is_empty() {
        assumptions.push(
            "The code graph was unavailable; components were inferred from file names.".to_string(),
        );
    }
    if clarifications.is_empty() && !files.is_empty() {
        assumptions.push("The highest-ranked files are the intended targets.".to_string());
    }
    assumptions
}

/// Cuts a prompt to at most `max_chars` characters, marker included.
#[must_use]
pub fn truncate_prompt(prompt: String, max_chars: usize) -> (String, bool) {
    if prompt.chars().count() <= max_chars {
        return (prompt, false);
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars < marker_len {
        return (TRUNCATION_MARKER.chars().take(max_chars).collect(), true);
    }
    let mut cut: String = prompt.chars().take(max_chars - marker_len).collect();
    cut.push_str(TRUNCATION_MARKER);
    (cut, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassInfo, EdgeType, FileKind, NodeType, Relationship};

    fn files(n: usize) -> Vec<RetrievedFile> {
        (0..n)
            .map(|i| {
                RetrievedFile::new(format!("src/f{i}.ts"), FileKind::Source, 0.9)
                    .with_preview((0..80).map(|l| format!("line {l}")).collect::<Vec<_>>().join("\n"))
                    .with_line_range(1, 80)
            })
            .collect()
    }

    fn graph(n: usize) -> GraphContext {
        let classes = (0..n)
            .map(|i| ClassInfo {
                name: format!("C{i}"),
                file_path: format!("src/c{i}.ts"),
                package: "src".to_string(),
                node_type: NodeType::Class,
                line_range: Some((1, 10)),
                confidence: 0.9,
                is_seed: true,
            })
            .collect();
        let relationships = (0..n)
            .map(|i| Relationship {
                from: format!("C{i}"),
                to: "Db".to_string(),
                relationship_type: EdgeType::Calls,
                caller_method: Some("run".to_string()),
                callee_method: Some("query".to_string()),
                strength: 0.9,
            })
            .collect();
        GraphContext {
            classes,
            relationships,
            packages: vec!["src".to_string()],
            ..GraphContext::default()
        }
    }

    #[test]
    fn test_sections_in_order() {
        let context = ContextAssembler::default().build("fix login", TaskType::Fix, &[], &files(2), &graph(2));
        let order = [
            "# Pre-Search Results",
            "# Role",
            "# Task",
            "# Pre-Discovered Files",
            "# Components",
            "# Relationships",
            "# Packages",
            "# Expected Response Format",
            "# Quality Standards",
            "# Execution",
            "# Constraints",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|h| context.prompt.find(h).unwrap_or_else(|| panic!("missing {h}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!context.truncated);
    }

    #[test]
    fn test_counts_are_capped() {
        let context = ContextAssembler::default().build("q", TaskType::Analyze, &[], &files(9), &graph(12));
        assert_eq!(context.files.len(), 5);
        assert_eq!(context.classes.len(), 8);
        assert_eq!(context.relationships.len(), 8);
        assert_eq!(context.prompt.matches("\n## src/f").count(), 5);
        assert!(context.prompt.contains("## src/f0.ts:1-80"));
        assert!(context.prompt.contains("line 49\n```"));
        assert!(!context.prompt.contains("line 50"));
        assert!(context.prompt.contains("- C0.run() → Db.query() [calls]"));
    }

    #[test]
    fn test_deterministic() {
        let assembler = ContextAssembler::default();
        let a = assembler.build("q", TaskType::Create, &[], &files(3), &graph(3));
        let b = assembler.build("q", TaskType::Create, &[], &files(3), &graph(3));
        assert_eq!(a.prompt, b.prompt);
    }

    #[test]
    fn test_truncation_marker() {
        let assembler = ContextAssembler::new(ContextConfig::default().with_max_prompt_chars(500));
        let context = assembler.build("q", TaskType::Fix, &[], &files(5), &graph(8));
        assert!(context.truncated);
        assert!(context.prompt.chars().count() <= 500);
        assert!(context.prompt.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncation_never_exceeds_limit() {
        let prompt = "x".repeat(200);
        for max in [0, 5, TRUNCATION_MARKER.len() - 1, TRUNCATION_MARKER.len() + 3] {
            let (cut, truncated) = truncate_prompt(prompt.clone(), max);
            assert!(truncated);
            assert!(cut.chars().count() <= max, "limit {max}");
        }
        let (whole, truncated) = truncate_prompt("short".to_string(), 5);
        assert_eq!(whole, "short");
        assert!(!truncated);
    }

    #[test]
    fn test_clarifications_and_empty_sections() {
        let clarifications = vec![Clarification {
            question: "Which file?".to_string(),
            answer: "a.ts".to_string(),
        }];
        let context = ContextAssembler::default().build(
            "fix it",
            TaskType::Fix,
            &clarifications,
            &[],
            &GraphContext::default(),
        );
        assert!(context.prompt.contains("## Clarifications\n- Which file? a.ts"));
        assert_eq!(context.prompt.matches(NONE_FOUND).count(), 4);
        assert_eq!(context.assumptions.len(), 1);
    }

    #[test]
    fn test_clarified_query_lists_answers_once() {
        let clarifications = vec![Clarification {
            question: "Which file?".to_string(),
            answer: "src/auth/login.ts".to_string(),
        }];
        let query = crate::services::clarification::fold_clarifications("fix login", &clarifications);
        let context = ContextAssembler::default().build(
            &query,
            TaskType::Fix,
            &clarifications,
            &files(1),
            &GraphContext::default(),
        );
        assert_eq!(context.prompt.matches("src/auth/login.ts").count(), 1);
        assert!(context.prompt.contains(CLARIFICATIONS_HEADING));
        assert!(!context.prompt.contains("## Clarifications\n"));
    }
}
