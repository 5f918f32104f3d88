//! Ambiguity detection and clarification.
//!
//! Five independent detectors inspect the query, the task intent, the
//! retrieved files and the graph context. Each fires at most one question.
//!
//! | Detector | Intent | Fires when | Impact |
//! |----------|--------|------------|--------|
//! | Multiple implementations | create | two or more entities share a structural suffix | medium |
//! | Unclear target | modify, fix | more than 3 files above 0.7 similarity | high |
//! | Possible duplication | create | entity name tokens overlap the query terms | high |
//! | Scope too broad | any | broadening language and more than 10 matched files | medium |
//! | Missing test pattern | create, test | the query mentions tests and test files exist | low |
//!
//! Queries that explicitly ask to show, list or display something bypass
//! detection entirely.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::cli::prompter::UserPrompter;
use crate::config::ClarificationConfig;
use crate::intent::STOP_WORDS;
use crate::models::{
    Ambiguity, AmbiguityKind, Clarification, ClarificationOutcome, ClarificationQuestion,
    FileKind, GraphContext, Impact, NodeType, RetrievedFile, TaskType,
};
use crate::services::task_patterns::{TEST_NOUNS, extract_search_terms, mentions_any, words};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::sync::LazyLock;
use tracing::instrument;

/// Heading of the block appended to a clarified query.
pub const CLARIFICATIONS_HEADING: &str = "## User Clarifications";

/// Words that signal a request spanning much of the codebase.
const BROADENING_WORDS: &[&str] = &["all", "entire", "refactor", "every", "everything", "whole"];

const MAX_CHOICES: usize = 5;

/// Queries that only ask to see something.
static EXPLICIT_DISPLAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:please\s+)?(?:show|list|display)\b")
        .expect("static regex: explicit display")
});

/// Splits `UserAuthService` into `User`, `Auth`, `Service`.
static CAMEL_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z]+[a-z0-9]*|[a-z][a-z0-9]*").expect("static regex: camel word")
});

/// Detects ambiguity and collects answers.
#[derive(Debug, Clone, Default)]
pub struct ClarificationEngine {
    config: ClarificationConfig,
}

impl ClarificationEngine {
    /// Creates an engine with the given thresholds.
    #[must_use]
    pub const fn new(config: ClarificationConfig) -> Self {
        Self { config }
    }

    /// Returns the thresholds.
    #[must_use]
    pub const fn config(&self) -> &ClarificationConfig {
        &self.config
    }

    /// Returns true if the query only asks to show, list or display.
    #[must_use]
    pub fn is_explicit_display(query: &str) -> bool {
        EXPLICIT_DISPLAY.is_match(query)
    }

    /// Runs every detector.
    ///
    /// Results are sorted by impact, highest first, and truncated to
    /// `max_questions`.
    #[must_use]
    pub fn detect(
        &self,
        query: &str,
        intent: TaskType,
        files: &[RetrievedFile],
        graph: &GraphContext,
    ) -> Vec<Ambiguity> {
        if Self::is_explicit_display(query) {
            return Vec::new();
        }

        let mut found: Vec<Ambiguity> = [
            multiple_implementations(intent, graph),
            self.unclear_target(intent, files),
            possible_duplication(query, intent, graph),
            self.scope_too_broad(query, files, graph),
            missing_test_pattern(query, intent, files),
        ]
        .into_iter()
        .flatten()
        .collect();

        // Stable sort keeps detector order within one impact level.
        found.sort_by(|a, b| b.question.impact.cmp(&a.question.impact));
        found.truncate(self.config.max_questions);
        found
    }

    /// Detects ambiguities and asks up to `max_questions` of them.
    ///
    /// Answers are folded into the query under [`CLARIFICATIONS_HEADING`].
    /// With nothing to ask, or when every question is skipped, the original
    /// query comes back unchanged and `skipped` is set. A failing prompter
    /// stops further questions.
    #[instrument(skip_all, fields(operation = "clarify", intent = %intent))]
    pub fn detect_and_ask(
        &self,
        query: &str,
        intent: TaskType,
        files: &[RetrievedFile],
        graph: &GraphContext,
        max_questions: usize,
        prompter: &dyn UserPrompter,
    ) -> ClarificationOutcome {
        let mut ambiguities = self.detect(query, intent, files, graph);
        ambiguities.truncate(max_questions);
        metrics::counter!("clarification_questions_total").increment(ambiguities.len() as u64);

        if ambiguities.is_empty() {
            return ClarificationOutcome::skipped(query, ambiguities);
        }

        let mut clarifications = Vec::new();
        for ambiguity in &ambiguities {
            match prompter.ask(&ambiguity.question) {
                Ok(Some(answer)) if !answer.trim().is_empty() => {
                    clarifications.push(Clarification {
                        question: ambiguity.question.question.clone(),
                        answer: answer.trim().to_string(),
                    });
                },
                Ok(_) => {},
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Clarification prompt failed, skipping remaining questions"
                    );
                    break;
                },
            }
        }

        if clarifications.is_empty() {
            metrics::counter!("clarification_skipped_total").increment(1);
            return ClarificationOutcome::skipped(query, ambiguities);
        }

        metrics::counter!("clarification_answers_total").increment(clarifications.len() as u64);
        ClarificationOutcome {
            rewritten_query: fold_clarifications(query, &clarifications),
            clarifications,
            skipped: false,
            ambiguities,
        }
    }

    fn unclear_target(&self, intent: TaskType, files: &[RetrievedFile]) -> Option<Ambiguity> {
        if !matches!(intent, TaskType::Modify | TaskType::Fix) {
            return None;
        }
        let strong: Vec<&RetrievedFile> = files
            .iter()
            .filter(|f| f.similarity > self.config.unclear_target_similarity)
            .collect();
        if strong.len() <= self.config.unclear_target_file_count {
            return None;
        }

        let mut choices: Vec<String> =
            strong.iter().take(MAX_CHOICES).map(|f| f.path.clone()).collect();
        choices.push("All of them".to_string());
        Some(Ambiguity {
            kind: AmbiguityKind::UnclearTarget,
            description: format!("{} files are strong candidates", strong.len()),
            related_files: strong.iter().map(|f| f.path.clone()).collect(),
            question: ClarificationQuestion {
                question: "Several files match closely. Which should be changed?".to_string(),
                choices,
                impact: Impact::High,
            },
        })
    }

    fn scope_too_broad(
        &self,
        query: &str,
        files: &[RetrievedFile],
        graph: &GraphContext,
    ) -> Option<Ambiguity> {
        if !mentions_any(query, BROADENING_WORDS) {
            return None;
        }
        let mut matched: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        matched.extend(graph.classes.iter().map(|c| c.file_path.as_str()));
        if matched.len() <= self.config.broad_query_file_count {
            return None;
        }

        Some(Ambiguity {
            kind: AmbiguityKind::ScopeTooBroad,
            description: format!("{} files matched a broad request", matched.len()),
            related_files: files.iter().map(|f| f.path.clone()).collect(),
            question: ClarificationQuestion {
                question: format!(
                    "This request touches {} files. Should the scope be limited?",
                    matched.len()
                ),
                choices: vec![
                    "Limit to the most relevant files".to_string(),
                    "Include everything".to_string(),
                ],
                impact: Impact::Medium,
            },
        })
    }
}

fn multiple_implementations(intent: TaskType, graph: &GraphContext) -> Option<Ambiguity> {
    if intent != TaskType::Create {
        return None;
    }
    let mut by_suffix: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for class in graph.classes.iter().filter(|c| c.node_type != NodeType::File) {
        if let Some(suffix) = structural_suffix(&class.name) {
            let names = by_suffix.entry(suffix).or_default();
            if !names.contains(&class.name.as_str()) {
                names.push(class.name.as_str());
            }
        }
    }
    let (suffix, names) = by_suffix
        .into_iter()
        .filter(|(_, names)| names.len() >= 2)
        .max_by_key(|(_, names)| names.len())?;

    let choices: Vec<String> = names.iter().take(MAX_CHOICES).map(|n| (*n).to_string()).collect();
    Some(Ambiguity {
        kind: AmbiguityKind::MultipleImplementations,
        description: format!("{} existing *{suffix} implementations", names.len()),
        related_files: related_files(graph, &names),
        question: ClarificationQuestion {
            question: format!("Which existing {suffix} should be used as the style reference?"),
            choices,
            impact: Impact::Medium,
        },
    })
}

fn possible_duplication(query: &str, intent: TaskType, graph: &GraphContext) -> Option<Ambiguity> {
    if intent != TaskType::Create {
        return None;
    }
    let query_tokens: HashSet<String> = extract_search_terms(query, usize::MAX)
        .iter()
        .flat_map(|t| name_tokens(t))
        .collect();
    if query_tokens.is_empty() {
        return None;
    }

    let overlapping: Vec<&str> = graph
        .classes
        .iter()
        .filter(|c| c.node_type != NodeType::File)
        .filter(|c| name_tokens(&c.name).iter().any(|t| query_tokens.contains(t)))
        .map(|c| c.name.as_str())
        .collect();
    if overlapping.is_empty() {
        return None;
    }

    Some(Ambiguity {
        kind: AmbiguityKind::PossibleDuplication,
        description: format!("Existing code may cover this: {}", overlapping.join(", ")),
        related_files: related_files(graph, &overlapping),
        question: ClarificationQuestion {
            question: format!(
                "{} already exists. Extend it or create something new?",
                overlapping.first().copied().unwrap_or_default()
            ),
            choices: vec![
                "Extend the existing code".to_string(),
                "Create a new implementation".to_string(),
            ],
            impact: Impact::High,
        },
    })
}

fn missing_test_pattern(
    query: &str,
    intent: TaskType,
    files: &[RetrievedFile],
) -> Option<Ambiguity> {
    if !matches!(intent, TaskType::Create | TaskType::Test) || !mentions_any(query, TEST_NOUNS) {
        return None;
    }
    let tests: Vec<&RetrievedFile> = files.iter().filter(|f| f.kind == FileKind::Test).collect();
    if tests.is_empty() {
        return None;
    }

    let mut choices: Vec<String> = tests.iter().take(3).map(|f| f.path.clone()).collect();
    choices.push("Follow the project's usual conventions".to_string());
    Some(Ambiguity {
        kind: AmbiguityKind::MissingTestPattern,
        description: format!("{} existing test files found", tests.len()),
        related_files: tests.iter().map(|f| f.path.clone()).collect(),
        question: ClarificationQuestion {
            question: "Which existing test file should new tests follow?".to_string(),
            choices,
            impact: Impact::Low,
        },
    })
}

/// Returns the last camel-case word of a multi-word name: `UserService` => `Service`.
fn structural_suffix(name: &str) -> Option<String> {
    let parts: Vec<&str> = CAMEL_WORD.find_iter(name).map(|m| m.as_str()).collect();
    if parts.len() < 2 {
        return None;
    }
    parts
        .last()
        .filter(|p| p.chars().next().is_some_and(char::is_uppercase) && p.len() >= 3)
        .map(|p| (*p).to_string())
}

/// Lowercased name tokens worth comparing: at least 4 chars, not stop words.
fn name_tokens(name: &str) -> Vec<String> {
    words(name)
        .flat_map(|w| {
            CAMEL_WORD
                .find_iter(w)
                .map(|m| m.as_str().to_lowercase())
                .collect::<Vec<_>>()
        })
        .filter(|t| t.len() >= 4 && !STOP_WORDS.contains(t.as_str()))
        .collect()
}

fn related_files(graph: &GraphContext, names: &[&str]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for class in graph.classes.iter().filter(|c| names.contains(&c.name.as_str())) {
        if !files.contains(&class.file_path) {
            files.push(class.file_path.clone());
        }
    }
    files
}

/// Appends answered questions to the query as a labeled block.
#[must_use]
pub fn fold_clarifications(query: &str, clarifications: &[Clarification]) -> String {
    if clarifications.is_empty() {
        return query.to_string();
    }
    let mut out = format!("{}\n\n{CLARIFICATIONS_HEADING}\n", query.trim_end());
    for c in clarifications {
        let _ = writeln!(out, "- Q: {}\n  A: {}", c.question, c.answer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::prompter::{NonInteractivePrompter, ScriptedPrompter};
    use crate::models::ClassInfo;

    fn file(path: &str, similarity: f32) -> RetrievedFile {
        RetrievedFile::new(path, FileKind::infer(path), similarity)
    }

    fn class(name: &str, path: &str) -> ClassInfo {
        ClassInfo {
            name: name.to_string(),
            file_path: path.to_string(),
            package: "src".to_string(),
            node_type: NodeType::Class,
            line_range: None,
            confidence: 0.9,
            is_seed: true,
        }
    }

    fn graph(classes: Vec<ClassInfo>) -> GraphContext {
        GraphContext {
            classes,
            ..GraphContext::default()
        }
    }

    #[test]
    fn test_explicit_display_bypasses() {
        let engine = ClarificationEngine::default();
        let files: Vec<_> = (0..20).map(|i| file(&format!("src/f{i}.ts"), 0.9)).collect();
        let found = engine.detect("show me all the classes", TaskType::Analyze, &files, &GraphContext::default());
        assert!(found.is_empty());
    }

    #[test]
    fn test_unclear_target() {
        let engine = ClarificationEngine::default();
        let files: Vec<_> = (0..4).map(|i| file(&format!("src/auth/login{i}.ts"), 0.9)).collect();
        let found = engine.detect("fix login", TaskType::Fix, &files, &GraphContext::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, AmbiguityKind::UnclearTarget);
        assert_eq!(found[0].question.impact, Impact::High);

        let three = &files[..3];
        assert!(engine.detect("fix login", TaskType::Fix, three, &GraphContext::default()).is_empty());
    }

    #[test]
    fn test_multiple_implementations_and_duplication() {
        let engine = ClarificationEngine::default();
        let g = graph(vec![
            class("UserService", "src/user.ts"),
            class("BillingService", "src/billing.ts"),
        ]);
        let found = engine.detect("add a billing export endpoint", TaskType::Create, &[], &g);
        let kinds: Vec<_> = found.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AmbiguityKind::PossibleDuplication, AmbiguityKind::MultipleImplementations]
        );
        assert!(found[1].question.question.contains("Service"));
        assert_eq!(found[0].related_files, vec!["src/billing.ts"]);
    }

    #[test]
    fn test_scope_too_broad_counts_graph_files() {
        let engine = ClarificationEngine::default();
        let files: Vec<_> = (0..6).map(|i| file(&format!("src/f{i}.ts"), 0.5)).collect();
        let classes = (0..5).map(|i| class(&format!("K{i}"), &format!("lib/k{i}.ts"))).collect();
        let found = engine.detect("refactor the entire app", TaskType::Refactor, &files, &graph(classes));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, AmbiguityKind::ScopeTooBroad);
    }

    #[test]
    fn test_missing_test_pattern() {
        let engine = ClarificationEngine::default();
        let files = vec![file("src/auth.test.ts", 0.5)];
        let found = engine.detect("add unit tests for auth", TaskType::Test, &files, &GraphContext::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question.impact, Impact::Low);
    }

    #[test]
    fn test_sorted_and_truncated() {
        let engine = ClarificationEngine::new(ClarificationConfig::default().with_max_questions(1));
        let g = graph(vec![
            class("UserService", "src/user.ts"),
            class("BillingService", "src/billing.ts"),
        ]);
        let found = engine.detect("add billing", TaskType::Create, &[], &g);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question.impact, Impact::High);
    }

    #[test]
    fn test_answers_are_folded() {
        let engine = ClarificationEngine::default();
        let files: Vec<_> = (0..4).map(|i| file(&format!("src/auth/login{i}.ts"), 0.9)).collect();
        let prompter = ScriptedPrompter::new(["src/auth/login0.ts"]);
        let outcome = engine.detect_and_ask("fix login", TaskType::Fix, &files, &GraphContext::default(), 3, &prompter);
        assert!(!outcome.skipped);
        assert_eq!(outcome.clarifications.len(), 1);
        assert!(outcome.rewritten_query.starts_with("fix login\n\n## User Clarifications\n"));
        assert!(outcome.rewritten_query.contains("A: src/auth/login0.ts"));
    }

    #[test]
    fn test_skip_returns_original_query() {
        let engine = ClarificationEngine::default();
        let files: Vec<_> = (0..4).map(|i| file(&format!("src/auth/login{i}.ts"), 0.9)).collect();
        let outcome = engine.detect_and_ask(
            "fix login",
            TaskType::Fix,
            &files,
            &GraphContext::default(),
            3,
            &NonInteractivePrompter,
        );
        assert!(outcome.skipped);
        assert_eq!(outcome.rewritten_query, "fix login");
        assert_eq!(outcome.ambiguities.len(), 1);
    }

    #[test]
    fn test_structural_suffix() {
        assert_eq!(structural_suffix("UserService").as_deref(), Some("Service"));
        assert_eq!(structural_suffix("Service"), None);
        assert_eq!(structural_suffix("parse_http").as_deref(), None);
    }
}
