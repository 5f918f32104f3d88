//! Task decomposition.
//!
//! Splits a free-text request into ordered sub-tasks with dependency edges
//! and a phased execution plan.
//!
//! ```text
//! "refactor the AuthService and then add unit tests"
//!     │ complex? (sequencing words, numbered list, ≥2 verbs, >30 words)
//!     ▼
//! segments: ["refactor the AuthService", "add unit tests"]
//!     │ verb table → type, nouns promote, classifier fallback
//!     ▼
//! task-1 refactor (p=51)   task-2 test (p=62, deps=[task-1])
//!     │
//!     ▼
//! phase 0: [task-1]   phase 1: [task-2]
//! ```

use crate::config::DecompositionConfig;
use crate::intent::{IntentClassifier, KeywordIntentClassifier};
use crate::models::{
    Complexity, ContextFilter, Decomposition, ExecutionPhase, ExecutionPlan, SubTask, TaskId,
    TaskType,
};
use crate::services::task_patterns::{
    CLAUSE_MARKERS, DOC_NOUNS, NUMBERED_ITEM, SENTENCE_BOUNDARY, SEQUENCE_SPLIT, TEST_NOUNS,
    distinct_verbs, extract_search_terms, intensifier_count, is_action_verb, mentions_any, verb_type,
    words,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Splits queries into sub-tasks.
pub struct TaskDecomposer {
    config: DecompositionConfig,
    classifier: Arc<dyn IntentClassifier>,
}

impl Default for TaskDecomposer {
    fn default() -> Self {
        Self::new(DecompositionConfig::default())
    }
}

impl TaskDecomposer {
    /// Creates a decomposer with the keyword intent classifier.
    #[must_use]
    pub fn new(config: DecompositionConfig) -> Self {
        Self {
            config,
            classifier: Arc::new(KeywordIntentClassifier::new()),
        }
    }

    /// Replaces the fallback intent classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DecompositionConfig {
        &self.config
    }

    /// Decomposes a query. Never fails.
    #[instrument(skip(self), fields(operation = "decompose", classifier = self.classifier.name()))]
    pub fn decompose(&self, query: &str) -> Decomposition {
        let start = Instant::now();
        let is_complex = self.is_complex(query);

        let segments = if is_complex {
            self.segment(query)
        } else {
            let trimmed = query.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            }
        };

        let mut tasks: Vec<SubTask> = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| self.build_task(i + 1, segment))
            .collect();

        if tasks.is_empty() {
            tracing::debug!("Query produced no segments, using a single fallback task");
            let task_type = self.fallback_type(query);
            tasks.push(self.task_from_parts(1, query, task_type));
        }

        infer_dependencies(&mut tasks);
        tasks.sort_by_key(|t| t.priority);
        let plan = build_execution_plan(&tasks);

        metrics::counter!(
            "decomposition_total",
            "complex" => if is_complex { "true" } else { "false" }
        )
        .increment(1);
        metrics::histogram!("decomposition_task_count").record(tasks.len() as f64);
        metrics::histogram!("decomposition_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        tracing::debug!(
            is_complex,
            tasks = tasks.len(),
            phases = plan.phases.len(),
            "Decomposed query"
        );

        Decomposition {
            is_complex,
            tasks,
            plan,
        }
    }

    /// Returns true if the query needs the multi-task path.
    #[must_use]
    pub fn is_complex(&self, query: &str) -> bool {
        if words(query).count() > self.config.word_threshold {
            return true;
        }
        if SEQUENCE_SPLIT.is_match(query) || CLAUSE_MARKERS.is_match(query) {
            return true;
        }
        if NUMBERED_ITEM.find_iter(query).count() >= 2 {
            return true;
        }
        distinct_verbs(query).len() >= 2
    }

    /// Splits a query into non-empty segments.
    ///
    /// Numbered list items win; then sequencing words and `and <verb>`
    /// conjunctions; then sentence boundaries; else the whole query.
    #[must_use]
    pub fn segment(&self, query: &str) -> Vec<String> {
        if NUMBERED_ITEM.find_iter(query).count() >= 2 {
            return clean(NUMBERED_ITEM.split(query));
        }

        let by_sequence: Vec<String> = SEQUENCE_SPLIT
            .split(query)
            .flat_map(|part| CLAUSE_MARKERS.split(part).collect::<Vec<_>>())
            .flat_map(split_on_verb_conjunction)
            .collect();
        let by_sequence = clean(by_sequence.iter().map(String::as_str));
        if by_sequence.len() > 1 {
            return by_sequence;
        }

        let by_sentence = clean(SENTENCE_BOUNDARY.split(query));
        if by_sentence.len() > 1 {
            return by_sentence;
        }

        clean(std::iter::once(query))
    }

    /// Asks the intent classifier when no action verb is present.
    fn fallback_type(&self, text: &str) -> TaskType {
        let intent = self.classifier.classify(text);
        tracing::debug!(
            classifier = self.classifier.name(),
            source = %intent.source,
            task_type = %intent.task_type,
            confidence = intent.confidence,
            "No action verb, classified intent"
        );
        intent.task_type
    }

    /// Picks the task type for a segment.
    ///
    /// The first action verb decides; test and documentation nouns promote
    /// create/modify/general work; with no verb the classifier decides.
    #[must_use]
    pub fn classify_segment(&self, segment: &str) -> TaskType {
        let base = words(segment)
            .find_map(verb_type)
            .unwrap_or_else(|| self.fallback_type(segment));

        let promotable = matches!(
            base,
            TaskType::Create | TaskType::Modify | TaskType::General
        );
        if promotable && mentions_any(segment, TEST_NOUNS) {
            TaskType::Test
        } else if promotable && mentions_any(segment, DOC_NOUNS) {
            TaskType::Document
        } else {
            base
        }
    }

    fn build_task(&self, sequence: usize, segment: &str) -> SubTask {
        let task_type = self.classify_segment(segment);
        self.task_from_parts(sequence, segment, task_type)
    }

    fn task_from_parts(&self, sequence: usize, description: &str, task_type: TaskType) -> SubTask {
        let search_terms = extract_search_terms(description, self.config.max_search_terms);
        SubTask {
            id: TaskId::sequential(sequence),
            task_type,
            description: description.trim().to_string(),
            search_terms,
            priority: task_type.base_priority() * 10
                + u32::try_from(sequence).unwrap_or(u32::MAX / 2),
            dependencies: Vec::new(),
            complexity: estimate_complexity(task_type, description),
            context_filter: ContextFilter::for_task_type(task_type),
        }
    }
}

/// Estimates complexity from type weight, length and intensifiers.
#[must_use]
pub fn estimate_complexity(task_type: TaskType, text: &str) -> Complexity {
    let word_count = words(text).count();
    let length_score = match word_count {
        0..=8 => 0,
        9..=15 => 1,
        _ => 2,
    };
    let intensifiers = u32::try_from(intensifier_count(text)).unwrap_or(u32::MAX);
    Complexity::from_score(task_type.complexity_weight() + length_score + intensifiers)
}

/// Splits on `and` when the next word is an action verb.
fn split_on_verb_conjunction(part: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut tokens = part.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        let is_and = token.trim_end_matches(',').eq_ignore_ascii_case("and");
        let next_is_verb = tokens.peek().is_some_and(|next| {
            is_action_verb(next.trim_matches(|c: char| !c.is_alphanumeric()))
        });
        if is_and && next_is_verb && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(token);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn clean<'a>(parts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    parts
        .into_iter()
        .map(|p| p.trim().trim_end_matches([',', ';', '.']).trim().to_string())
        .filter(|p| !p.is_empty() && words(p).next().is_some())
        .collect()
}

/// Adds dependency edges in segment (sequence) order.
///
/// `test` depends on every prior create/modify/refactor, `document` on every
/// prior create/modify, `refactor` on every prior analyze. Tasks must still
/// be in sequence order when this runs.
fn infer_dependencies(tasks: &mut [SubTask]) {
    for i in 0..tasks.len() {
        let task_type = tasks[i].task_type;
        let deps: Vec<TaskId> = tasks[..i]
            .iter()
            .filter(|prior| match task_type {
                TaskType::Test => matches!(
                    prior.task_type,
                    TaskType::Create | TaskType::Modify | TaskType::Refactor
                ),
                TaskType::Document => {
                    matches!(prior.task_type, TaskType::Create | TaskType::Modify)
                },
                TaskType::Refactor => prior.task_type == TaskType::Analyze,
                _ => false,
            })
            .map(|prior| prior.id.clone())
            .collect();
        tasks[i].dependencies = deps;
    }
}

/// Builds phases by repeatedly collecting tasks whose dependencies are done.
///
/// Tasks are taken in the given (priority) order. If nothing is ready but
/// tasks remain, they are flushed into one final phase and
/// `cycle_detected` is set.
#[must_use]
pub fn build_execution_plan(tasks: &[SubTask]) -> ExecutionPlan {
    let known: HashSet<&TaskId> = tasks.iter().map(|t| &t.id).collect();
    let mut done: HashSet<&TaskId> = HashSet::new();
    let mut remaining: Vec<&SubTask> = tasks.iter().collect();
    let mut plan = ExecutionPlan::default();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&SubTask>, Vec<&SubTask>) =
            remaining.into_iter().partition(|t| {
                t.dependencies
                    .iter()
                    .all(|d| done.contains(d) || !known.contains(d))
            });

        if ready.is_empty() {
            tracing::warn!(
                remaining = blocked.len(),
                tasks = ?blocked.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
                "Dependency cycle in task plan, flushing remaining tasks into one phase"
            );
            metrics::counter!("decomposition_cycle_total").increment(1);
            plan.cycle_detected = true;
            plan.phases.push(ExecutionPhase {
                index: plan.phases.len(),
                task_ids: blocked.iter().map(|t| t.id.clone()).collect(),
            });
            break;
        }

        done.extend(ready.iter().map(|t| &t.id));
        plan.phases.push(ExecutionPhase {
            index: plan.phases.len(),
            task_ids: ready.iter().map(|t| t.id.clone()).collect(),
        });
        remaining = blocked;
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::TaskIntent;
    use test_case::test_case;

    fn decomposer() -> TaskDecomposer {
        TaskDecomposer::default()
    }

    #[test]
    fn test_refactor_then_test_example() {
        let d = decomposer().decompose("refactor the AuthService and then add unit tests");
        assert!(d.is_complex);
        assert_eq!(d.tasks.len(), 2);

        let refactor = d.tasks.iter().find(|t| t.task_type == TaskType::Refactor).unwrap();
        let test = d.tasks.iter().find(|t| t.task_type == TaskType::Test).unwrap();
        assert_eq!(test.dependencies, vec![refactor.id.clone()]);
        assert_eq!(refactor.search_terms, vec!["AuthService".to_string()]);
        assert_eq!(d.plan.phases.len(), 2);
        assert_eq!(d.plan.phase_of(&refactor.id), Some(0));
        assert_eq!(d.plan.phase_of(&test.id), Some(1));
        assert!(!d.plan.cycle_detected);
    }

    #[test]
    fn test_show_query_is_simple() {
        let d = decomposer().decompose("show me all the classes");
        assert!(!d.is_complex);
        assert_eq!(d.tasks.len(), 1);
        assert_eq!(d.tasks[0].task_type, TaskType::Analyze);
        assert_eq!(d.tasks[0].description, "show me all the classes");
    }

    #[test_case("fix the login bug", false; "single verb")]
    #[test_case("add a route and update the docs", true; "two verbs")]
    #[test_case("1. add a route 2. write tests", true; "numbered list")]
    #[test_case("first analyze the module", true; "ordinal marker")]
    #[test_case("login and signup pages", false; "noun conjunction")]
    fn test_is_complex(query: &str, expected: bool) {
        assert_eq!(decomposer().is_complex(query), expected);
    }

    #[test]
    fn test_word_threshold() {
        let long = "word ".repeat(31);
        assert!(decomposer().is_complex(&long));
        let d = TaskDecomposer::new(DecompositionConfig::default().with_word_threshold(100));
        assert!(!d.is_complex(&long));
    }

    #[test]
    fn test_segment_numbered_list() {
        let segments = decomposer().segment("1. add a login route\n2. write tests for it");
        assert_eq!(segments, vec!["add a login route", "write tests for it"]);
    }

    #[test]
    fn test_segment_verb_conjunction() {
        let segments = decomposer().segment("analyze the session store and refactor the cache");
        assert_eq!(segments, vec!["analyze the session store", "refactor the cache"]);
    }

    #[test]
    fn test_segment_sentences() {
        let segments =
            decomposer().segment("The parser is slow on big inputs. The lexer allocates too much.");
        assert_eq!(segments.len(), 2);
    }

    #[test_case("add unit tests", TaskType::Test; "test noun promotes create")]
    #[test_case("write the README", TaskType::Document; "doc noun promotes create")]
    #[test_case("fix the failing tests", TaskType::Fix; "fix is not promoted")]
    #[test_case("refactor the AuthService", TaskType::Refactor; "plain verb")]
    #[test_case("the login flow is broken", TaskType::Fix; "classifier fallback")]
    fn test_classify_segment(segment: &str, expected: TaskType) {
        assert_eq!(decomposer().classify_segment(segment), expected);
    }

    #[test]
    fn test_injected_classifier_used_without_verb() {
        struct Always(TaskType);
        impl IntentClassifier for Always {
            fn name(&self) -> &'static str {
                "always"
            }
            fn classify(&self, _text: &str) -> TaskIntent {
                TaskIntent::new(self.0)
            }
        }

        let d = decomposer().with_classifier(Arc::new(Always(TaskType::Configure)));
        assert_eq!(d.classify_segment("the ci pipeline"), TaskType::Configure);
        assert_eq!(d.classify_segment("fix the ci pipeline"), TaskType::Fix);
    }

    #[test]
    fn test_empty_query_yields_fallback_task() {
        let d = decomposer().decompose("");
        assert_eq!(d.tasks.len(), 1);
        assert_eq!(d.tasks[0].task_type, TaskType::General);
        assert_eq!(d.plan.task_count(), 1);
    }

    #[test]
    fn test_analysis_sorted_first() {
        let d = decomposer().decompose("add a cache layer and then analyze the session store");
        assert_eq!(d.tasks[0].task_type, TaskType::Analyze);
        assert_eq!(d.tasks[0].priority, 12);
        assert_eq!(d.tasks[1].priority, 31);
    }

    #[test]
    fn test_dependency_rules() {
        let d = decomposer().decompose(
            "analyze the auth module, then refactor the AuthService, then add a token cache, \
             then write the docs, then add tests",
        );
        let by_type = |t: TaskType| d.tasks.iter().find(|x| x.task_type == t).unwrap();
        let analyze = by_type(TaskType::Analyze);
        let refactor = by_type(TaskType::Refactor);
        let create = by_type(TaskType::Create);
        let document = by_type(TaskType::Document);
        let test = by_type(TaskType::Test);

        assert_eq!(refactor.dependencies, vec![analyze.id.clone()]);
        assert_eq!(document.dependencies, vec![create.id.clone()]);
        assert_eq!(test.dependencies, vec![refactor.id.clone(), create.id.clone()]);
        assert!(analyze.dependencies.is_empty());
    }

    #[test]
    fn test_complexity_estimate() {
        assert_eq!(estimate_complexity(TaskType::Analyze, "show routes"), Complexity::Low);
        assert_eq!(estimate_complexity(TaskType::Fix, "fix the bug"), Complexity::Medium);
        assert_eq!(
            estimate_complexity(TaskType::Refactor, "refactor the entire codebase"),
            Complexity::High
        );
    }

    #[test]
    fn test_cycle_flushes_remaining() {
        let mut a = decomposer().task_from_parts(1, "a", TaskType::Modify);
        let mut b = decomposer().task_from_parts(2, "b", TaskType::Modify);
        let c = decomposer().task_from_parts(3, "c", TaskType::Analyze);
        a.dependencies = vec![b.id.clone()];
        b.dependencies = vec![a.id.clone()];

        let plan = build_execution_plan(&[c.clone(), a.clone(), b.clone()]);
        assert!(plan.cycle_detected);
        assert_eq!(plan.phases.len(), 2);
        assert_eq!(plan.phases[0].task_ids, vec![c.id]);
        assert_eq!(plan.phases[1].task_ids, vec![a.id, b.id]);
        assert_eq!(plan.task_count(), 3);
    }
}
