//! Sub-task and execution plan types.

use super::retrieval::{FileKind, RetrievedFile};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a sub-task, unique within one decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates the ID for the n-th task (`task-1`, `task-2`, ...).
    #[must_use]
    pub fn sequential(n: usize) -> Self {
        Self(format!("task-{n}"))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of work a sub-task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Read and explain existing code.
    Analyze,
    /// Add new code.
    Create,
    /// Change existing behavior.
    Modify,
    /// Restructure without changing behavior.
    Refactor,
    /// Write or update tests.
    Test,
    /// Repair a defect.
    Fix,
    /// Write documentation.
    Document,
    /// Change configuration.
    Configure,
    /// Anything else.
    #[default]
    General,
}

impl TaskType {
    /// Returns all task type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Analyze,
            Self::Create,
            Self::Modify,
            Self::Refactor,
            Self::Test,
            Self::Fix,
            Self::Document,
            Self::Configure,
            Self::General,
        ]
    }

    /// Returns the task type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Refactor => "refactor",
            Self::Test => "test",
            Self::Fix => "fix",
            Self::Document => "document",
            Self::Configure => "configure",
            Self::General => "general",
        }
    }

    /// Parses a task type from a label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "analyze" | "analysis" | "explain" | "query" => Some(Self::Analyze),
            "create" | "add" | "implement" => Some(Self::Create),
            "modify" | "update" | "change" => Some(Self::Modify),
            "refactor" => Some(Self::Refactor),
            "test" | "testing" => Some(Self::Test),
            "fix" | "bugfix" | "debug" => Some(Self::Fix),
            "document" | "docs" | "documentation" => Some(Self::Document),
            "configure" | "config" | "configuration" => Some(Self::Configure),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    /// Base priority used for ordering; lower runs earlier.
    #[must_use]
    pub const fn base_priority(&self) -> u32 {
        match self {
            Self::Analyze => 1,
            Self::Configure => 2,
            Self::Create | Self::Fix => 3,
            Self::Modify => 4,
            Self::Refactor | Self::General => 5,
            Self::Test => 6,
            Self::Document => 7,
        }
    }

    /// Weight contributed to the complexity estimate.
    #[must_use]
    pub const fn complexity_weight(&self) -> u32 {
        match self {
            Self::Refactor => 2,
            Self::Create | Self::Modify | Self::Fix | Self::Test => 1,
            Self::Analyze | Self::Document | Self::Configure | Self::General => 0,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rough size estimate of a sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Small, local change.
    #[default]
    Low,
    /// A few files.
    Medium,
    /// Cross-cutting change.
    High,
}

impl Complexity {
    /// Maps a numeric score to a level.
    #[must_use]
    pub const fn from_score(score: u32) -> Self {
        match score {
            0 => Self::Low,
            1 | 2 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Returns the complexity as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Narrows retrieved files to those relevant for one sub-task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFilter {
    /// Glob patterns; a file matching any of them is kept.
    pub globs: Vec<String>,
    /// File kinds; a file of any of these kinds is kept.
    pub kinds: Vec<FileKind>,
    /// Maximum number of files kept.
    pub max_files: usize,
}

impl ContextFilter {
    /// Returns the filter for a task type.
    #[must_use]
    pub fn for_task_type(task_type: TaskType) -> Self {
        let (globs, kinds, max_files): (&[&str], &[FileKind], usize) = match task_type {
            TaskType::Test => (
                &[
                    "**/*.test.*",
                    "**/*.spec.*",
                    "**/*_test.*",
                    "**/test/**",
                    "**/tests/**",
                ],
                &[FileKind::Test],
                8,
            ),
            TaskType::Document => (
                &["**/*.md", "**/docs/**"],
                &[FileKind::Documentation, FileKind::Source],
                6,
            ),
            TaskType::Configure => (
                &[
                    "**/*.json",
                    "**/*.toml",
                    "**/*.yaml",
                    "**/*.yml",
                    "**/.env*",
                    "**/*.config.*",
                ],
                &[FileKind::Config],
                6,
            ),
            TaskType::Analyze => (&[], FileKind::all(), 15),
            TaskType::Refactor => (&[], &[FileKind::Source], 12),
            TaskType::Fix => (&[], &[FileKind::Source, FileKind::Test], 8),
            TaskType::Create | TaskType::Modify | TaskType::General => {
                (&[], &[FileKind::Source, FileKind::Config], 10)
            },
        };
        Self {
            globs: globs.iter().map(|g| (*g).to_string()).collect(),
            kinds: kinds.to_vec(),
            max_files,
        }
    }

    /// Applies the filter.
    ///
    /// Keeps files matching any glob or any allowed kind, in input order, up
    /// to `max_files`. When nothing matches, the unfiltered input truncated
    /// to `max_files` is returned instead.
    #[must_use]
    pub fn apply(&self, files: &[RetrievedFile]) -> Vec<RetrievedFile> {
        let globs = self.compile();
        let kept: Vec<RetrievedFile> = files
            .iter()
            .filter(|f| {
                self.kinds.contains(&f.kind)
                    || globs
                        .as_ref()
                        .is_some_and(|set| set.is_match(f.path.replace('\\', "/")))
            })
            .take(self.max_files)
            .cloned()
            .collect();

        if kept.is_empty() {
            files.iter().take(self.max_files).cloned().collect()
        } else {
            kept
        }
    }

    fn compile(&self) -> Option<GlobSet> {
        if self.globs.is_empty() {
            return None;
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.globs {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                },
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "Invalid context glob"),
            }
        }
        builder.build().ok()
    }
}

/// One focused unit of work derived from a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Unique ID within the decomposition.
    pub id: TaskId,
    /// Kind of work.
    pub task_type: TaskType,
    /// Segment text this task was derived from.
    pub description: String,
    /// Search terms for retrieval (case preserved).
    pub search_terms: Vec<String>,
    /// Ordering key; lower runs earlier.
    pub priority: u32,
    /// Tasks that must finish first.
    pub dependencies: Vec<TaskId>,
    /// Size estimate.
    pub complexity: Complexity,
    /// Retrieval narrowing rule.
    pub context_filter: ContextFilter,
}

impl SubTask {
    /// Returns the query text used for retrieval.
    ///
    /// Falls back to the description when no search terms survived filtering.
    #[must_use]
    pub fn search_query(&self) -> String {
        if self.search_terms.is_empty() {
            self.description.clone()
        } else {
            self.search_terms.join(" ")
        }
    }
}

/// A set of tasks that may run together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPhase {
    /// Zero-based phase index.
    pub index: usize,
    /// Task IDs in priority order.
    pub task_ids: Vec<TaskId>,
}

/// Ordered phases of runnable sub-tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Phases in execution order.
    pub phases: Vec<ExecutionPhase>,
    /// Set when remaining tasks had to be flushed into one phase.
    pub cycle_detected: bool,
}

impl ExecutionPlan {
    /// Returns the phase index of a task.
    #[must_use]
    pub fn phase_of(&self, id: &TaskId) -> Option<usize> {
        self.phases
            .iter()
            .find(|p| p.task_ids.contains(id))
            .map(|p| p.index)
    }

    /// Total number of scheduled tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.task_ids.len()).sum()
    }
}

/// Result of decomposing a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    /// Whether the query needs the multi-task path.
    pub is_complex: bool,
    /// Sub-tasks ordered by priority.
    pub tasks: Vec<SubTask>,
    /// Phased execution plan.
    pub plan: ExecutionPlan,
}

impl Decomposition {
    /// Looks up a task by ID.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&SubTask> {
        self.tasks.iter().find(|t| &t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn file(path: &str, kind: FileKind, similarity: f32) -> RetrievedFile {
        RetrievedFile::new(path, kind, similarity)
    }

    #[test_case(TaskType::Test, 8)]
    #[test_case(TaskType::Document, 6)]
    #[test_case(TaskType::Configure, 6)]
    #[test_case(TaskType::Analyze, 15)]
    #[test_case(TaskType::Refactor, 12)]
    #[test_case(TaskType::Fix, 8)]
    #[test_case(TaskType::Create, 10)]
    #[test_case(TaskType::General, 10)]
    fn test_filter_caps(task_type: TaskType, cap: usize) {
        assert_eq!(ContextFilter::for_task_type(task_type).max_files, cap);
    }

    #[test]
    fn test_filter_keeps_globs_and_kinds() {
        let files = vec![
            file("src/auth/login.ts", FileKind::Source, 0.9),
            file("src/auth/login.test.ts", FileKind::Source, 0.8),
            file("tests/auth_flow.rs", FileKind::Test, 0.7),
        ];
        let kept = ContextFilter::for_task_type(TaskType::Test).apply(&files);
        let paths: Vec<&str> = kept.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/auth/login.test.ts", "tests/auth_flow.rs"]);
    }

    #[test]
    fn test_filter_falls_back_when_nothing_matches() {
        let files: Vec<RetrievedFile> = (0..10)
            .map(|i| file(&format!("src/m{i}.ts"), FileKind::Source, 0.5))
            .collect();
        let kept = ContextFilter::for_task_type(TaskType::Configure).apply(&files);
        assert_eq!(kept.len(), 6);
        assert_eq!(kept[0].path, "src/m0.ts");
    }

    #[test]
    fn test_complexity_from_score() {
        assert_eq!(Complexity::from_score(0), Complexity::Low);
        assert_eq!(Complexity::from_score(2), Complexity::Medium);
        assert_eq!(Complexity::from_score(5), Complexity::High);
    }

    #[test]
    fn test_task_type_parse() {
        for t in TaskType::all() {
            assert_eq!(TaskType::parse(t.as_str()), Some(*t));
        }
        assert_eq!(TaskType::parse("bugfix"), Some(TaskType::Fix));
        assert_eq!(TaskType::parse("nope"), None);
    }

    #[test]
    fn test_analyze_sorts_before_test() {
        assert!(TaskType::Analyze.base_priority() < TaskType::Refactor.base_priority());
        assert!(TaskType::Refactor.base_priority() < TaskType::Test.base_priority());
    }
}
