//! Workflow orchestration.
//!
//! The orchestrator sequences the pipeline as a state machine:
//!
//! ```text
//! Decompose → PreviewAndConfirm ─┬─ SimplePath ──┐
//!                                └─ ComplexPath ─┴→ BuildTestVerify → IndexSync → Done
//!                          (any state) ──────────────────────────────────────────→ Error
//! ```
//!
//! - **Simple path**: retrieve, analyze, clarify, assemble, run the agent.
//! - **Complex path**: phases in plan order. Retrieval and analysis for the
//!   tasks of one phase run concurrently on scoped threads; clarification,
//!   assembly and the agent run per task in priority order. Only the first
//!   sub-task may ask questions. Tasks whose dependencies failed are skipped.
//!
//! [`WorkflowOrchestrator::run`] never returns an error: every collaborator
//! failure becomes a fallback or a field of the [`WorkflowResult`].

use crate::agent::{CodeAgent, select_agent};
use crate::cli::prompter::{NonInteractivePrompter, UserPrompter};
use crate::config::TaskscopeConfig;
use crate::intent::IntentClassifier;
use crate::models::{
    Clarification, Decomposition, EnhancedContext, GraphContext, ProjectId, RetrievedFile,
    RunStatus, SubTask, SyncReport, TaskId, TaskOutcome, TaskResult, TaskType, WorkflowResult,
    WorkflowState,
};
use crate::services::aggregation::Aggregate;
use crate::services::index_sync::{GraphIndexSync, IndexSync};
use crate::services::retrieval_cache::RetrievalCache;
use crate::services::verification::{CommandVerifier, Verifier};
use crate::services::{
    ClarificationEngine, ContextAssembler, FileRetriever, RelationshipAnalyzer, TaskDecomposer,
};
use crate::storage::{CodeGraphStore, TextIndex};
use crate::Result;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::instrument;

/// Files listed in the preview at most.
const PREVIEW_FILES: usize = 10;

/// Cooperative cancellation flag shared between the caller and a run.
///
/// Checked between phases and before each agent call; an in-flight agent
/// call is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Never ask clarifying questions.
    pub skip_clarification: bool,
    /// Do not ask for confirmation after the preview.
    pub skip_file_confirmation: bool,
    /// Do not run build and tests after changes.
    pub skip_build_test: bool,
    /// Do not update the index after changes.
    pub skip_index_sync: bool,
    /// Disables clarification and confirmation.
    pub transparent: bool,
    /// Caps retrieved files per task below the configured maximum.
    pub max_results: Option<usize>,
}

impl RunOptions {
    /// Options for unattended runs.
    #[must_use]
    pub fn transparent() -> Self {
        Self {
            transparent: true,
            ..Self::default()
        }
    }

    const fn clarification_enabled(&self) -> bool {
        !self.transparent && !self.skip_clarification
    }

    const fn confirmation_enabled(&self) -> bool {
        !self.transparent && !self.skip_file_confirmation
    }
}

/// Retrieval and analysis output for one task.
struct Prepared {
    files: Vec<RetrievedFile>,
    graph: GraphContext,
}

/// Builder for [`WorkflowOrchestrator`].
pub struct WorkflowOrchestratorBuilder {
    root: PathBuf,
    store: Arc<dyn CodeGraphStore>,
    config: TaskscopeConfig,
    prompter: Option<Arc<dyn UserPrompter>>,
    agent: Option<Arc<dyn CodeAgent>>,
    verifier: Option<Arc<dyn Verifier>>,
    index_sync: Option<Arc<dyn IndexSync>>,
    text_index: Option<Arc<dyn TextIndex>>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    cancellation: CancellationToken,
}

impl WorkflowOrchestratorBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: TaskscopeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how questions are asked. Defaults to never asking.
    #[must_use]
    pub fn prompter(mut self, prompter: Arc<dyn UserPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Sets the agent. Defaults to [`select_agent`].
    #[must_use]
    pub fn agent(mut self, agent: Arc<dyn CodeAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Sets the verifier. Defaults to [`CommandVerifier`].
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Sets the index sync. Defaults to [`GraphIndexSync`] over the store.
    #[must_use]
    pub fn index_sync(mut self, index_sync: Arc<dyn IndexSync>) -> Self {
        self.index_sync = Some(index_sync);
        self
    }

    /// Adds a text index for retrieval and sync.
    #[must_use]
    pub fn text_index(mut self, index: Arc<dyn TextIndex>) -> Self {
        self.text_index = Some(index);
        self
    }

    /// Sets the decomposer's fallback intent classifier.
    #[must_use]
    pub fn classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Builds the orchestrator.
    #[must_use]
    pub fn build(self) -> WorkflowOrchestrator {
        let config = self.config;
        let cache = Arc::new(RetrievalCache::new(
            config.retrieval.discovery_ttl,
            config.retrieval.preview_cache_capacity,
        ));

        let mut retriever = FileRetriever::with_cache(config.retrieval, Arc::clone(&cache));
        let mut decomposer = TaskDecomposer::new(config.decomposition);
        if let Some(classifier) = self.classifier {
            decomposer = decomposer.with_classifier(classifier);
        }
        let index_sync = self.index_sync.unwrap_or_else(|| {
            let mut sync =
                GraphIndexSync::new(Arc::clone(&self.store)).with_cache(Arc::clone(&cache));
            if let Some(index) = &self.text_index {
                sync = sync.with_text_index(Arc::clone(index));
            }
            Arc::new(sync)
        });
        if let Some(index) = self.text_index {
            retriever = retriever.with_text_index(index);
        }

        WorkflowOrchestrator {
            agent: self
                .agent
                .unwrap_or_else(|| select_agent(&config.agent, &self.root)),
            verifier: self
                .verifier
                .unwrap_or_else(|| Arc::new(CommandVerifier::new(config.verification.clone()))),
            prompter: self
                .prompter
                .unwrap_or_else(|| Arc::new(NonInteractivePrompter)),
            analyzer: RelationshipAnalyzer::new(self.store).with_config(config.analysis),
            clarifier: ClarificationEngine::new(config.clarification),
            assembler: ContextAssembler::new(config.context),
            decomposer,
            retriever,
            index_sync,
            cancellation: self.cancellation,
            root: self.root,
            config,
        }
    }
}

/// Runs queries through the full pipeline.
pub struct WorkflowOrchestrator {
    root: PathBuf,
    config: TaskscopeConfig,
    decomposer: TaskDecomposer,
    retriever: FileRetriever,
    analyzer: RelationshipAnalyzer,
    clarifier: ClarificationEngine,
    assembler: ContextAssembler,
    prompter: Arc<dyn UserPrompter>,
    agent: Arc<dyn CodeAgent>,
    verifier: Arc<dyn Verifier>,
    index_sync: Arc<dyn IndexSync>,
    cancellation: CancellationToken,
}

impl WorkflowOrchestrator {
    /// Starts building an orchestrator for a project root and graph store.
    #[must_use]
    pub fn builder(
        root: impl Into<PathBuf>,
        store: Arc<dyn CodeGraphStore>,
    ) -> WorkflowOrchestratorBuilder {
        WorkflowOrchestratorBuilder {
            root: root.into(),
            store,
            config: TaskscopeConfig::default(),
            prompter: None,
            agent: None,
            verifier: None,
            index_sync: None,
            text_index: None,
            classifier: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &TaskscopeConfig {
        &self.config
    }

    /// The decomposer.
    #[must_use]
    pub const fn decomposer(&self) -> &TaskDecomposer {
        &self.decomposer
    }

    /// The retriever.
    #[must_use]
    pub const fn retriever(&self) -> &FileRetriever {
        &self.retriever
    }

    /// The index sync.
    #[must_use]
    pub fn index_sync(&self) -> &dyn IndexSync {
        self.index_sync.as_ref()
    }

    /// The cancellation token of this orchestrator.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Runs a query end to end.
    #[instrument(
        skip(self, query, options),
        fields(operation = "workflow_run", agent = self.agent.name())
    )]
    pub fn run(&self, query: &str, options: &RunOptions) -> WorkflowResult {
        let start = Instant::now();
        let mut result = WorkflowResult::new(query);

        result.enter(WorkflowState::Decompose);
        let decomposition = self.decomposer.decompose(query);
        result.is_complex = decomposition.is_complex;
        result.decomposition = Some(decomposition.clone());
        if decomposition.tasks.is_empty() {
            return fail(result, "decomposition produced no tasks", start);
        }
        if self.cancellation.is_cancelled() {
            return cancel(result, start);
        }

        let project = self.resolve_project();
        let mut aggregate = Aggregate::new();

        if decomposition.is_complex {
            result.enter(WorkflowState::PreviewAndConfirm);
            if !self.confirm(&preview_plan(&decomposition), options) {
                return cancel(result, start);
            }
            result.enter(WorkflowState::ComplexPath);
            self.run_complex(
                &decomposition,
                project.as_ref(),
                options,
                &mut result,
                &mut aggregate,
            );
        } else {
            // One task; the whole query drives retrieval.
            let task = &decomposition.tasks[0];
            let mut prepared = self.prepare(query, task.task_type, project.as_ref(), None, options);

            result.enter(WorkflowState::PreviewAndConfirm);
            if !self.confirm(&preview_files(task, &prepared.files), options) {
                aggregate.extend(&prepared.files, &[], &[]);
                collect(&mut result, aggregate);
                return cancel(result, start);
            }
            result.enter(WorkflowState::SimplePath);
            prepared.graph = self.analyzer.analyze(query, &self.root, &prepared.files);
            let task_result =
                self.execute_task(query, task, prepared, true, options, &mut result, &mut aggregate);
            result.task_results.push(task_result);
        }

        collect(&mut result, aggregate);
        if self.cancellation.is_cancelled() {
            return cancel(result, start);
        }
        result.status = status_of(&result.task_results);

        if !result.modified_files.is_empty() {
            self.verify_and_sync(options, &mut result);
        }

        if result.status == RunStatus::Failed {
            let message = first_failure(&result.task_results)
                .unwrap_or_else(|| "no task completed".to_string());
            return fail(result, &message, start);
        }
        result.enter(WorkflowState::Done);
        finish(result, start)
    }

    /// Builds the prompt for a query without running the agent.
    #[instrument(skip(self, query, options), fields(operation = "build_context"))]
    pub fn build_context(&self, query: &str, options: &RunOptions) -> EnhancedContext {
        let decomposition = self.decomposer.decompose(query);
        let intent = decomposition
            .tasks
            .first()
            .map_or(TaskType::General, |t| t.task_type);
        let project = self.resolve_project();
        let mut prepared = self.prepare(query, intent, project.as_ref(), None, options);
        prepared.graph = self.analyzer.analyze(query, &self.root, &prepared.files);
        let (query, clarifications) = self.clarify(query, intent, &prepared, options);
        self.assembler
            .build(&query, intent, &clarifications, &prepared.files, &prepared.graph)
    }

    /// Retrieves files for a query, using the text index when the project is
    /// registered.
    #[must_use]
    pub fn search(&self, query: &str, max_results: Option<usize>) -> Vec<RetrievedFile> {
        let project = self.resolve_project();
        let mut files = self
            .retriever
            .search_in_project(query, &self.root, project.as_ref());
        if let Some(max) = max_results {
            files.truncate(max);
        }
        files
    }

    /// Re-indexes `paths`, or every discoverable file when `paths` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be updated.
    pub fn reindex(&self, paths: &[String]) -> Result<SyncReport> {
        if !paths.is_empty() {
            return self.index_sync.update_index(&self.root, paths);
        }
        let all: Vec<String> = self
            .retriever
            .discover(&self.root)
            .iter()
            .map(|f| f.relative.clone())
            .collect();
        tracing::info!(files = all.len(), "Re-indexing project");
        self.index_sync.update_index(&self.root, &all)
    }

    fn run_complex(
        &self,
        decomposition: &Decomposition,
        project: Option<&ProjectId>,
        options: &RunOptions,
        result: &mut WorkflowResult,
        aggregate: &mut Aggregate,
    ) {
        let mut failed: HashSet<TaskId> = HashSet::new();
        let first_id = decomposition.tasks.first().map(|t| t.id.clone());

        for phase in &decomposition.plan.phases {
            if self.cancellation.is_cancelled() {
                tracing::info!(phase = phase.index, "Run cancelled between phases");
                return;
            }
            let mut runnable: Vec<&SubTask> = Vec::new();
            for id in &phase.task_ids {
                let Some(task) = decomposition.task(id) else {
                    continue;
                };
                if let Some(dep) = task.dependencies.iter().find(|d| failed.contains(*d)) {
                    tracing::info!(
                        task = %task.id,
                        dependency = %dep,
                        "Skipping task with failed dependency"
                    );
                    failed.insert(task.id.clone());
                    result.task_results.push(TaskResult {
                        task_id: task.id.clone(),
                        task_type: task.task_type,
                        files: Vec::new(),
                        outcome: TaskOutcome::Skipped {
                            reason: format!("dependency {dep} did not complete"),
                        },
                        prompt_chars: 0,
                    });
                } else {
                    runnable.push(task);
                }
            }

            let prepared = self.prepare_phase(&runnable, project, options);
            for (task, prepared) in runnable.into_iter().zip(prepared) {
                if self.cancellation.is_cancelled() {
                    return;
                }
                let first = first_id.as_ref() == Some(&task.id);
                let task_result = self.execute_task(
                    &task.description,
                    task,
                    prepared,
                    first,
                    options,
                    result,
                    aggregate,
                );
                if !task_result.outcome.is_completed() {
                    failed.insert(task.id.clone());
                }
                result.task_results.push(task_result);
            }
        }
    }

    /// Retrieves and analyzes every task of a phase concurrently.
    fn prepare_phase(
        &self,
        tasks: &[&SubTask],
        project: Option<&ProjectId>,
        options: &RunOptions,
    ) -> Vec<Prepared> {
        if tasks.len() <= 1 {
            return tasks
                .iter()
                .map(|t| self.prepare_and_analyze(t, project, options))
                .collect();
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = tasks
                .iter()
                .map(|task| scope.spawn(move || self.prepare_and_analyze(task, project, options)))
                .collect();
            handles
                .into_iter()
                .zip(tasks)
                .map(|(handle, task)| {
                    handle.join().unwrap_or_else(|_| {
                        tracing::error!(task = %task.id, "Task preparation panicked");
                        Prepared {
                            files: Vec::new(),
                            graph: GraphContext {
                                used_fallback: true,
                                ..GraphContext::default()
                            },
                        }
                    })
                })
                .collect()
        })
    }

    fn prepare_and_analyze(
        &self,
        task: &SubTask,
        project: Option<&ProjectId>,
        options: &RunOptions,
    ) -> Prepared {
        let query = task.search_query();
        let mut prepared = self.prepare(&query, task.task_type, project, Some(task), options);
        prepared.graph = self.analyzer.analyze(&query, &self.root, &prepared.files);
        prepared
    }

    /// Retrieval, narrowed by the task's context filter when one is given.
    fn prepare(
        &self,
        query: &str,
        intent: TaskType,
        project: Option<&ProjectId>,
        task: Option<&SubTask>,
        options: &RunOptions,
    ) -> Prepared {
        let mut files = self.retriever.search_in_project(query, &self.root, project);
        if let Some(task) = task {
            files = task.context_filter.apply(&files);
        }
        if let Some(max) = options.max_results {
            files.truncate(max);
        }
        tracing::debug!(intent = %intent, files = files.len(), "Files retrieved");
        Prepared {
            files,
            graph: GraphContext::default(),
        }
    }

    fn clarify(
        &self,
        query: &str,
        intent: TaskType,
        prepared: &Prepared,
        options: &RunOptions,
    ) -> (String, Vec<Clarification>) {
        if !options.clarification_enabled() {
            return (query.to_string(), Vec::new());
        }
        let outcome = self.clarifier.detect_and_ask(
            query,
            intent,
            &prepared.files,
            &prepared.graph,
            self.config.clarification.max_questions,
            self.prompter.as_ref(),
        );
        (outcome.rewritten_query, outcome.clarifications)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_task(
        &self,
        query: &str,
        task: &SubTask,
        prepared: Prepared,
        may_clarify: bool,
        options: &RunOptions,
        result: &mut WorkflowResult,
        aggregate: &mut Aggregate,
    ) -> TaskResult {
        let (query, clarifications) = if may_clarify {
            self.clarify(query, task.task_type, &prepared, options)
        } else {
            (query.to_string(), Vec::new())
        };
        result.clarifications.extend(clarifications.iter().cloned());

        let context = self.assembler.build(
            &query,
            task.task_type,
            &clarifications,
            &prepared.files,
            &prepared.graph,
        );
        aggregate.extend(&prepared.files, &prepared.graph.classes, &prepared.graph.relationships);

        let outcome = match self.agent.execute(&context.prompt) {
            Ok(response) => {
                aggregate.add_modified(&response.modified_files);
                TaskOutcome::Completed { response }
            },
            Err(e) => {
                tracing::warn!(task = %task.id, error = %e, "Agent execution failed");
                TaskOutcome::Failed {
                    error: e.to_string(),
                }
            },
        };
        let label = match &outcome {
            TaskOutcome::Completed { .. } => "completed",
            TaskOutcome::Failed { .. } => "failed",
            TaskOutcome::Skipped { .. } => "skipped",
        };
        metrics::counter!("workflow_tasks_total", "outcome" => label).increment(1);

        TaskResult {
            task_id: task.id.clone(),
            task_type: task.task_type,
            files: prepared.files,
            outcome,
            prompt_chars: context.prompt.chars().count(),
        }
    }

    fn verify_and_sync(&self, options: &RunOptions, result: &mut WorkflowResult) {
        if !options.skip_build_test {
            result.enter(WorkflowState::BuildTestVerify);
            match self.verifier.verify(&self.root) {
                Ok(report) => {
                    if !report.success() {
                        tracing::warn!("Verification failed");
                    }
                    result.verification = Some(report);
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Verification could not run");
                    result.verification_error = Some(e.to_string());
                },
            }
        }
        if self.cancellation.is_cancelled() {
            return;
        }
        if !options.skip_index_sync {
            result.enter(WorkflowState::IndexSync);
            match self.index_sync.update_index(&self.root, &result.modified_files) {
                Ok(report) => result.sync = Some(report),
                Err(e) => {
                    tracing::warn!(error = %e, "Index sync failed");
                    result.sync_error = Some(e.to_string());
                },
            }
        }
    }

    fn confirm(&self, preview: &str, options: &RunOptions) -> bool {
        if !options.confirmation_enabled() {
            return true;
        }
        match self.prompter.confirm(preview) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Confirmation failed, treating as declined");
                false
            },
        }
    }

    fn resolve_project(&self) -> Option<ProjectId> {
        match self.analyzer.resolve_project(&self.root) {
            Ok(project) => project,
            Err(e) => {
                tracing::warn!(error = %e, "Project lookup failed");
                None
            },
        }
    }
}

fn collect(result: &mut WorkflowResult, mut aggregate: Aggregate) {
    aggregate.dedup();
    result.files = aggregate.files;
    result.classes = aggregate.classes;
    result.relationships = aggregate.relationships;
    result.modified_files = aggregate.modified_files;
}

fn cancel(mut result: WorkflowResult, start: Instant) -> WorkflowResult {
    tracing::info!("Workflow cancelled");
    result.status = RunStatus::Cancelled;
    result.enter(WorkflowState::Done);
    finish(result, start)
}

fn fail(mut result: WorkflowResult, message: &str, start: Instant) -> WorkflowResult {
    tracing::error!(error = message, "Workflow failed");
    result.status = RunStatus::Failed;
    result.error = Some(message.to_string());
    result.enter(WorkflowState::Error);
    finish(result, start)
}

fn finish(mut result: WorkflowResult, start: Instant) -> WorkflowResult {
    result.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    metrics::counter!("workflow_runs_total", "status" => result.status.as_str()).increment(1);
    metrics::histogram!("workflow_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);
    tracing::info!(
        status = result.status.as_str(),
        tasks = result.task_results.len(),
        files = result.files.len(),
        modified = result.modified_files.len(),
        duration_ms = result.duration_ms,
        "Workflow finished"
    );
    result
}

/// Overall status from per-task outcomes.
#[must_use]
pub fn status_of(results: &[TaskResult]) -> RunStatus {
    let completed = results.iter().filter(|r| r.outcome.is_completed()).count();
    if results.is_empty() || completed == 0 {
        RunStatus::Failed
    } else if completed == results.len() {
        RunStatus::Completed
    } else {
        RunStatus::PartiallyCompleted
    }
}

fn first_failure(results: &[TaskResult]) -> Option<String> {
    results.iter().find_map(|r| match &r.outcome {
        TaskOutcome::Failed { error } => Some(format!("{}: {error}", r.task_id)),
        _ => None,
    })
}

/// Renders the phased plan shown before a complex run.
#[must_use]
pub fn preview_plan(decomposition: &Decomposition) -> String {
    let mut text = format!(
        "Plan: {} tasks in {} phases\n",
        decomposition.tasks.len(),
        decomposition.plan.phases.len()
    );
    for phase in &decomposition.plan.phases {
        let _ = writeln!(text, "  Phase {}:", phase.index + 1);
        for id in &phase.task_ids {
            if let Some(task) = decomposition.task(id) {
                let _ = writeln!(text, "    {} [{}] {}", task.id, task.task_type, task.description);
            }
        }
    }
    text.push_str("Proceed?");
    text
}

/// Renders the task and files shown before a simple run.
#[must_use]
pub fn preview_files(task: &SubTask, files: &[RetrievedFile]) -> String {
    let mut text = format!("Task [{}]: {}\n", task.task_type, task.description);
    if files.is_empty() {
        text.push_str("No relevant files found.\n");
    } else {
        text.push_str("Files:\n");
        for file in files.iter().take(PREVIEW_FILES) {
            let _ = writeln!(text, "  {} ({:.2})", file.path, file.similarity);
        }
    }
    text.push_str("Proceed?");
    text
}
