//! Binary entry point for taskscope.
//!
//! This binary provides the CLI for the task decomposition and context
//! retrieval workflow.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use taskscope::cli::{
    OutputFormat, TerminalPrompter, UserPrompter, render_config, render_context, render_files,
    render_plan, render_result, render_sync, to_json,
};
use taskscope::config::TaskscopeConfig;
use taskscope::observability::{self, InitOptions};
use taskscope::services::{BackendFactory, CancellationToken, RunOptions, WorkflowOrchestrator};

/// Taskscope - Task decomposition and code context retrieval for coding agents.
#[derive(Parser)]
#[command(name = "taskscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root (default: current directory).
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print Prometheus metrics to stderr on exit.
    #[arg(long, global = true)]
    metrics: bool,

    /// Output format: text or json.
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the full workflow for a request.
    Run {
        /// The request in natural language.
        query: String,

        #[command(flatten)]
        options: RunArgs,
    },

    /// Show the decomposition and execution plan.
    Plan {
        /// The request in natural language.
        query: String,
    },

    /// Show the files retrieved for a query.
    Search {
        /// The search query.
        query: String,

        /// Maximum number of results.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the assembled prompt without running the agent.
    Context {
        /// The request in natural language.
        query: String,

        /// Ask clarifying questions.
        #[arg(long)]
        interactive: bool,
    },

    /// Re-index files in the code graph.
    Sync {
        /// Files to re-index, relative to the root (default: all).
        paths: Vec<String>,
    },

    /// Show the effective configuration.
    Config,
}

/// Switches for `run`.
#[derive(Args)]
struct RunArgs {
    /// Never ask clarifying questions.
    #[arg(long)]
    skip_clarification: bool,

    /// Do not ask for confirmation after the preview.
    #[arg(long)]
    skip_file_confirmation: bool,

    /// Do not run build and tests after changes.
    #[arg(long)]
    skip_build_test: bool,

    /// Do not update the index after changes.
    #[arg(long)]
    skip_index_sync: bool,

    /// Run unattended: no questions, no confirmation.
    #[arg(long)]
    transparent: bool,

    /// Cap retrieved files per task.
    #[arg(long)]
    max_results: Option<usize>,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            skip_clarification: args.skip_clarification,
            skip_file_confirmation: args.skip_file_confirmation,
            skip_build_test: args.skip_build_test,
            skip_index_sync: args.skip_index_sync,
            transparent: args.transparent,
            max_results: args.max_results,
        }
    }
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match TaskscopeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let observability = match observability::init(
        &config.logging,
        InitOptions {
            verbose: cli.verbose,
            metrics: cli.metrics,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let dump_metrics = cli.metrics;
    let code = match run_command(cli, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    };

    if dump_metrics && let Some(handle) = observability.metrics() {
        eprintln!("{}", handle.render());
    }
    code
}

/// Runs the selected command.
fn run_command(cli: Cli, config: TaskscopeConfig) -> Result<ExitCode> {
    let format = OutputFormat::parse(&cli.format);
    let root = resolve_root(cli.root.as_deref())?;
    let config = anchor_data_dir(config, &root);

    match cli.command {
        Commands::Config => {
            print!("{}", render_config(&config));
            Ok(ExitCode::SUCCESS)
        },
        Commands::Run { query, options } => cmd_run(&config, &root, &query, options.into(), format),
        Commands::Plan { query } => cmd_plan(&config, &root, &query, format),
        Commands::Search { query, limit } => cmd_search(&config, &root, &query, limit, format),
        Commands::Context { query, interactive } => {
            cmd_context(&config, &root, &query, interactive, format)
        },
        Commands::Sync { paths } => cmd_sync(&config, &root, &paths, format),
    }
}

/// Canonical project root.
fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    let root = match root {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("project root {} is not accessible", root.display()))
}

/// Resolves a relative data directory against the project root.
fn anchor_data_dir(config: TaskscopeConfig, root: &Path) -> TaskscopeConfig {
    if config.data_dir.is_relative() {
        let dir = root.join(&config.data_dir);
        config.with_data_dir(dir)
    } else {
        config
    }
}

/// Builds an orchestrator over the configured backends.
fn orchestrator(
    config: &TaskscopeConfig,
    root: &Path,
    prompter: Option<Arc<dyn UserPrompter>>,
) -> Result<WorkflowOrchestrator> {
    let backends = BackendFactory::create_all(config).context("failed to open storage")?;
    let mut builder = WorkflowOrchestrator::builder(root, backends.graph)
        .config(config.clone())
        .classifier(BackendFactory::create_classifier(config));
    if let Some(index) = backends.text_index {
        builder = builder.text_index(index);
    }
    if let Some(prompter) = prompter {
        builder = builder.prompter(prompter);
    }
    Ok(builder.build())
}

/// Terminal prompter when stdin is a terminal.
fn interactive_prompter() -> Option<Arc<dyn UserPrompter>> {
    if std::io::stdin().is_terminal() {
        Some(Arc::new(TerminalPrompter::new()))
    } else {
        tracing::debug!("stdin is not a terminal, questions disabled");
        None
    }
}

fn print_output<T: serde::Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce() -> String,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(value)?),
        OutputFormat::Text => print!("{}", text()),
    }
    Ok(())
}

/// Run command.
fn cmd_run(
    config: &TaskscopeConfig,
    root: &Path,
    query: &str,
    options: RunOptions,
    format: OutputFormat,
) -> Result<ExitCode> {
    let prompter = if options.transparent {
        None
    } else {
        interactive_prompter()
    };
    let orchestrator = orchestrator(config, root, prompter)?;

    let token: CancellationToken = orchestrator.cancellation().clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nCancelling after the current step...");
        token.cancel();
    }) {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let result = orchestrator.run(query, &options);
    print_output(format, &result, || render_result(&result))?;

    Ok(if result.status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Plan command.
fn cmd_plan(
    config: &TaskscopeConfig,
    root: &Path,
    query: &str,
    format: OutputFormat,
) -> Result<ExitCode> {
    let orchestrator = orchestrator(config, root, None)?;
    let decomposition = orchestrator.decomposer().decompose(query);
    print_output(format, &decomposition, || render_plan(&decomposition))?;
    Ok(ExitCode::SUCCESS)
}

/// Search command.
fn cmd_search(
    config: &TaskscopeConfig,
    root: &Path,
    query: &str,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let orchestrator = orchestrator(config, root, None)?;
    let files = orchestrator.search(query, limit);
    print_output(format, &files, || render_files(&files))?;
    Ok(ExitCode::SUCCESS)
}

/// Context command.
fn cmd_context(
    config: &TaskscopeConfig,
    root: &Path,
    query: &str,
    interactive: bool,
    format: OutputFormat,
) -> Result<ExitCode> {
    let prompter = if interactive {
        interactive_prompter()
    } else {
        None
    };
    let options = RunOptions {
        skip_clarification: !interactive,
        ..RunOptions::default()
    };
    let orchestrator = orchestrator(config, root, prompter)?;
    let context = orchestrator.build_context(query, &options);
    print_output(format, &context, || render_context(&context))?;
    Ok(ExitCode::SUCCESS)
}

/// Sync command.
fn cmd_sync(
    config: &TaskscopeConfig,
    root: &Path,
    paths: &[String],
    format: OutputFormat,
) -> Result<ExitCode> {
    let orchestrator = orchestrator(config, root, None)?;
    let report = orchestrator.reindex(paths).context("index sync failed")?;
    print_output(format, &report, || render_sync(&report))?;
    Ok(ExitCode::SUCCESS)
}
