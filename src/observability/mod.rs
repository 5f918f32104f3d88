//! Observability: logging and metrics.
//!
//! [`init`] installs a `tracing-subscriber` registry with an `EnvFilter`
//! and a pretty or JSON `fmt` layer. Terminal output goes through the
//! process-wide [`OutputGate`] so clarification prompts are never interleaved
//! with log lines. With a log file configured, output goes there instead.

mod gate;
mod metrics;

pub use gate::{GatedStderr, OutputGate, PauseGuard, output_gate};
pub use metrics::{MetricsHandle, install_prometheus};

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Options from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// `--verbose`: debug level unless a filter is set explicitly.
    pub verbose: bool,
    /// `--metrics`: install the Prometheus recorder.
    pub metrics: bool,
}

/// Handle for observability runtime components.
#[derive(Debug, Default)]
pub struct ObservabilityHandle {
    metrics: Option<MetricsHandle>,
}

impl ObservabilityHandle {
    /// Returns the metrics handle when metrics are enabled.
    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsHandle> {
        self.metrics.as_ref()
    }
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Builds the filter: `TASKSCOPE_LOG`, then `RUST_LOG`, then the configured
/// level, then `debug` when verbose, else `warn`.
#[must_use]
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    let directive = std::env::var("TASKSCOPE_LOG")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .or_else(|| config.level.clone())
        .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string());
    EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        let _ = writeln!(
            io::stderr(),
            "taskscope: ignoring invalid log filter '{directive}': {e}"
        );
        EnvFilter::new("warn")
    })
}

/// Initializes logging and metrics for the process.
///
/// # Errors
///
/// Returns an error if observability has already been initialized, the log
/// file cannot be opened, or the metrics recorder cannot be installed.
pub fn init(config: &LoggingConfig, options: InitOptions) -> Result<ObservabilityHandle> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::operation(
            "observability_init",
            "observability already initialized",
        ));
    }

    let metrics = install_prometheus(config.metrics || options.metrics)?;
    let filter = build_filter(config, options.verbose);
    let to_file = config.file.is_some();
    let writer = match &config.file {
        Some(path) => BoxMakeWriter::new(open_log_file(path)?),
        None => BoxMakeWriter::new(output_gate().stderr_writer()),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(true)
                    .with_thread_names(to_file),
            )
            .try_init(),
        // Files get full targets and no color; the terminal gets compact lines.
        LogFormat::Pretty if to_file => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_thread_names(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().compact().with_writer(writer).with_target(false))
            .try_init(),
    };
    installed.map_err(|e| Error::operation("observability_init", e))?;

    let _ = OBSERVABILITY_INIT.set(());
    Ok(ObservabilityHandle { metrics })
}

/// Opens a log file for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<Mutex<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_log_dir", e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Mutex::new)
        .map_err(|e| Error::operation("open_log_file", format!("{}: {e}", path.display())))
}
