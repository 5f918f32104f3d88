//! Build and test verification.
//!
//! Runs after the agent modified files. Commands come from configuration or
//! are detected from the project manifest:
//!
//! | Manifest | Build | Test |
//! |----------|-------|------|
//! | `Cargo.toml` | `cargo build` | `cargo test` |
//! | `package.json` | `npm run build --if-present` | `npm test` |
//! | `go.mod` | `go build ./...` | `go test ./...` |
//! | `pyproject.toml`, `setup.py`, `pytest.ini` | none | `pytest` |
//!
//! A failing build skips the test step. Failures are reported in the
//! [`VerificationReport`], never raised.

use crate::config::VerificationConfig;
use crate::models::{CommandReport, VerificationReport};
use crate::services::process::ShellCommand;
use crate::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// Runs post-change verification.
pub trait Verifier: Send + Sync {
    /// Verifies the project at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if verification could not run at all, for example
    /// when no command is known or a process cannot be spawned.
    fn verify(&self, root: &Path) -> Result<VerificationReport>;
}

/// Build and test commands for a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationCommands {
    /// Build command.
    pub build: Option<String>,
    /// Test command.
    pub test: Option<String>,
}

impl VerificationCommands {
    /// Detects commands from the manifest files in `root`.
    #[must_use]
    pub fn detect(root: &Path) -> Self {
        let has = |name: &str| root.join(name).is_file();
        let (build, test) = if has("Cargo.toml") {
            (Some("cargo build"), Some("cargo test"))
        } else if has("package.json") {
            (Some("npm run build --if-present"), Some("npm test"))
        } else if has("go.mod") {
            (Some("go build ./..."), Some("go test ./..."))
        } else if has("pyproject.toml") || has("setup.py") || has("pytest.ini") {
            (None, Some("pytest"))
        } else {
            (None, None)
        };
        Self {
            build: build.map(str::to_string),
            test: test.map(str::to_string),
        }
    }

    /// Returns true if neither command is known.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.build.is_none() && self.test.is_none()
    }
}

/// Runs build and test commands as external processes.
#[derive(Debug, Clone, Default)]
pub struct CommandVerifier {
    config: VerificationConfig,
}

impl CommandVerifier {
    /// Creates a verifier.
    #[must_use]
    pub const fn new(config: VerificationConfig) -> Self {
        Self { config }
    }

    /// Returns the commands to run: configured ones win over detected ones.
    #[must_use]
    pub fn commands(&self, root: &Path) -> VerificationCommands {
        let detected = VerificationCommands::detect(root);
        VerificationCommands {
            build: self.config.build_command.clone().or(detected.build),
            test: self.config.test_command.clone().or(detected.test),
        }
    }

    fn step(
        command: &str,
        root: &Path,
        timeout: Duration,
        step: &'static str,
    ) -> Result<CommandReport> {
        tracing::info!(step, command, "Running verification step");
        let report = ShellCommand::new(command, root, timeout).run()?;
        let outcome = if report.timed_out {
            "timeout"
        } else if report.success {
            "success"
        } else {
            "failure"
        };
        metrics::counter!("verification_steps_total", "step" => step, "outcome" => outcome)
            .increment(1);
        metrics::histogram!("verification_step_duration_ms", "step" => step)
            .record(report.duration_ms as f64);
        Ok(report)
    }
}

impl Verifier for CommandVerifier {
    #[instrument(skip(self), fields(operation = "verify", root = %root.display()))]
    fn verify(&self, root: &Path) -> Result<VerificationReport> {
        let commands = self.commands(root);
        if commands.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no build or test command configured or detected in {}",
                root.display()
            )));
        }

        let mut report = VerificationReport::default();
        if let Some(build) = &commands.build {
            let build_report = Self::step(build, root, self.config.build_timeout, "build")?;
            let failed = !build_report.success;
            report.build = Some(build_report);
            if failed {
                tracing::warn!(command = %build, "Build failed, skipping tests");
                return Ok(report);
            }
        }
        if let Some(test) = &commands.test {
            report.tests = Some(Self::step(test, root, self.config.test_timeout, "test")?);
        }
        Ok(report)
    }
}
