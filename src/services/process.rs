//! External process execution with a time budget.
//!
//! Commands run through the platform shell on a private current-thread
//! tokio runtime. The child is spawned with `kill_on_drop`, so an elapsed
//! timeout kills it. When the caller is already inside a tokio runtime the
//! work moves to a helper thread to avoid nesting runtimes.

use crate::models::CommandReport;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Captured output beyond this many bytes keeps only its tail.
pub const MAX_CAPTURED_BYTES: usize = 16 * 1024;

/// A command to run.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    /// Command line, interpreted by the shell.
    pub command: String,
    /// Working directory.
    pub cwd: PathBuf,
    /// Time budget.
    pub timeout: Duration,
    /// Text written to stdin.
    pub stdin: Option<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    /// Creates a command without stdin or extra environment.
    #[must_use]
    pub fn new(command: impl Into<String>, cwd: &Path, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.to_path_buf(),
            timeout,
            stdin: None,
            env: Vec::new(),
        }
    }

    /// Sets the text written to stdin.
    #[must_use]
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Runs the command to completion or until the timeout elapses.
    ///
    /// A non-zero exit or a timeout is reported in the [`CommandReport`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or its output
    /// cannot be collected.
    pub fn run(self) -> Result<CommandReport> {
        if tokio::runtime::Handle::try_current().is_ok() {
            std::thread::spawn(move || self.run_blocking())
                .join()
                .map_err(|_| Error::operation("run_command", "process thread panicked"))?
        } else {
            self.run_blocking()
        }
    }

    fn run_blocking(self) -> Result<CommandReport> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::operation("process_runtime", e))?;
        runtime.block_on(self.run_async())
    }

    async fn run_async(self) -> Result<CommandReport> {
        let start = Instant::now();
        let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };

        let mut cmd = tokio::process::Command::new(shell);
        cmd.arg(flag)
            .arg(&self.command)
            .current_dir(&self.cwd)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::operation("spawn_process", format!("{}: {e}", self.command)))?;

        if let (Some(input), Some(mut pipe)) = (self.stdin, child.stdin.take()) {
            // Written concurrently so a chatty child cannot deadlock on a full pipe.
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    tracing::debug!(error = %e, "Child closed stdin early");
                }
            });
        }

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let report = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => CommandReport {
                command: self.command,
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: tail(&String::from_utf8_lossy(&output.stdout)),
                stderr: tail(&String::from_utf8_lossy(&output.stderr)),
                duration_ms: elapsed_ms(start),
                timed_out: false,
            },
            Ok(Err(e)) => {
                return Err(Error::operation("wait_process", format!("{}: {e}", self.command)));
            },
            Err(_) => {
                tracing::warn!(command = %self.command, timeout_ms, "Command timed out");
                CommandReport {
                    command: self.command,
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("timed out after {timeout_ms}ms"),
                    duration_ms: elapsed_ms(start),
                    timed_out: true,
                }
            },
        };
        Ok(report)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Keeps the last [`MAX_CAPTURED_BYTES`] of the text, on a char boundary.
#[must_use]
pub fn tail(text: &str) -> String {
    if text.len() <= MAX_CAPTURED_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - MAX_CAPTURED_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn cwd() -> PathBuf {
        std::env::temp_dir()
    }

    #[test]
    fn test_success_and_output() {
        let report = ShellCommand::new("echo hello; echo oops >&2", &cwd(), Duration::from_secs(10))
            .run()
            .unwrap();
        assert!(report.success);
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.stdout.trim(), "hello");
        assert_eq!(report.stderr.trim(), "oops");
    }

    #[test]
    fn test_failure_is_reported() {
        let report = ShellCommand::new("exit 3", &cwd(), Duration::from_secs(10))
            .run()
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.exit_code, Some(3));
        assert!(!report.timed_out);
    }

    #[test]
    fn test_timeout_kills() {
        let report = ShellCommand::new("sleep 5", &cwd(), Duration::from_millis(100))
            .run()
            .unwrap();
        assert!(report.timed_out);
        assert!(!report.success);
        assert!(report.duration_ms < 5000);
    }

    #[test]
    fn test_stdin_and_env() {
        let report = ShellCommand::new("cat; printf \"$GREETING\"", &cwd(), Duration::from_secs(10))
            .with_stdin("prompt text\n")
            .with_env("GREETING", "hi")
            .run()
            .unwrap();
        assert_eq!(report.stdout, "prompt text\nhi");
    }

    #[test]
    fn test_tail_keeps_end() {
        let long = "x".repeat(MAX_CAPTURED_BYTES) + "end";
        let t = tail(&long);
        assert_eq!(t.len(), MAX_CAPTURED_BYTES);
        assert!(t.ends_with("end"));
    }
}
