//! Pausable terminal output.
//!
//! Log output and interactive prompts share stderr. While a prompt is
//! pending the [`OutputGate`] buffers log lines, and releases them when the
//! [`PauseGuard`] drops.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

#[derive(Debug, Default)]
struct GateState {
    paused: usize,
    buffered: Vec<u8>,
}

/// Shared switch between live and buffered log output.
#[derive(Debug, Clone, Default)]
pub struct OutputGate {
    state: Arc<Mutex<GateState>>,
}

static GLOBAL_GATE: OnceLock<OutputGate> = OnceLock::new();

/// Returns the process-wide gate used by the stderr log writer.
pub fn output_gate() -> &'static OutputGate {
    GLOBAL_GATE.get_or_init(OutputGate::new)
}

impl OutputGate {
    /// Creates an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // A poisoned gate still holds valid bytes.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Pauses output until the returned guard drops. Pauses nest.
    #[must_use = "output resumes as soon as the guard is dropped"]
    pub fn pause(&self) -> PauseGuard {
        self.lock().paused += 1;
        PauseGuard { gate: self.clone() }
    }

    /// Returns true while at least one pause is active.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().paused > 0
    }

    /// Number of bytes held back.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.lock().buffered.len()
    }

    fn write_through(&self, buf: &[u8], sink: &mut dyn Write) -> io::Result<()> {
        let mut state = self.lock();
        if state.paused > 0 {
            state.buffered.extend_from_slice(buf);
            Ok(())
        } else {
            sink.write_all(buf)
        }
    }

    fn resume(&self, sink: &mut dyn Write) {
        let pending = {
            let mut state = self.lock();
            state.paused = state.paused.saturating_sub(1);
            if state.paused > 0 {
                return;
            }
            std::mem::take(&mut state.buffered)
        };
        if !pending.is_empty() {
            let _ = sink.write_all(&pending);
            let _ = sink.flush();
        }
    }

    /// Returns a `MakeWriter` writing to stderr through this gate.
    #[must_use]
    pub fn stderr_writer(&self) -> GatedStderr {
        GatedStderr { gate: self.clone() }
    }
}

/// Resumes output when dropped.
#[derive(Debug)]
pub struct PauseGuard {
    gate: OutputGate,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.gate.resume(&mut io::stderr().lock());
    }
}

/// Stderr writer that honours an [`OutputGate`].
#[derive(Debug, Clone)]
pub struct GatedStderr {
    gate: OutputGate,
}

impl Write for GatedStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.gate.write_through(buf, &mut io::stderr().lock())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().lock().flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for GatedStderr {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
