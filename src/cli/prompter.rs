//! User prompting.
//!
//! The clarification engine and the preview confirmation ask questions
//! through [`UserPrompter`], so the pipeline runs unchanged in a terminal,
//! in scripts and in tests.

use crate::models::ClarificationQuestion;
use crate::observability::{OutputGate, output_gate};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

/// Asks the user questions.
pub trait UserPrompter: Send + Sync {
    /// Asks a clarification question.
    ///
    /// Returns `Ok(None)` when the user skips it.
    ///
    /// # Errors
    ///
    /// Returns an error if the input stream fails.
    fn ask(&self, question: &ClarificationQuestion) -> Result<Option<String>>;

    /// Asks a yes/no question.
    ///
    /// # Errors
    ///
    /// Returns an error if the input stream fails.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Never asks: skips every question and accepts every confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractivePrompter;

impl UserPrompter for NonInteractivePrompter {
    fn ask(&self, _question: &ClarificationQuestion) -> Result<Option<String>> {
        Ok(None)
    }

    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Replays canned answers in order.
///
/// Once the answers run out, questions are skipped. Confirmations return
/// the configured value.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    confirm: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    /// Creates a prompter that confirms and answers with `answers`.
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            confirm: true,
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Sets the confirmation answer.
    #[must_use]
    pub const fn with_confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    /// Questions and confirmations seen so far.
    #[must_use]
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&self, text: &str) {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(text.to_string());
        }
    }
}

impl UserPrompter for ScriptedPrompter {
    fn ask(&self, question: &ClarificationQuestion) -> Result<Option<String>> {
        self.record(&question.question);
        let mut answers = self
            .answers
            .lock()
            .map_err(|e| Error::operation("scripted_prompt", e))?;
        Ok(answers.pop_front())
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        self.record(message);
        Ok(self.confirm)
    }
}

/// Asks on stderr and reads answers from stdin.
///
/// Log output is held back through the [`OutputGate`] while a question is
/// pending. A numeric answer selects one of the offered choices; an empty
/// answer skips.
#[derive(Debug, Clone)]
pub struct TerminalPrompter {
    gate: OutputGate,
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self {
            gate: output_gate().clone(),
        }
    }
}

impl TerminalPrompter {
    /// Creates a prompter using the process-wide output gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_line(&self, prompt: &str) -> Result<String> {
        let _pause = self.gate.pause();
        let mut stderr = io::stderr().lock();
        stderr
            .write_all(prompt.as_bytes())
            .and_then(|()| stderr.flush())
            .map_err(|e| Error::operation("prompt_write", e))?;
        drop(stderr);

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| Error::operation("prompt_read", e))?;
        Ok(line.trim().to_string())
    }
}

/// Maps a raw answer onto the offered choices.
#[must_use]
pub fn resolve_answer(raw: &str, choices: &[String]) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| choices.get(i).cloned())
        .or_else(|| Some(raw.to_string()))
}

/// Renders a question with numbered choices.
#[must_use]
pub fn render_question(question: &ClarificationQuestion) -> String {
    let mut text = format!("\n[{}] {}\n", question.impact.as_str(), question.question);
    for (i, choice) in question.choices.iter().enumerate() {
        text.push_str(&format!("  {}. {choice}\n", i + 1));
    }
    text.push_str("Answer (number or text, empty to skip): ");
    text
}

impl UserPrompter for TerminalPrompter {
    fn ask(&self, question: &ClarificationQuestion) -> Result<Option<String>> {
        let raw = self.read_line(&render_question(question))?;
        Ok(resolve_answer(&raw, &question.choices))
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        let raw = self.read_line(&format!("{message} [Y/n] "))?;
        Ok(!matches!(raw.to_lowercase().as_str(), "n" | "no"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Impact;

    fn question() -> ClarificationQuestion {
        ClarificationQuestion {
            question: "Which file?".to_string(),
            choices: vec!["a.ts".to_string(), "b.ts".to_string()],
            impact: Impact::High,
        }
    }

    #[test]
    fn test_resolve_answer() {
        let choices = question().choices;
        assert_eq!(resolve_answer("2", &choices).as_deref(), Some("b.ts"));
        assert_eq!(resolve_answer("  ", &choices), None);
        assert_eq!(resolve_answer("9", &choices).as_deref(), Some("9"));
        assert_eq!(resolve_answer("0", &choices).as_deref(), Some("0"));
        assert_eq!(resolve_answer("c.ts", &choices).as_deref(), Some("c.ts"));
    }

    #[test]
    fn test_render_question() {
        let text = render_question(&question());
        assert!(text.contains("[high] Which file?"));
        assert!(text.contains("  2. b.ts"));
    }

    #[test]
    fn test_scripted_prompter() {
        let prompter = ScriptedPrompter::new(["a.ts"]).with_confirm(false);
        assert_eq!(prompter.ask(&question()).unwrap().as_deref(), Some("a.ts"));
        assert_eq!(prompter.ask(&question()).unwrap(), None);
        assert!(!prompter.confirm("Proceed?").unwrap());
        assert_eq!(prompter.asked().len(), 3);
    }

    #[test]
    fn test_non_interactive() {
        assert_eq!(NonInteractivePrompter.ask(&question()).unwrap(), None);
        assert!(NonInteractivePrompter.confirm("Proceed?").unwrap());
    }
}
