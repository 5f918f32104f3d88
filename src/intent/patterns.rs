//! Task intent detection patterns.
//!
//! Static pattern data for keyword-based intent detection.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::models::TaskType;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// An intent signal pattern with its task type.
#[derive(Debug)]
pub struct IntentSignal {
    /// The regex pattern to match.
    pub pattern: Regex,
    /// The task type this pattern indicates.
    pub task_type: TaskType,
}

fn signal(pattern: &str, task_type: TaskType) -> IntentSignal {
    IntentSignal {
        pattern: Regex::new(pattern).expect("static regex: intent signal"),
        task_type,
    }
}

/// Static intent signals.
pub static INTENT_SIGNALS: LazyLock<Vec<IntentSignal>> = LazyLock::new(|| {
    vec![
        // Fix
        signal(
            r"(?i)\b(fix|bug|bugs|broken|crash(es|ing)?|debug|resolve|repair)\b",
            TaskType::Fix,
        ),
        signal(
            r"(?i)\b(error|exception|fail(s|ing|ure)?|not\s+working|doesn'?t\s+work)\b",
            TaskType::Fix,
        ),
        // Test
        signal(
            r"(?i)\b(unit|integration|e2e|end-to-end)\s+tests?\b",
            TaskType::Test,
        ),
        signal(r"(?i)\b(tests?|specs?|coverage|testing)\b", TaskType::Test),
        // Refactor
        signal(
            r"(?i)\b(refactor|restructure|reorganize|simplify|decouple|clean\s*up|extract)\b",
            TaskType::Refactor,
        ),
        // Document
        signal(
            r"(?i)\b(document|documentation|docs|readme|docstrings?|jsdoc|changelog)\b",
            TaskType::Document,
        ),
        // Configure
        signal(
            r"(?i)\b(configure|configuration|config|set\s*up|setup|install|env(ironment)?\s+var(iable)?s?)\b",
            TaskType::Configure,
        ),
        // Create
        signal(
            r"(?i)\b(add|create|implement|build|generate|introduce|write|new)\b",
            TaskType::Create,
        ),
        // Modify
        signal(
            r"(?i)\b(update|change|modify|improve|extend|enhance|adjust|replace|migrate|upgrade|rename)\b",
            TaskType::Modify,
        ),
        // Analyze
        signal(
            r"(?i)\b(analy[sz]e|review|audit|investigate|inspect|understand|explain|examine)\b",
            TaskType::Analyze,
        ),
        signal(
            r"(?i)\b(show|list|display|find|where\s+is|what\s+(is|does|are))\b",
            TaskType::Analyze,
        ),
    ]
});

/// Tie-break order when signals for several task types match.
pub const INTENT_PRIORITY: [TaskType; 8] = [
    TaskType::Fix,
    TaskType::Test,
    TaskType::Refactor,
    TaskType::Document,
    TaskType::Configure,
    TaskType::Create,
    TaskType::Modify,
    TaskType::Analyze,
];

/// Common English stop words.
pub static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do",
        "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can",
        "need", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
        "my", "your", "his", "its", "our", "their", "this", "that", "these", "those", "what",
        "which", "who", "whom", "how", "when", "where", "why", "all", "each", "every", "both",
        "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same",
        "so", "than", "too", "very", "just", "about", "also", "now", "here", "there", "up",
        "down", "out", "if", "then", "into", "through", "during", "before", "after", "above",
        "below", "between", "under", "again", "further", "once", "any", "something", "anything",
        "nothing", "please", "make", "sure", "first", "next", "finally", "new", "existing",
    ]
    .into_iter()
    .collect()
});
