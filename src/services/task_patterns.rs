//! Static text patterns for task decomposition.
//!
//! Action verbs, sequencing markers and the noun lists that promote a task
//! to `test` or `document`.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::intent::STOP_WORDS;
use crate::models::TaskType;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Action verbs in lookup order.
///
/// The first word of a segment found in this table decides its task type.
pub const ACTION_VERBS: &[(&str, TaskType)] = &[
    ("analyze", TaskType::Analyze),
    ("analyse", TaskType::Analyze),
    ("review", TaskType::Analyze),
    ("audit", TaskType::Analyze),
    ("investigate", TaskType::Analyze),
    ("inspect", TaskType::Analyze),
    ("explain", TaskType::Analyze),
    ("examine", TaskType::Analyze),
    ("explore", TaskType::Analyze),
    ("understand", TaskType::Analyze),
    ("show", TaskType::Analyze),
    ("list", TaskType::Analyze),
    ("display", TaskType::Analyze),
    ("find", TaskType::Analyze),
    ("refactor", TaskType::Refactor),
    ("restructure", TaskType::Refactor),
    ("reorganize", TaskType::Refactor),
    ("simplify", TaskType::Refactor),
    ("decouple", TaskType::Refactor),
    ("extract", TaskType::Refactor),
    ("cleanup", TaskType::Refactor),
    ("rename", TaskType::Refactor),
    ("fix", TaskType::Fix),
    ("debug", TaskType::Fix),
    ("resolve", TaskType::Fix),
    ("repair", TaskType::Fix),
    ("patch", TaskType::Fix),
    ("verify", TaskType::Test),
    ("document", TaskType::Document),
    ("annotate", TaskType::Document),
    ("configure", TaskType::Configure),
    ("setup", TaskType::Configure),
    ("install", TaskType::Configure),
    ("enable", TaskType::Configure),
    ("disable", TaskType::Configure),
    ("add", TaskType::Create),
    ("create", TaskType::Create),
    ("implement", TaskType::Create),
    ("generate", TaskType::Create),
    ("introduce", TaskType::Create),
    ("write", TaskType::Create),
    ("scaffold", TaskType::Create),
    ("update", TaskType::Modify),
    ("change", TaskType::Modify),
    ("modify", TaskType::Modify),
    ("improve", TaskType::Modify),
    ("extend", TaskType::Modify),
    ("enhance", TaskType::Modify),
    ("adjust", TaskType::Modify),
    ("replace", TaskType::Modify),
    ("migrate", TaskType::Modify),
    ("upgrade", TaskType::Modify),
    ("optimize", TaskType::Modify),
    ("remove", TaskType::Modify),
    ("delete", TaskType::Modify),
];

/// Nouns that turn create/modify/general work into `test` work.
pub const TEST_NOUNS: &[&str] = &["test", "tests", "spec", "specs", "coverage"];

/// Nouns that turn create/modify/general work into `document` work.
pub const DOC_NOUNS: &[&str] = &[
    "docs",
    "documentation",
    "readme",
    "docstring",
    "docstrings",
    "comments",
    "changelog",
    "jsdoc",
];

/// Words that raise the complexity estimate.
pub const INTENSIFIERS: &[&str] = &["comprehensive", "entire", "refactor", "all", "whole", "complete"];

/// Sequencing words that may appear anywhere between clauses.
pub static SEQUENCE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\s,;.]*\b(?:(?:and\s+)?then|after\s+that|afterwards|followed\s+by)\b[\s,:]*")
        .expect("static regex: sequence split")
});

/// Ordinal markers that only count at the start of a clause.
pub static CLAUSE_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[,;.]\s*|\s+and\s+)\s*(?:next|finally|lastly|first(?:ly)?|second(?:ly)?|third(?:ly)?)\b[\s,:]*",
    )
    .expect("static regex: clause markers")
});

/// Numbered list markers: `1.` or `1)` at a line start or after whitespace.
pub static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)\d{1,2}[.)]\s+").expect("static regex: numbered item")
});

/// Sentence boundaries.
pub static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)|\n+").expect("static regex: sentence boundary"));

/// Returns the task type for a single word, if it is an action verb.
#[must_use]
pub fn verb_type(word: &str) -> Option<TaskType> {
    let lower = word.to_lowercase();
    ACTION_VERBS
        .iter()
        .find(|(verb, _)| *verb == lower)
        .map(|(_, t)| *t)
}

/// Returns true if the word is an action verb.
#[must_use]
pub fn is_action_verb(word: &str) -> bool {
    verb_type(word).is_some()
}

/// Splits text into word tokens, keeping identifier characters
/// (`_`, `-`, `.`, `/`) inside words.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| {
        !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '/')
    })
    .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
    .filter(|w| !w.is_empty())
}

/// Distinct action verbs present in the text, lowercased.
#[must_use]
pub fn distinct_verbs(text: &str) -> HashSet<String> {
    words(text)
        .filter(|w| is_action_verb(w))
        .map(str::to_lowercase)
        .collect()
}

/// Extracts search terms: stop words and action verbs removed, case
/// preserved, deduplicated case-insensitively, at most `max` terms.
#[must_use]
pub fn extract_search_terms(text: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for word in words(text) {
        if terms.len() >= max {
            break;
        }
        let lower = word.to_lowercase();
        if lower.chars().count() < 2
            || lower.chars().all(|c| c.is_ascii_digit())
            || STOP_WORDS.contains(lower.as_str())
            || is_action_verb(&lower)
        {
            continue;
        }
        if seen.insert(lower) {
            terms.push(word.to_string());
        }
    }
    terms
}

/// Returns true if any word of the text is in the list.
#[must_use]
pub fn mentions_any(text: &str, list: &[&str]) -> bool {
    words(text).any(|w| {
        let lower = w.to_lowercase();
        list.contains(&lower.as_str())
    })
}

/// Counts the intensifier words present in the text.
#[must_use]
pub fn intensifier_count(text: &str) -> usize {
    let present: HashSet<String> = words(text).map(str::to_lowercase).collect();
    INTENSIFIERS.iter().filter(|w| present.contains(**w)).count()
}
