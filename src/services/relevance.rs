//! Heuristic relevance scoring.
//!
//! Scores are lexical and approximate. They are comparable within one
//! retrieval call only.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::services::task_patterns::extract_search_terms;
use regex::Regex;
use std::sync::LazyLock;

/// Credit when the file name contains a term of a matched category.
pub const FILE_NAME_BONUS: f32 = 0.3;
/// Credit when a directory segment contains a term of a matched category.
pub const DIRECTORY_BONUS: f32 = 0.2;
/// Credit when the first search term is a substring of the file name.
pub const FIRST_TERM_BONUS: f32 = 0.4;

/// A domain keyword category.
#[derive(Debug)]
pub struct KeywordCategory {
    /// Category name.
    pub name: &'static str,
    /// Matched against the lowercased query.
    pub query_pattern: Regex,
    /// Looked for in file and directory names.
    pub path_terms: &'static [&'static str],
}

fn category(
    name: &'static str,
    pattern: &str,
    path_terms: &'static [&'static str],
) -> KeywordCategory {
    KeywordCategory {
        name,
        query_pattern: Regex::new(pattern).expect("static regex: keyword category"),
        path_terms,
    }
}

/// The fixed keyword table.
pub static KEYWORD_CATEGORIES: LazyLock<Vec<KeywordCategory>> = LazyLock::new(|| {
    vec![
        category(
            "auth",
            r"\b(auth\w*|login|logout|sign\s*(in|up|on)|session\w*|token\w*|jwt|oauth|password\w*|credential\w*)\b",
            &["auth", "login", "logout", "session", "token", "jwt", "oauth", "password", "credential", "signin", "signup"],
        ),
        category(
            "api",
            r"\b(api|apis|endpoint\w*|routes?|routing|rest|graphql|requests?|responses?|controller\w*|handler\w*)\b",
            &["api", "endpoint", "route", "controller", "handler", "rest", "graphql"],
        ),
        category(
            "database",
            r"\b(database\w*|db|sql|quer(y|ies)|schema\w*|migration\w*|models?|repositor(y|ies)|orm|tables?)\b",
            &["db", "database", "sql", "schema", "migration", "model", "repository", "repo", "entity", "dao"],
        ),
        category(
            "test",
            r"\b(tests?|testing|specs?|coverage|mock\w*|fixture\w*)\b",
            &["test", "spec", "mock", "fixture"],
        ),
        category(
            "component",
            r"\b(component\w*|ui|views?|pages?|widget\w*|button\w*|forms?|modal\w*|layout\w*|screens?)\b",
            &["component", "view", "page", "widget", "ui", "layout", "screen", "form", "modal"],
        ),
        category(
            "service",
            r"\b(service\w*|provider\w*|manager\w*|clients?|worker\w*)\b",
            &["service", "provider", "manager", "client", "worker"],
        ),
        category(
            "config",
            r"\b(config\w*|settings?|env|environment|setup|options?)\b",
            &["config", "settings", "env", "setup", "options"],
        ),
        category(
            "util",
            r"\b(utils?|utilit(y|ies)|helpers?|common|shared|format\w*|dates?|strings?)\b",
            &["util", "helper", "common", "shared", "lib"],
        ),
    ]
});

/// Scores file paths against one query.
///
/// Category matching and first-term extraction run once per query.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    matched: Vec<&'static KeywordCategory>,
    first_term: Option<String>,
}

impl RelevanceScorer {
    /// Prepares a scorer for a query.
    #[must_use]
    pub fn new(query: &str) -> Self {
        let lower = query.to_lowercase();
        let matched = KEYWORD_CATEGORIES
            .iter()
            .filter(|c| c.query_pattern.is_match(&lower))
            .collect();
        let first_term = extract_search_terms(query, 1)
            .into_iter()
            .next()
            .map(|t| {
                let lower = t.to_lowercase();
                lower.rsplit('/').next().unwrap_or(&lower).to_string()
            })
            .filter(|t| !t.is_empty());
        Self {
            matched,
            first_term,
        }
    }

    /// Names of the categories the query matched.
    #[must_use]
    pub fn matched_categories(&self) -> Vec<&'static str> {
        self.matched.iter().map(|c| c.name).collect()
    }

    /// The first search term, lowercased.
    #[must_use]
    pub fn first_term(&self) -> Option<&str> {
        self.first_term.as_deref()
    }

    /// Scores a path relative to the project root. Result is in `[0, 1]`.
    #[must_use]
    pub fn score(&self, relative_path: &str) -> f32 {
        let normalized = relative_path.replace('\\', "/").to_lowercase();
        let mut segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        let Some(file_name) = segments.pop() else {
            return 0.0;
        };

        let mut score = 0.0_f32;
        for category in &self.matched {
            if category.path_terms.iter().any(|t| file_name.contains(t)) {
                score += FILE_NAME_BONUS;
            }
            if segments
                .iter()
                .any(|dir| category.path_terms.iter().any(|t| dir.contains(t)))
            {
                score += DIRECTORY_BONUS;
            }
        }

        if let Some(term) = &self.first_term
            && file_name.contains(term.as_str())
        {
            score += FIRST_TERM_BONUS;
        }

        score.clamp(0.0, 1.0)
    }
}
