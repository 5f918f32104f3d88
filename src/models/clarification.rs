//! Ambiguity and clarification types.

use serde::{Deserialize, Serialize};

/// Which detector raised an ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityKind {
    /// Several classes follow the same structural pattern.
    MultipleImplementations,
    /// Too many strong candidates to modify.
    UnclearTarget,
    /// Existing code may already cover the request.
    PossibleDuplication,
    /// Broad request over many files.
    ScopeTooBroad,
    /// Unknown test style to follow.
    MissingTestPattern,
}

impl AmbiguityKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleImplementations => "multiple_implementations",
            Self::UnclearTarget => "unclear_target",
            Self::PossibleDuplication => "possible_duplication",
            Self::ScopeTooBroad => "scope_too_broad",
            Self::MissingTestPattern => "missing_test_pattern",
        }
    }
}

/// How much an unanswered question affects the outcome.
///
/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    /// Cosmetic.
    Low,
    /// Affects structure.
    Medium,
    /// Affects correctness or target.
    High,
}

impl Impact {
    /// Returns the impact as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A question presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    /// Question text.
    pub question: String,
    /// Suggested answers.
    pub choices: Vec<String>,
    /// Priority.
    pub impact: Impact,
}

/// A detected gap in retrieval confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambiguity {
    /// Detector.
    pub kind: AmbiguityKind,
    /// What was ambiguous.
    pub description: String,
    /// Files involved.
    pub related_files: Vec<String>,
    /// Generated question.
    pub question: ClarificationQuestion,
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    /// Question text.
    pub question: String,
    /// User answer.
    pub answer: String,
}

/// Result of running the clarification step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClarificationOutcome {
    /// Collected answers, in question order.
    pub clarifications: Vec<Clarification>,
    /// Query with the clarifications block appended.
    pub rewritten_query: String,
    /// True when nothing was asked or the user skipped.
    pub skipped: bool,
    /// Ambiguities that were detected (after truncation).
    pub ambiguities: Vec<Ambiguity>,
}

impl ClarificationOutcome {
    /// Outcome that leaves the query unchanged.
    #[must_use]
    pub fn skipped(query: &str, ambiguities: Vec<Ambiguity>) -> Self {
        Self {
            clarifications: Vec::new(),
            rewritten_query: query.to_string(),
            skipped: true,
            ambiguities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_ordering() {
        assert!(Impact::High > Impact::Medium);
        assert!(Impact::Medium > Impact::Low);
        let mut impacts = vec![Impact::Low, Impact::High, Impact::Medium];
        impacts.sort_by(|a, b| b.cmp(a));
        assert_eq!(impacts, vec![Impact::High, Impact::Medium, Impact::Low]);
    }

    #[test]
    fn test_skipped_keeps_query() {
        let outcome = ClarificationOutcome::skipped("fix login", Vec::new());
        assert!(outcome.skipped);
        assert_eq!(outcome.rewritten_query, "fix login");
    }
}
