//! Types for task intent detection.

use crate::models::TaskType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which classifier produced a [`TaskIntent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// A keyword signal matched.
    Keyword,
    /// The model answered with enough confidence.
    Llm,
    /// Nothing matched; `general` was assumed.
    #[default]
    Unmatched,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keyword => "keyword",
            Self::Llm => "llm",
            Self::Unmatched => "unmatched",
        })
    }
}

/// A classified request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIntent {
    /// Task type label.
    pub task_type: TaskType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Signal words that matched, keyword classifier only.
    pub keywords: Vec<String>,
    /// Code areas the request mentions.
    pub topics: Vec<String>,
    /// Which classifier answered.
    pub source: DetectionSource,
}

impl TaskIntent {
    /// An intent of `task_type` with no evidence attached.
    #[must_use]
    pub const fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            confidence: 0.0,
            keywords: Vec::new(),
            topics: Vec::new(),
            source: DetectionSource::Unmatched,
        }
    }
}

impl Default for TaskIntent {
    fn default() -> Self {
        Self::new(TaskType::General)
    }
}
