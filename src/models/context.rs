//! Graph and prompt context types.

use super::clarification::Clarification;
use super::graph::{EdgeType, NodeType};
use super::retrieval::RetrievedFile;
use super::task::TaskType;
use serde::{Deserialize, Serialize};

/// Confidence assigned to classes matched directly from retrieved files.
pub const SEED_CONFIDENCE: f32 = 0.9;

/// Confidence assigned to classes reached by one-hop expansion.
pub const EXPANDED_CONFIDENCE: f32 = 0.7;

/// A code entity prepared for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Entity name.
    pub name: String,
    /// Defining file.
    pub file_path: String,
    /// Package or directory.
    pub package: String,
    /// Entity type.
    pub node_type: NodeType,
    /// Declaration line range, when known.
    pub line_range: Option<(u32, u32)>,
    /// Confidence that the entity is relevant.
    pub confidence: f32,
    /// Whether the entity was a seed.
    pub is_seed: bool,
}

/// A relationship prepared for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity name.
    pub from: String,
    /// Target entity name.
    pub to: String,
    /// Relationship type.
    pub relationship_type: EdgeType,
    /// Calling method, when known.
    pub caller_method: Option<String>,
    /// Called method, when known.
    pub callee_method: Option<String>,
    /// 0.9 for direct relationships, 0.7 for expanded ones.
    pub strength: f32,
}

impl Relationship {
    /// Formats as `caller.method() → callee.method() [type]`.
    #[must_use]
    pub fn display_line(&self) -> String {
        let caller = self.caller_method.as_ref().map_or_else(
            || self.from.clone(),
            |m| format!("{}.{m}()", self.from),
        );
        let callee = self
            .callee_method
            .as_ref()
            .map_or_else(|| self.to.clone(), |m| format!("{}.{m}()", self.to));
        format!("{caller} → {callee} [{}]", self.relationship_type)
    }

    /// Deduplication key `(from, type, to)`.
    #[must_use]
    pub fn key(&self) -> (String, EdgeType, String) {
        (self.from.clone(), self.relationship_type, self.to.clone())
    }
}

/// Architectural metrics over the analyzed subgraph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitecturalInsights {
    /// `min(edges / nodes / 5, 1)`.
    pub coupling: f32,
    /// `min(edges / 10, 1)`.
    pub complexity: f32,
    /// Tags derived from the edge types present.
    pub patterns: Vec<String>,
    /// Highest-degree entity names.
    pub hotspots: Vec<String>,
}

/// Relationship analysis result for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphContext {
    /// Seed and expanded entities.
    pub classes: Vec<ClassInfo>,
    /// Direct and expanded relationships.
    pub relationships: Vec<Relationship>,
    /// Distinct packages, sorted.
    pub packages: Vec<String>,
    /// Architectural metrics.
    pub insights: ArchitecturalInsights,
    /// Set when the graph could not be consulted.
    pub used_fallback: bool,
}

impl GraphContext {
    /// Returns true if no entities were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.relationships.is_empty()
    }
}

/// Final prompt payload for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedContext {
    /// Query text as the user wrote it (after clarification rewrite).
    pub original_query: String,
    /// Task intent.
    pub intent: TaskType,
    /// Collected answers.
    pub clarifications: Vec<Clarification>,
    /// Assumptions made in lieu of answers.
    pub assumptions: Vec<String>,
    /// Ranked files.
    pub files: Vec<RetrievedFile>,
    /// Entities.
    pub classes: Vec<ClassInfo>,
    /// Relationships.
    pub relationships: Vec<Relationship>,
    /// Packages.
    pub packages: Vec<String>,
    /// Rendered prompt.
    pub prompt: String,
    /// Whether the prompt hit the size limit.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(caller: Option<&str>, callee: Option<&str>) -> Relationship {
        Relationship {
            from: "AuthService".to_string(),
            to: "TokenStore".to_string(),
            relationship_type: EdgeType::Calls,
            caller_method: caller.map(String::from),
            callee_method: callee.map(String::from),
            strength: SEED_CONFIDENCE,
        }
    }

    #[test]
    fn test_display_line_with_methods() {
        assert_eq!(
            rel(Some("login"), Some("save")).display_line(),
            "AuthService.login() → TokenStore.save() [calls]"
        );
    }

    #[test]
    fn test_display_line_without_methods() {
        assert_eq!(
            rel(None, None).display_line(),
            "AuthService → TokenStore [calls]"
        );
    }

    #[test]
    fn test_expanded_below_seed() {
        assert!(EXPANDED_CONFIDENCE < SEED_CONFIDENCE);
    }
}
