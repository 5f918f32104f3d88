// Allow non-const functions that use String operations (not const-stable yet)
#![allow(clippy::missing_const_for_fn)]

//! Code graph types.
//!
//! The code graph is persisted across runs and only mutated by indexing.
//! Nodes are code entities, edges are relationships between them.
//!
//! # Node Types
//!
//! | Type | Description | Examples |
//! |------|-------------|----------|
//! | `File` | A source file | "src/auth/login.ts" |
//! | `Class` | Class or struct | "`AuthService`" |
//! | `Interface` | Interface or trait | "`TokenStore`" |
//! | `Function` | Free function | "`hashPassword`" |
//! | `Method` | Member function | "`AuthService.login`" |
//! | `Module` | Module or package | "auth" |
//!
//! # Edge Types
//!
//! - `Contains` - File → declaration (structural)
//! - `Calls` - caller → callee
//! - `Imports` - importer → imported
//! - `Extends` - subclass → superclass
//! - `Implements` - class → interface
//! - `Uses` - general dependency
//!
//! Self-loops are permitted (recursive calls).
//!
//! # Example
//!
//! ```rust
//! use taskscope::models::{EdgeType, GraphEdge, GraphNode, NodeId, NodeType, ProjectId};
//!
//! let project = ProjectId::new("web-app");
//! let file = GraphNode::new(NodeId::new("n1"), "login.ts", NodeType::File, "src/auth/login.ts", project.clone());
//! let class = GraphNode::new(NodeId::new("n2"), "LoginHandler", NodeType::Class, "src/auth/login.ts", project)
//!     .with_lines(3, 40);
//! let edge = GraphEdge::new(file.id.clone(), class.id.clone(), EdgeType::Contains);
//! assert_eq!(edge.edge_type.as_str(), "contains");
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Unique identifier for a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives a stable node ID from project, path, type and name.
    ///
    /// The same inputs always produce the same ID, so re-indexing a file
    /// upserts rather than duplicates its nodes.
    #[must_use]
    pub fn derive(project: &ProjectId, file_path: &str, node_type: NodeType, name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(project.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(normalize_path(file_path).as_bytes());
        hasher.update([0]);
        hasher.update(node_type.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(name.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("node_{}", &digest[..24]))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an indexed project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Creates a project ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type of code entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Source file.
    File,
    /// Class or struct.
    Class,
    /// Interface or trait.
    Interface,
    /// Free function.
    Function,
    /// Member function.
    Method,
    /// Module or package.
    Module,
}

impl NodeType {
    /// Returns all node type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::File,
            Self::Class,
            Self::Interface,
            Self::Function,
            Self::Method,
            Self::Module,
        ]
    }

    /// Returns the node type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Function => "function",
            Self::Method => "method",
            Self::Module => "module",
        }
    }

    /// Parses a node type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "file" => Some(Self::File),
            "class" | "struct" => Some(Self::Class),
            "interface" | "trait" | "protocol" => Some(Self::Interface),
            "function" | "fn" | "func" => Some(Self::Function),
            "method" => Some(Self::Method),
            "module" | "package" | "namespace" => Some(Self::Module),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of relationship between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// File contains a declaration.
    Contains,
    /// Caller invokes callee.
    Calls,
    /// Importer depends on imported module.
    Imports,
    /// Subclass extends superclass.
    Extends,
    /// Class implements interface.
    Implements,
    /// General usage dependency.
    Uses,
}

impl EdgeType {
    /// Returns all edge type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Contains,
            Self::Calls,
            Self::Imports,
            Self::Extends,
            Self::Implements,
            Self::Uses,
        ]
    }

    /// Edge types followed during one-hop expansion.
    #[must_use]
    pub const fn expandable() -> &'static [Self] {
        &[
            Self::Calls,
            Self::Imports,
            Self::Extends,
            Self::Implements,
            Self::Uses,
        ]
    }

    /// Returns the edge type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::Uses => "uses",
        }
    }

    /// Parses an edge type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contains" | "defines" => Some(Self::Contains),
            "calls" | "invokes" => Some(Self::Calls),
            "imports" | "requires" => Some(Self::Imports),
            "extends" | "inherits" => Some(Self::Extends),
            "implements" | "realizes" => Some(Self::Implements),
            "uses" | "depends_on" => Some(Self::Uses),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction for edge lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges whose source is the node.
    Outgoing,
    /// Edges whose target is the node.
    Incoming,
    /// Both directions.
    Both,
}

/// A code entity in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable node identifier.
    pub id: NodeId,
    /// Display name (class, function or file name).
    pub name: String,
    /// Entity type.
    pub node_type: NodeType,
    /// File path, relative to the project root where possible.
    pub file_path: String,
    /// First line of the declaration (1-based).
    pub start_line: Option<u32>,
    /// Last line of the declaration (1-based, inclusive).
    pub end_line: Option<u32>,
    /// Owning project.
    pub project_id: ProjectId,
}

impl GraphNode {
    /// Creates a node without line information.
    #[must_use]
    pub fn new(
        id: NodeId,
        name: impl Into<String>,
        node_type: NodeType,
        file_path: impl Into<String>,
        project_id: ProjectId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            node_type,
            file_path: file_path.into(),
            start_line: None,
            end_line: None,
            project_id,
        }
    }

    /// Sets the line range.
    #[must_use]
    pub const fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    /// Returns the line range when both ends are known.
    #[must_use]
    pub fn line_range(&self) -> Option<(u32, u32)> {
        self.start_line.zip(self.end_line)
    }

    /// Returns true if this node's file path ends with the given path suffix.
    ///
    /// Both sides are normalized, so `src\auth\login.ts` matches
    /// `/home/dev/app/src/auth/login.ts`. Matching is on whole path segments.
    #[must_use]
    pub fn path_matches_suffix(&self, suffix: &str) -> bool {
        path_suffix_match(&self.file_path, suffix)
    }
}

/// A relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node.
    pub source: NodeId,
    /// Target node.
    pub target: NodeId,
    /// Relationship type.
    pub edge_type: EdgeType,
    /// Calling method name, when known.
    pub caller_method: Option<String>,
    /// Called method name, when known.
    pub callee_method: Option<String>,
    /// Line of the call site or import.
    pub line: Option<u32>,
}

impl GraphEdge {
    /// Creates an edge without call-site details.
    #[must_use]
    pub const fn new(source: NodeId, target: NodeId, edge_type: EdgeType) -> Self {
        Self {
            source,
            target,
            edge_type,
            caller_method: None,
            callee_method: None,
            line: None,
        }
    }

    /// Sets caller and callee method names.
    #[must_use]
    pub fn with_methods(mut self, caller: impl Into<String>, callee: impl Into<String>) -> Self {
        self.caller_method = Some(caller.into());
        self.callee_method = Some(callee.into());
        self
    }

    /// Sets the call-site line.
    #[must_use]
    pub const fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Returns true if the edge starts and ends at the same node.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// A registered project in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Project identifier.
    pub id: ProjectId,
    /// Human-readable name.
    pub name: String,
    /// Normalized root path.
    pub root_path: String,
}

/// Normalizes a path for comparison.
///
/// Converts backslashes to forward slashes, strips `./` prefixes and
/// trailing separators.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Returns true if `path` ends with `suffix` on a segment boundary.
#[must_use]
pub fn path_suffix_match(path: &str, suffix: &str) -> bool {
    let path = normalize_path(path);
    let suffix = normalize_path(suffix);
    if suffix.is_empty() {
        return false;
    }
    if path == suffix {
        return true;
    }
    path.strip_suffix(suffix.as_str())
        .is_some_and(|prefix| prefix.ends_with('/'))
        || suffix
            .strip_suffix(path.as_str())
            .is_some_and(|prefix| prefix.ends_with('/'))
}
