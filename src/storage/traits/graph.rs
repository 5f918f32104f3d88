//! Code graph store trait.
//!
//! The code graph holds files, declarations and the relationships between
//! them for each indexed project. The relationship analyzer depends only on
//! this trait, so backends are interchangeable.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Features |
//! |---------|----------|----------|
//! | `SqliteGraphStore` | Default; embedded | Disk-persisted, cascading deletes |
//! | `FalkorGraphStore` | Networked | Cypher over the Redis protocol (`falkordb` feature) |
//! | `InMemoryGraphStore` | Testing | Fast, no persistence |
//!
//! # Error Modes and Guarantees
//!
//! All backends return `Result<T>` with errors propagated via [`crate::Error`].
//! Callers in the analysis path convert any error into a fallback result.
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | `resolve_project_id` | Exact match on the normalized root path |
//! | `upsert_nodes` | Insert or replace by node ID |
//! | `upsert_edges` | Both endpoints must already exist |
//! | `delete_by_project` | Removes the project's nodes and every edge touching them |

use crate::Result;
use crate::models::{
    Direction, EdgeType, GraphEdge, GraphNode, NodeId, NodeType, ProjectId, ProjectRecord,
    path_suffix_match,
};
use std::collections::HashMap;

/// Trait for code graph backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn CodeGraphStore>`
/// - Use interior mutability (e.g., `Mutex<Connection>`) for mutable state
/// - Reject edges whose endpoints are unknown with [`crate::Error::InvalidInput`]
/// - Self-loops are valid edges
pub trait CodeGraphStore: Send + Sync {
    /// Short backend name for logs and metrics.
    fn backend_name(&self) -> &'static str;

    /// Looks up the project registered for a root path.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn resolve_project_id(&self, root_path: &str) -> Result<Option<ProjectId>>;

    /// Registers a project root, returning its ID.
    ///
    /// Registering the same root twice returns the existing ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn register_project(&self, root_path: &str, name: &str) -> Result<ProjectId>;

    /// Lists registered projects.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_projects(&self) -> Result<Vec<ProjectRecord>>;

    /// Retrieves a node by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_node(&self, id: &NodeId) -> Result<Option<GraphNode>>;

    /// Returns a project's nodes, optionally restricted to one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find_nodes(&self, project: &ProjectId, node_type: Option<NodeType>)
    -> Result<Vec<GraphNode>>;

    /// Returns nodes whose file path suffix-matches `path`.
    ///
    /// The default implementation scans file and declaration nodes of the
    /// project; backends may override it with an indexed lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find_nodes_by_path_suffix(&self, project: &ProjectId, path: &str) -> Result<Vec<GraphNode>> {
        Ok(self
            .find_nodes(project, Some(NodeType::File))?
            .into_iter()
            .filter(|n| n.path_matches_suffix(path))
            .collect())
    }

    /// Returns edges touching a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_edges(&self, node: &NodeId, direction: Direction) -> Result<Vec<GraphEdge>>;

    /// Inserts or replaces nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert_nodes(&self, nodes: &[GraphNode]) -> Result<usize>;

    /// Inserts or replaces edges keyed by `(source, target, type)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if an endpoint is unknown, or
    /// an error if the write fails.
    fn upsert_edges(&self, edges: &[GraphEdge]) -> Result<usize>;

    /// Deletes the nodes of one file and every edge touching them.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_file(&self, project: &ProjectId, file_path: &str) -> Result<usize> {
        let doomed: Vec<NodeId> = self
            .find_nodes(project, None)?
            .into_iter()
            .filter(|n| path_suffix_match(&n.file_path, file_path))
            .map(|n| n.id)
            .collect();
        self.delete_nodes(&doomed)
    }

    /// Deletes nodes by ID together with their edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_nodes(&self, ids: &[NodeId]) -> Result<usize>;

    /// Deletes a project with all of its nodes and edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_by_project(&self, project: &ProjectId) -> Result<usize>;

    /// Returns statistics for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn stats(&self, project: &ProjectId) -> Result<GraphStats>;
}

/// Statistics about one project's code graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Total number of nodes.
    pub node_count: usize,
    /// Number of nodes by type.
    pub nodes_by_type: HashMap<NodeType, usize>,
    /// Total number of edges whose source is in the project.
    pub edge_count: usize,
    /// Number of edges by type.
    pub edges_by_type: HashMap<EdgeType, usize>,
}

impl GraphStats {
    /// Creates empty stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds stats from node and edge lists.
    #[must_use]
    pub fn from_parts(nodes: &[GraphNode], edges: &[GraphEdge]) -> Self {
        let mut stats = Self::new();
        stats.node_count = nodes.len();
        stats.edge_count = edges.len();
        for node in nodes {
            *stats.nodes_by_type.entry(node.node_type).or_insert(0) += 1;
        }
        for edge in edges {
            *stats.edges_by_type.entry(edge.edge_type).or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_stats_default() {
        let stats = GraphStats::default();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.edge_count, 0);
        assert!(stats.nodes_by_type.is_empty());
    }

    #[test]
    fn test_graph_stats_from_parts() {
        let project = ProjectId::new("p");
        let nodes = vec![
            GraphNode::new(NodeId::new("a"), "a.ts", NodeType::File, "a.ts", project.clone()),
            GraphNode::new(NodeId::new("b"), "A", NodeType::Class, "a.ts", project),
        ];
        let edges = vec![GraphEdge::new(
            NodeId::new("a"),
            NodeId::new("b"),
            EdgeType::Contains,
        )];
        let stats = GraphStats::from_parts(&nodes, &edges);
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.nodes_by_type.get(&NodeType::Class), Some(&1));
        assert_eq!(stats.edges_by_type.get(&EdgeType::Contains), Some(&1));
    }
}
