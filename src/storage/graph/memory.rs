//! In-memory code graph store for testing.
//!
//! Provides a fast, non-persistent implementation of [`CodeGraphStore`] for use
//! in unit tests and development scenarios.

use crate::models::{
    Direction, GraphEdge, GraphNode, NodeId, NodeType, ProjectId, ProjectRecord, normalize_path,
};
use crate::storage::traits::graph::{CodeGraphStore, GraphStats};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct GraphState {
    projects: BTreeMap<String, ProjectRecord>,
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: Vec<GraphEdge>,
}

/// In-memory code graph store.
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics.
/// Data is not persisted between runs. Nodes iterate in ID order and edges
/// in insertion order, so results are deterministic.
///
/// # Example
///
/// ```rust
/// use taskscope::storage::graph::InMemoryGraphStore;
/// use taskscope::storage::CodeGraphStore;
///
/// let store = InMemoryGraphStore::new();
/// let project = store.register_project("/work/app", "app").unwrap();
/// assert_eq!(store.resolve_project_id("/work/app/").unwrap(), Some(project));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes stored.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.read().map(|s| s.nodes.len()).unwrap_or(0)
    }

    /// Returns the number of edges stored.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.state.read().map(|s| s.edges.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, GraphState>> {
        self.state.read().map_err(|_| Error::OperationFailed {
            operation: "graph_memory_read".to_string(),
            cause: "lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, GraphState>> {
        self.state.write().map_err(|_| Error::OperationFailed {
            operation: "graph_memory_write".to_string(),
            cause: "lock poisoned".to_string(),
        })
    }
}

fn remove_nodes(state: &mut GraphState, ids: &HashSet<NodeId>) -> usize {
    let before = state.nodes.len();
    state.nodes.retain(|id, _| !ids.contains(id));
    state
        .edges
        .retain(|e| !ids.contains(&e.source) && !ids.contains(&e.target));
    before - state.nodes.len()
}

impl CodeGraphStore for InMemoryGraphStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn resolve_project_id(&self, root_path: &str) -> Result<Option<ProjectId>> {
        let state = self.read()?;
        Ok(state
            .projects
            .get(&normalize_path(root_path))
            .map(|p| p.id.clone()))
    }

    fn register_project(&self, root_path: &str, name: &str) -> Result<ProjectId> {
        let root = normalize_path(root_path);
        let mut state = self.write()?;
        if let Some(existing) = state.projects.get(&root) {
            return Ok(existing.id.clone());
        }
        let id = ProjectId::new(uuid::Uuid::new_v4().to_string());
        state.projects.insert(
            root.clone(),
            ProjectRecord {
                id: id.clone(),
                name: name.to_string(),
                root_path: root,
            },
        );
        Ok(id)
    }

    fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        Ok(self.read()?.projects.values().cloned().collect())
    }

    fn get_node(&self, id: &NodeId) -> Result<Option<GraphNode>> {
        Ok(self.read()?.nodes.get(id).cloned())
    }

    fn find_nodes(
        &self,
        project: &ProjectId,
        node_type: Option<NodeType>,
    ) -> Result<Vec<GraphNode>> {
        let state = self.read()?;
        Ok(state
            .nodes
            .values()
            .filter(|n| &n.project_id == project)
            .filter(|n| node_type.is_none_or(|t| n.node_type == t))
            .cloned()
            .collect())
    }

    fn get_edges(&self, node: &NodeId, direction: Direction) -> Result<Vec<GraphEdge>> {
        let state = self.read()?;
        Ok(state
            .edges
            .iter()
            .filter(|e| match direction {
                Direction::Outgoing => &e.source == node,
                Direction::Incoming => &e.target == node,
                Direction::Both => &e.source == node || &e.target == node,
            })
            .cloned()
            .collect())
    }

    fn upsert_nodes(&self, nodes: &[GraphNode]) -> Result<usize> {
        let mut state = self.write()?;
        for node in nodes {
            state.nodes.insert(node.id.clone(), node.clone());
        }
        Ok(nodes.len())
    }

    fn upsert_edges(&self, edges: &[GraphEdge]) -> Result<usize> {
        let mut state = self.write()?;
        for edge in edges {
            for endpoint in [&edge.source, &edge.target] {
                if !state.nodes.contains_key(endpoint) {
                    return Err(Error::InvalidInput(format!(
                        "edge endpoint {endpoint} does not exist"
                    )));
                }
            }
        }
        for edge in edges {
            if let Some(existing) = state.edges.iter_mut().find(|e| {
                e.source == edge.source && e.target == edge.target && e.edge_type == edge.edge_type
            }) {
                *existing = edge.clone();
            } else {
                state.edges.push(edge.clone());
            }
        }
        Ok(edges.len())
    }

    fn delete_nodes(&self, ids: &[NodeId]) -> Result<usize> {
        let ids: HashSet<NodeId> = ids.iter().cloned().collect();
        let mut state = self.write()?;
        Ok(remove_nodes(&mut state, &ids))
    }

    fn delete_by_project(&self, project: &ProjectId) -> Result<usize> {
        let mut state = self.write()?;
        let ids: HashSet<NodeId> = state
            .nodes
            .values()
            .filter(|n| &n.project_id == project)
            .map(|n| n.id.clone())
            .collect();
        let removed = remove_nodes(&mut state, &ids);
        state.projects.retain(|_, p| &p.id != project);
        Ok(removed)
    }

    fn stats(&self, project: &ProjectId) -> Result<GraphStats> {
        let state = self.read()?;
        let nodes: Vec<GraphNode> = state
            .nodes
            .values()
            .filter(|n| &n.project_id == project)
            .cloned()
            .collect();
        let ids: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let edges: Vec<GraphEdge> = state
            .edges
            .iter()
            .filter(|e| ids.contains(&e.source))
            .cloned()
            .collect();
        Ok(GraphStats::from_parts(&nodes, &edges))
    }
}
