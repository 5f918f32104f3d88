//! Graph backend contract tests.
//!
//! Every [`CodeGraphStore`] must behave the same for the operations the
//! analyzer and the index sync rely on. The same checks run against the
//! in-memory store and `SQLite`; `FalkorDB` runs them only with the
//! `falkordb` feature and a reachable server.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;
use taskscope::models::{
    Direction, EXPANDED_CONFIDENCE, EdgeType, FileKind, GraphEdge, GraphNode, NodeId, NodeType,
    ProjectId, RetrievedFile, SEED_CONFIDENCE,
};
use taskscope::storage::graph::{InMemoryGraphStore, SqliteGraphStore};
use taskscope::{CodeGraphStore, RelationshipAnalyzer};
use tempfile::TempDir;

const ROOT: &str = "/workspace/app";

fn class(project: &ProjectId, path: &str, name: &str) -> GraphNode {
    GraphNode::new(
        NodeId::derive(project, path, NodeType::Class, name),
        name,
        NodeType::Class,
        path,
        project.clone(),
    )
    .with_lines(1, 20)
}

/// Two seed classes joined by a `calls` edge, each with one outgoing
/// neighbor.
///
/// ```text
/// AuthController --calls--> AuthService
///       |                        |
///     uses                    imports
///       v                        v
///  SessionStore              PasswordHasher
/// ```
fn populate(store: &dyn CodeGraphStore) -> (ProjectId, Vec<GraphNode>) {
    let project = store.register_project(ROOT, "app").unwrap();
    let nodes = vec![
        class(&project, "src/auth/controller.ts", "AuthController"),
        class(&project, "src/auth/service.ts", "AuthService"),
        class(&project, "src/session/store.ts", "SessionStore"),
        class(&project, "src/crypto/hasher.ts", "PasswordHasher"),
    ];
    assert_eq!(store.upsert_nodes(&nodes).unwrap(), 4);
    let edges = vec![
        GraphEdge::new(nodes[0].id.clone(), nodes[1].id.clone(), EdgeType::Calls)
            .with_methods("login", "authenticate"),
        GraphEdge::new(nodes[0].id.clone(), nodes[2].id.clone(), EdgeType::Uses),
        GraphEdge::new(nodes[1].id.clone(), nodes[3].id.clone(), EdgeType::Imports),
    ];
    assert_eq!(store.upsert_edges(&edges).unwrap(), 3);
    (project, nodes)
}

fn check_projects(store: &dyn CodeGraphStore) {
    let first = store.register_project(ROOT, "app").unwrap();
    let again = store.register_project(&format!("{ROOT}/"), "app").unwrap();
    assert_eq!(first, again, "registration is idempotent per normalized root");
    assert_eq!(store.resolve_project_id(ROOT).unwrap(), Some(first));
    assert_eq!(store.resolve_project_id("/elsewhere").unwrap(), None);
    assert_eq!(store.list_projects().unwrap().len(), 1);
}

fn check_nodes_and_edges(store: &dyn CodeGraphStore) {
    let (project, nodes) = populate(store);

    let fetched = store.get_node(&nodes[1].id).unwrap().unwrap();
    assert_eq!(fetched.name, "AuthService");
    assert_eq!(fetched.line_range(), Some((1, 20)));

    assert_eq!(store.find_nodes(&project, Some(NodeType::Class)).unwrap().len(), 4);
    assert!(store.find_nodes(&project, Some(NodeType::Function)).unwrap().is_empty());

    let by_suffix = store.find_nodes_by_path_suffix(&project, "auth/service.ts").unwrap();
    assert_eq!(by_suffix.len(), 1);
    assert_eq!(by_suffix[0].id, nodes[1].id);
    assert!(store.find_nodes_by_path_suffix(&project, "vice.ts").unwrap().is_empty());

    let outgoing = store.get_edges(&nodes[0].id, Direction::Outgoing).unwrap();
    assert_eq!(outgoing.len(), 2);
    let calls = outgoing.iter().find(|e| e.edge_type == EdgeType::Calls).unwrap();
    assert_eq!(calls.caller_method.as_deref(), Some("login"));
    assert_eq!(calls.callee_method.as_deref(), Some("authenticate"));

    assert_eq!(store.get_edges(&nodes[1].id, Direction::Incoming).unwrap().len(), 1);
    assert_eq!(store.get_edges(&nodes[1].id, Direction::Both).unwrap().len(), 2);

    let stats = store.stats(&project).unwrap();
    assert_eq!(stats.node_count, 4);
    assert_eq!(stats.edge_count, 3);
    assert_eq!(stats.edges_by_type.get(&EdgeType::Calls), Some(&1));
}

fn check_edge_upsert_replaces(store: &dyn CodeGraphStore) {
    let (_, nodes) = populate(store);
    let updated = GraphEdge::new(nodes[0].id.clone(), nodes[1].id.clone(), EdgeType::Calls)
        .with_methods("logout", "revoke");
    store.upsert_edges(&[updated]).unwrap();

    let outgoing = store.get_edges(&nodes[0].id, Direction::Outgoing).unwrap();
    let calls: Vec<_> = outgoing.iter().filter(|e| e.edge_type == EdgeType::Calls).collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].caller_method.as_deref(), Some("logout"));
}

fn check_dangling_edge_rejected(store: &dyn CodeGraphStore) {
    let (project, nodes) = populate(store);
    let ghost = NodeId::derive(&project, "src/ghost.ts", NodeType::Class, "Ghost");
    let edge = GraphEdge::new(nodes[0].id.clone(), ghost, EdgeType::Calls);
    assert!(store.upsert_edges(&[edge]).is_err());
}

fn check_deletes(store: &dyn CodeGraphStore) {
    let (project, nodes) = populate(store);

    assert_eq!(store.delete_file(&project, "src/auth/controller.ts").unwrap(), 1);
    assert!(store.get_node(&nodes[0].id).unwrap().is_none());
    assert!(store.get_edges(&nodes[1].id, Direction::Incoming).unwrap().is_empty());
    assert!(store.get_edges(&nodes[2].id, Direction::Both).unwrap().is_empty());

    assert_eq!(store.delete_by_project(&project).unwrap(), 3);
    assert!(store.find_nodes(&project, None).unwrap().is_empty());
    assert_eq!(store.resolve_project_id(ROOT).unwrap(), None);
}

fn check_seed_and_expand(store: Arc<dyn CodeGraphStore>) {
    populate(store.as_ref());
    let files = vec![
        RetrievedFile::new("src/auth/controller.ts", FileKind::Source, 0.8),
        RetrievedFile::new("src/auth/service.ts", FileKind::Source, 0.7),
    ];
    let context = RelationshipAnalyzer::new(store).analyze("login", Path::new(ROOT), &files);

    assert!(!context.used_fallback);
    let direct: Vec<_> = context
        .relationships
        .iter()
        .filter(|r| (r.strength - SEED_CONFIDENCE).abs() < f32::EPSILON)
        .collect();
    let expanded = context
        .relationships
        .iter()
        .filter(|r| (r.strength - EXPANDED_CONFIDENCE).abs() < f32::EPSILON)
        .count();
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].from, "AuthController");
    assert_eq!(direct[0].to, "AuthService");
    assert_eq!(expanded, 2);

    assert_eq!(context.classes.len(), 4);
    for class in &context.classes {
        let expected_seed = class.name.starts_with("Auth");
        assert_eq!(class.is_seed, expected_seed, "{}", class.name);
        if !class.is_seed {
            assert!(class.confidence < SEED_CONFIDENCE);
        }
    }
    assert_eq!(
        context.packages,
        vec!["src/auth", "src/crypto", "src/session"]
    );
}

/// A seed with five expandable neighbours, written in reverse order.
/// Every backend must keep the same three.
fn check_expansion_order(store: Arc<dyn CodeGraphStore>) {
    let project = store.register_project(ROOT, "app").unwrap();
    let seed = class(&project, "src/api/router.ts", "Router");
    let neighbours: Vec<GraphNode> = ["Alpha", "Bravo", "Charlie", "Delta", "Echo"]
        .iter()
        .map(|name| class(&project, "src/lib/handlers.ts", name))
        .collect();
    let mut nodes = vec![seed.clone()];
    nodes.extend(neighbours.iter().cloned());
    store.upsert_nodes(&nodes).unwrap();

    let edge_types = [
        EdgeType::Uses,
        EdgeType::Calls,
        EdgeType::Imports,
        EdgeType::Calls,
        EdgeType::Uses,
    ];
    let mut edges: Vec<GraphEdge> = neighbours
        .iter()
        .zip(edge_types)
        .map(|(n, t)| GraphEdge::new(seed.id.clone(), n.id.clone(), t))
        .collect();
    edges.reverse();
    store.upsert_edges(&edges).unwrap();

    edges.sort_by(|a, b| (a.edge_type, &a.target).cmp(&(b.edge_type, &b.target)));
    let mut expected: Vec<String> = edges[..3]
        .iter()
        .map(|e| neighbours.iter().find(|n| n.id == e.target).unwrap().name.clone())
        .collect();
    expected.sort();

    let files = vec![RetrievedFile::new("src/api/router.ts", FileKind::Source, 0.9)];
    let context = RelationshipAnalyzer::new(store).analyze("routes", Path::new(ROOT), &files);
    let mut expanded: Vec<String> = context
        .classes
        .iter()
        .filter(|c| !c.is_seed)
        .map(|c| c.name.clone())
        .collect();
    expanded.sort();
    assert_eq!(expanded, expected);
}

/// Runs one check against every local backend.
fn each_backend(check: impl Fn(Arc<dyn CodeGraphStore>)) {
    check(Arc::new(InMemoryGraphStore::new()));
    check(Arc::new(SqliteGraphStore::in_memory().unwrap()));
    let dir = TempDir::new().unwrap();
    check(Arc::new(SqliteGraphStore::new(dir.path().join("graph.db")).unwrap()));
}

#[test]
fn test_projects() {
    each_backend(|store| check_projects(store.as_ref()));
}

#[test]
fn test_nodes_and_edges() {
    each_backend(|store| check_nodes_and_edges(store.as_ref()));
}

#[test]
fn test_edge_upsert_replaces() {
    each_backend(|store| check_edge_upsert_replaces(store.as_ref()));
}

#[test]
fn test_dangling_edge_rejected() {
    each_backend(|store| check_dangling_edge_rejected(store.as_ref()));
}

#[test]
fn test_deletes() {
    each_backend(|store| check_deletes(store.as_ref()));
}

#[test]
fn test_seed_and_expand() {
    each_backend(check_seed_and_expand);
}

#[test]
fn test_expansion_order_is_backend_independent() {
    each_backend(check_expansion_order);
}

#[test]
fn test_sqlite_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    let (project, nodes) = {
        let store = SqliteGraphStore::new(&path).unwrap();
        populate(&store)
    };

    let reopened = SqliteGraphStore::new(&path).unwrap();
    assert_eq!(reopened.resolve_project_id(ROOT).unwrap(), Some(project));
    assert_eq!(
        reopened.get_node(&nodes[3].id).unwrap().unwrap().name,
        "PasswordHasher"
    );
    assert_eq!(
        reopened.get_edges(&nodes[1].id, Direction::Both).unwrap().len(),
        2
    );
}

#[cfg(feature = "falkordb")]
mod falkor {
    use super::*;
    use std::time::Duration;
    use taskscope::storage::graph::FalkorGraphStore;

    fn store() -> Arc<dyn CodeGraphStore> {
        let url = std::env::var("TASKSCOPE_FALKOR_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let graph = format!("taskscope_test_{}", uuid::Uuid::new_v4().simple());
        Arc::new(FalkorGraphStore::new(&url, graph, Duration::from_secs(5)).unwrap())
    }

    #[test]
    #[ignore = "requires a FalkorDB server"]
    fn test_falkor_contract() {
        check_projects(store().as_ref());
        check_nodes_and_edges(store().as_ref());
        check_edge_upsert_replaces(store().as_ref());
        check_dangling_edge_rejected(store().as_ref());
        check_deletes(store().as_ref());
        check_seed_and_expand(store());
        check_expansion_order(store());
    }
}
