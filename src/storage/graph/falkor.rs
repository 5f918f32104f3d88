//! `FalkorDB` code graph store.
//!
//! Stores the code graph in a `FalkorDB` server, which speaks the Redis
//! protocol and answers Cypher through `GRAPH.QUERY`.
//!
//! # Graph Schema
//!
//! | Element | Label | Properties |
//! |---------|-------|------------|
//! | Project | `:Project` | `id`, `name`, `root_path` |
//! | Node | `:CodeNode` | `id`, `project_id`, `name`, `node_type`, `file_path`, `start_line`, `end_line` |
//! | Edge | `[:REL]` | `edge_type`, `caller_method`, `callee_method`, `line` |
//!
//! Edges share one relationship label so `(source, target, edge_type)` can be
//! merged as a unit.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! mode = "falkordb"
//! falkor_url = "redis://localhost:6379"
//! falkor_graph = "taskscope"
//! ```
//!
//! # Thread Safety
//!
//! The connection is cached behind a `Mutex` and reused across operations.

// Allow cast_possible_truncation and cast_sign_loss for Cypher integer results.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::models::{
    Direction, EdgeType, GraphEdge, GraphNode, NodeId, NodeType, ProjectId, ProjectRecord,
    normalize_path,
};
use crate::storage::traits::graph::{CodeGraphStore, GraphStats};
use crate::{Error, Result};
use redis::{Client, Connection, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

const NODE_COLUMNS: &str =
    "n.id, n.project_id, n.name, n.node_type, n.file_path, n.start_line, n.end_line";
const EDGE_COLUMNS: &str =
    "a.id, b.id, r.edge_type, r.caller_method, r.callee_method, r.line";

/// `FalkorDB`-backed code graph store.
pub struct FalkorGraphStore {
    client: Client,
    graph: String,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl FalkorGraphStore {
    /// Creates a store for `url` and graph key `graph`.
    ///
    /// No connection is opened until the first query.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: &str, graph: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::open(url).map_err(|e| Error::BackendUnavailable {
            backend: "falkordb".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self {
            client,
            graph: graph.into(),
            timeout,
            connection: Mutex::new(None),
        })
    }

    /// Returns true if the server answers `PING`.
    #[must_use]
    pub fn health_check(&self) -> bool {
        let Ok(mut conn) = self.get_connection() else {
            return false;
        };
        let result: redis::RedisResult<String> = redis::cmd("PING").query(&mut conn);
        let healthy = result.is_ok_and(|r| r == "PONG");
        self.return_connection(conn);
        healthy
    }

    fn get_connection(&self) -> Result<Connection> {
        let mut guard = self.connection.lock().map_err(|e| Error::OperationFailed {
            operation: "falkor_lock_connection".to_string(),
            cause: e.to_string(),
        })?;
        if let Some(conn) = guard.take() {
            return Ok(conn);
        }
        drop(guard);

        let conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(|e| Error::BackendUnavailable {
                backend: "falkordb".to_string(),
                cause: e.to_string(),
            })?;
        let _ = conn.set_read_timeout(Some(self.timeout));
        let _ = conn.set_write_timeout(Some(self.timeout));
        Ok(conn)
    }

    fn return_connection(&self, conn: Connection) {
        if let Ok(mut guard) = self.connection.lock() {
            *guard = Some(conn);
        }
    }

    /// Runs a Cypher query and returns its result rows.
    fn query(&self, cypher: &str) -> Result<Vec<Vec<Value>>> {
        let mut conn = self.get_connection()?;
        let result: redis::RedisResult<Value> = redis::cmd("GRAPH.QUERY")
            .arg(&self.graph)
            .arg(cypher)
            .query(&mut conn);
        match result {
            Ok(value) => {
                self.return_connection(conn);
                Ok(extract_rows(value))
            },
            Err(e) => {
                // Drop the connection; it may be in an unknown state.
                Err(Error::OperationFailed {
                    operation: "falkor_graph_query".to_string(),
                    cause: e.to_string(),
                })
            },
        }
    }

    fn query_nodes(&self, cypher: &str) -> Result<Vec<GraphNode>> {
        Ok(self
            .query(cypher)?
            .iter()
            .filter_map(|row| parse_node_row(row))
            .collect())
    }

    fn query_edges(&self, cypher: &str) -> Result<Vec<GraphEdge>> {
        Ok(self
            .query(cypher)?
            .iter()
            .filter_map(|row| parse_edge_row(row))
            .collect())
    }

    fn count(&self, cypher: &str) -> Result<usize> {
        Ok(self
            .query(cypher)?
            .first()
            .and_then(|row| row.first())
            .and_then(value_to_i64)
            .map_or(0, |n| n.max(0) as usize))
    }
}

/// Extracts rows from a verbose `GRAPH.QUERY` reply.
///
/// The reply is `[header, rows, statistics]` for read queries and
/// `[statistics]` for pure writes.
fn extract_rows(value: Value) -> Vec<Vec<Value>> {
    let Value::Array(parts) = value else {
        return Vec::new();
    };
    if parts.len() < 3 {
        return Vec::new();
    }
    match parts.into_iter().nth(1) {
        Some(Value::Array(rows)) => rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Array(cells) => Some(cells),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(s) => Some(String::from_utf8_lossy(s).to_string()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Double(d) => Some(*d as i64),
        other => value_to_string(other).and_then(|s| s.parse().ok()),
    }
}

fn value_to_u32(value: &Value) -> Option<u32> {
    value_to_i64(value).and_then(|v| u32::try_from(v).ok())
}

fn parse_node_row(row: &[Value]) -> Option<GraphNode> {
    let [id, project_id, name, node_type, file_path, start, end] = row else {
        return None;
    };
    Some(GraphNode {
        id: NodeId::new(value_to_string(id)?),
        project_id: ProjectId::new(value_to_string(project_id)?),
        name: value_to_string(name)?,
        node_type: NodeType::parse(&value_to_string(node_type)?)?,
        file_path: value_to_string(file_path)?,
        start_line: value_to_u32(start),
        end_line: value_to_u32(end),
    })
}

fn parse_edge_row(row: &[Value]) -> Option<GraphEdge> {
    let [source, target, edge_type, caller, callee, line] = row else {
        return None;
    };
    Some(GraphEdge {
        source: NodeId::new(value_to_string(source)?),
        target: NodeId::new(value_to_string(target)?),
        edge_type: EdgeType::parse(&value_to_string(edge_type)?)?,
        caller_method: value_to_string(caller),
        callee_method: value_to_string(callee),
        line: value_to_u32(line),
    })
}

/// Quotes a string as a Cypher literal.
fn cypher_string_literal(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('\'');
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

fn optional_literal(value: Option<&str>) -> String {
    value.map_or_else(|| "null".to_string(), cypher_string_literal)
}

fn optional_number(value: Option<u32>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

fn id_list(ids: &[NodeId]) -> String {
    let quoted: Vec<String> = ids.iter().map(|id| cypher_string_literal(id.as_str())).collect();
    format!("[{}]", quoted.join(", "))
}

impl CodeGraphStore for FalkorGraphStore {
    fn backend_name(&self) -> &'static str {
        "falkordb"
    }

    #[instrument(skip(self), fields(backend = "falkordb"))]
    fn resolve_project_id(&self, root_path: &str) -> Result<Option<ProjectId>> {
        let rows = self.query(&format!(
            "MATCH (p:Project {{root_path: {}}}) RETURN p.id LIMIT 1",
            cypher_string_literal(&normalize_path(root_path))
        ))?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(value_to_string)
            .map(ProjectId::new))
    }

    fn register_project(&self, root_path: &str, name: &str) -> Result<ProjectId> {
        if let Some(existing) = self.resolve_project_id(root_path)? {
            return Ok(existing);
        }
        let id = uuid::Uuid::now_v7().to_string();
        self.query(&format!(
            "MERGE (p:Project {{root_path: {}}}) ON CREATE SET p.id = {}, p.name = {} RETURN p.id",
            cypher_string_literal(&normalize_path(root_path)),
            cypher_string_literal(&id),
            cypher_string_literal(name),
        ))?;
        // A concurrent register may have won the MERGE.
        Ok(self
            .resolve_project_id(root_path)?
            .unwrap_or_else(|| ProjectId::new(id)))
    }

    fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let rows = self.query("MATCH (p:Project) RETURN p.id, p.name, p.root_path ORDER BY p.name")?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let [id, name, root] = row.as_slice() else {
                    return None;
                };
                Some(ProjectRecord {
                    id: ProjectId::new(value_to_string(id)?),
                    name: value_to_string(name)?,
                    root_path: value_to_string(root)?,
                })
            })
            .collect())
    }

    fn get_node(&self, id: &NodeId) -> Result<Option<GraphNode>> {
        Ok(self
            .query_nodes(&format!(
                "MATCH (n:CodeNode {{id: {}}}) RETURN {NODE_COLUMNS} LIMIT 1",
                cypher_string_literal(id.as_str())
            ))?
            .into_iter()
            .next())
    }

    #[instrument(skip(self), fields(backend = "falkordb"))]
    fn find_nodes(
        &self,
        project: &ProjectId,
        node_type: Option<NodeType>,
    ) -> Result<Vec<GraphNode>> {
        let type_clause = node_type
            .map(|t| format!(" AND n.node_type = {}", cypher_string_literal(t.as_str())))
            .unwrap_or_default();
        self.query_nodes(&format!(
            "MATCH (n:CodeNode) WHERE n.project_id = {}{type_clause} RETURN {NODE_COLUMNS} ORDER BY n.id",
            cypher_string_literal(project.as_str())
        ))
    }

    fn find_nodes_by_path_suffix(&self, project: &ProjectId, path: &str) -> Result<Vec<GraphNode>> {
        let normalized = normalize_path(path);
        let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
        let candidates = self.query_nodes(&format!(
            "MATCH (n:CodeNode) WHERE n.project_id = {} AND n.node_type = 'file' AND n.file_path ENDS WITH {} \
             RETURN {NODE_COLUMNS} ORDER BY n.id",
            cypher_string_literal(project.as_str()),
            cypher_string_literal(file_name),
        ))?;
        Ok(candidates
            .into_iter()
            .filter(|n| n.path_matches_suffix(&normalized))
            .collect())
    }

    fn get_edges(&self, node: &NodeId, direction: Direction) -> Result<Vec<GraphEdge>> {
        let id = cypher_string_literal(node.as_str());
        let outgoing = || {
            self.query_edges(&format!(
                "MATCH (a:CodeNode {{id: {id}}})-[r:REL]->(b:CodeNode) RETURN {EDGE_COLUMNS} ORDER BY b.id, r.edge_type"
            ))
        };
        let incoming = || {
            self.query_edges(&format!(
                "MATCH (a:CodeNode)-[r:REL]->(b:CodeNode {{id: {id}}}) RETURN {EDGE_COLUMNS} ORDER BY a.id, r.edge_type"
            ))
        };
        match direction {
            Direction::Outgoing => outgoing(),
            Direction::Incoming => incoming(),
            Direction::Both => {
                let mut edges = outgoing()?;
                // A self-loop shows up in both directions; keep one copy.
                edges.extend(incoming()?.into_iter().filter(|e| !e.is_self_loop()));
                Ok(edges)
            },
        }
    }

    #[instrument(skip(self, nodes), fields(backend = "falkordb", count = nodes.len()))]
    fn upsert_nodes(&self, nodes: &[GraphNode]) -> Result<usize> {
        for node in nodes {
            self.query(&format!(
                "MERGE (n:CodeNode {{id: {}}}) SET n.project_id = {}, n.name = {}, n.node_type = {}, \
                 n.file_path = {}, n.start_line = {}, n.end_line = {}",
                cypher_string_literal(node.id.as_str()),
                cypher_string_literal(node.project_id.as_str()),
                cypher_string_literal(&node.name),
                cypher_string_literal(node.node_type.as_str()),
                cypher_string_literal(&normalize_path(&node.file_path)),
                optional_number(node.start_line),
                optional_number(node.end_line),
            ))?;
        }
        Ok(nodes.len())
    }

    #[instrument(skip(self, edges), fields(backend = "falkordb", count = edges.len()))]
    fn upsert_edges(&self, edges: &[GraphEdge]) -> Result<usize> {
        for edge in edges {
            for endpoint in [&edge.source, &edge.target] {
                let found = self.count(&format!(
                    "MATCH (n:CodeNode {{id: {}}}) RETURN count(n)",
                    cypher_string_literal(endpoint.as_str())
                ))?;
                if found == 0 {
                    return Err(Error::InvalidInput(format!(
                        "edge endpoint {endpoint} does not exist"
                    )));
                }
            }
        }
        for edge in edges {
            self.query(&format!(
                "MATCH (a:CodeNode {{id: {}}}), (b:CodeNode {{id: {}}}) \
                 MERGE (a)-[r:REL {{edge_type: {}}}]->(b) \
                 SET r.caller_method = {}, r.callee_method = {}, r.line = {}",
                cypher_string_literal(edge.source.as_str()),
                cypher_string_literal(edge.target.as_str()),
                cypher_string_literal(edge.edge_type.as_str()),
                optional_literal(edge.caller_method.as_deref()),
                optional_literal(edge.callee_method.as_deref()),
                optional_number(edge.line),
            ))?;
        }
        Ok(edges.len())
    }

    fn delete_nodes(&self, ids: &[NodeId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let list = id_list(ids);
        let existing = self.count(&format!(
            "MATCH (n:CodeNode) WHERE n.id IN {list} RETURN count(n)"
        ))?;
        self.query(&format!(
            "MATCH (n:CodeNode) WHERE n.id IN {list} DETACH DELETE n"
        ))?;
        Ok(existing)
    }

    #[instrument(skip(self), fields(backend = "falkordb"))]
    fn delete_by_project(&self, project: &ProjectId) -> Result<usize> {
        let id = cypher_string_literal(project.as_str());
        let existing = self.count(&format!(
            "MATCH (n:CodeNode) WHERE n.project_id = {id} RETURN count(n)"
        ))?;
        self.query(&format!(
            "MATCH (n:CodeNode) WHERE n.project_id = {id} DETACH DELETE n"
        ))?;
        self.query(&format!("MATCH (p:Project {{id: {id}}}) DETACH DELETE p"))?;
        Ok(existing)
    }

    fn stats(&self, project: &ProjectId) -> Result<GraphStats> {
        let id = cypher_string_literal(project.as_str());
        let mut stats = GraphStats::new();
        for row in self.query(&format!(
            "MATCH (n:CodeNode) WHERE n.project_id = {id} RETURN n.node_type, count(n)"
        ))? {
            if let [t, c] = row.as_slice()
                && let Some(node_type) = value_to_string(t).and_then(|s| NodeType::parse(&s))
            {
                let count = value_to_i64(c).unwrap_or(0).max(0) as usize;
                stats.nodes_by_type.insert(node_type, count);
                stats.node_count += count;
            }
        }
        for row in self.query(&format!(
            "MATCH (a:CodeNode)-[r:REL]->(:CodeNode) WHERE a.project_id = {id} RETURN r.edge_type, count(r)"
        ))? {
            if let [t, c] = row.as_slice()
                && let Some(edge_type) = value_to_string(t).and_then(|s| EdgeType::parse(&s))
            {
                let count = value_to_i64(c).unwrap_or(0).max(0) as usize;
                stats.edges_by_type.insert(edge_type, count);
                stats.edge_count += count;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cypher_string_literal_escapes() {
        assert_eq!(cypher_string_literal("it's"), "'it\\'s'");
        assert_eq!(cypher_string_literal("a\\b\nc"), "'a\\\\b\\nc'");
    }

    #[test]
    fn test_extract_rows_from_verbose_reply() {
        let reply = Value::Array(vec![
            Value::Array(vec![Value::BulkString(b"p.id".to_vec())]),
            Value::Array(vec![Value::Array(vec![Value::BulkString(b"abc".to_vec())])]),
            Value::Array(vec![Value::BulkString(b"Query internal execution time: 0.1 ms".to_vec())]),
        ]);
        let rows = extract_rows(reply);
        assert_eq!(rows.len(), 1);
        assert_eq!(value_to_string(&rows[0][0]).as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_rows_from_write_reply() {
        let reply = Value::Array(vec![Value::Array(vec![Value::BulkString(
            b"Nodes created: 1".to_vec(),
        )])]);
        assert!(extract_rows(reply).is_empty());
    }

    #[test]
    fn test_parse_node_row() {
        let row = vec![
            Value::BulkString(b"n1".to_vec()),
            Value::BulkString(b"p1".to_vec()),
            Value::BulkString(b"AuthService".to_vec()),
            Value::BulkString(b"class".to_vec()),
            Value::BulkString(b"src/auth.ts".to_vec()),
            Value::Int(4),
            Value::Nil,
        ];
        let node = parse_node_row(&row).unwrap();
        assert_eq!(node.node_type, NodeType::Class);
        assert_eq!(node.start_line, Some(4));
        assert_eq!(node.end_line, None);
    }

    #[test]
    fn test_parse_edge_row_rejects_unknown_type() {
        let row = vec![
            Value::BulkString(b"a".to_vec()),
            Value::BulkString(b"b".to_vec()),
            Value::BulkString(b"teleports".to_vec()),
            Value::Nil,
            Value::Nil,
            Value::Nil,
        ];
        assert!(parse_edge_row(&row).is_none());
    }

    #[test]
    #[ignore = "requires a running FalkorDB server (TASKSCOPE_FALKOR_URL)"]
    fn test_live_roundtrip() {
        let url = std::env::var("TASKSCOPE_FALKOR_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = FalkorGraphStore::new(&url, "taskscope_test", Duration::from_secs(5)).unwrap();
        let project = store.register_project("/tmp/falkor-test", "falkor-test").unwrap();
        store
            .upsert_nodes(&[GraphNode::new(
                NodeId::new("falkor-f1"),
                "a.ts",
                NodeType::File,
                "src/a.ts",
                project.clone(),
            )])
            .unwrap();
        assert_eq!(store.find_nodes(&project, None).unwrap().len(), 1);
        assert_eq!(store.delete_by_project(&project).unwrap(), 1);
    }
}
