//! `SQLite` code graph store.
//!
//! Provides project, node and edge storage in a single database file.
//! Edges cascade when their endpoints are deleted.

// Allow cast_possible_truncation and cast_sign_loss for SQLite i64 to usize/u32 conversions.
// SQLite returns i64, but line numbers and counts are inherently non-negative and small.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// Allow redundant_closure_for_method_calls - closures needed due to rusqlite's Error type.
#![allow(clippy::redundant_closure_for_method_calls)]

use crate::models::{
    Direction, EdgeType, GraphEdge, GraphNode, NodeId, NodeType, ProjectId, ProjectRecord,
    normalize_path,
};
use crate::storage::traits::graph::{CodeGraphStore, GraphStats};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::instrument;

/// Helper to acquire mutex lock with poison recovery.
fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Graph SQLite mutex was poisoned, recovering");
            metrics::counter!("graph_sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

fn sql_error(operation: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// `SQLite`-based code graph store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. WAL mode and `busy_timeout`
/// handle concurrent access from other processes gracefully.
///
/// # Schema
///
/// Three tables store the graph:
/// - `code_projects`: Registered project roots
/// - `code_nodes`: Files and declarations
/// - `code_edges`: Directed relationships, keyed by `(source, target, edge_type)`
pub struct SqliteGraphStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteGraphStore {
    /// Opens or creates a store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_graph_dir", e))?;
        }
        let conn = Connection::open(&db_path).map_err(sql_error("open_graph_sqlite"))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error("open_graph_sqlite_memory"))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Initializes the database schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        // Enable WAL mode for better concurrent read performance
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        // Edges cascade on node delete
        let _ = conn.pragma_update(None, "foreign_keys", "ON");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS code_projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                root_path TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(sql_error("create_code_projects_table"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS code_nodes (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                node_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                start_line INTEGER,
                end_line INTEGER
            )",
            [],
        )
        .map_err(sql_error("create_code_nodes_table"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS code_edges (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                caller_method TEXT,
                callee_method TEXT,
                line INTEGER,
                PRIMARY KEY (source_id, target_id, edge_type),
                FOREIGN KEY (source_id) REFERENCES code_nodes(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES code_nodes(id) ON DELETE CASCADE
            )",
            [],
        )
        .map_err(sql_error("create_code_edges_table"))?;

        Self::create_indexes(&conn);

        Ok(())
    }

    /// Creates indexes for optimized queries.
    fn create_indexes(conn: &Connection) {
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_code_nodes_project_type ON code_nodes(project_id, node_type)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_code_nodes_file_path ON code_nodes(file_path)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_code_edges_source ON code_edges(source_id)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_code_edges_target ON code_edges(target_id)",
            [],
        );
    }

    /// Parses a node from a database row.
    fn parse_node_row(row: &Row<'_>) -> rusqlite::Result<GraphNode> {
        let id: String = row.get("id")?;
        let project_id: String = row.get("project_id")?;
        let name: String = row.get("name")?;
        let node_type_str: String = row.get("node_type")?;
        let file_path: String = row.get("file_path")?;
        let start_line: Option<i64> = row.get("start_line")?;
        let end_line: Option<i64> = row.get("end_line")?;

        let node_type = NodeType::parse(&node_type_str).unwrap_or(NodeType::File);

        Ok(GraphNode {
            id: NodeId::new(id),
            name,
            node_type,
            file_path,
            start_line: start_line.map(|l| l as u32),
            end_line: end_line.map(|l| l as u32),
            project_id: ProjectId::new(project_id),
        })
    }

    /// Parses an edge from a database row.
    fn parse_edge_row(row: &Row<'_>) -> rusqlite::Result<GraphEdge> {
        let source: String = row.get("source_id")?;
        let target: String = row.get("target_id")?;
        let edge_type_str: String = row.get("edge_type")?;
        let caller_method: Option<String> = row.get("caller_method")?;
        let callee_method: Option<String> = row.get("callee_method")?;
        let line: Option<i64> = row.get("line")?;

        let edge_type = EdgeType::parse(&edge_type_str).unwrap_or(EdgeType::Uses);

        Ok(GraphEdge {
            source: NodeId::new(source),
            target: NodeId::new(target),
            edge_type,
            caller_method,
            callee_method,
            line: line.map(|l| l as u32),
        })
    }

    fn query_nodes(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<GraphNode>> {
        let mut stmt = conn.prepare(sql).map_err(sql_error("prepare_node_query"))?;
        let rows = stmt
            .query_map(params, Self::parse_node_row)
            .map_err(sql_error("query_nodes"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_error("read_node_row"))
    }

    fn node_exists(conn: &Connection, id: &NodeId) -> Result<bool> {
        conn.query_row(
            "SELECT 1 FROM code_nodes WHERE id = ?1",
            params![id.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map(|r| r.is_some())
        .map_err(sql_error("check_node_exists"))
    }

    fn delete_node_ids(conn: &Connection, ids: &[NodeId]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            // Explicit edge delete keeps this correct if foreign keys are off.
            conn.execute(
                "DELETE FROM code_edges WHERE source_id = ?1 OR target_id = ?1",
                params![id.as_str()],
            )
            .map_err(sql_error("delete_node_edges"))?;
            removed += conn
                .execute("DELETE FROM code_nodes WHERE id = ?1", params![id.as_str()])
                .map_err(sql_error("delete_node"))?;
        }
        Ok(removed)
    }
}

impl CodeGraphStore for SqliteGraphStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    fn resolve_project_id(&self, root_path: &str) -> Result<Option<ProjectId>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id FROM code_projects WHERE root_path = ?1",
            params![normalize_path(root_path)],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map(|id| id.map(ProjectId::new))
        .map_err(sql_error("resolve_project_id"))
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    fn register_project(&self, root_path: &str, name: &str) -> Result<ProjectId> {
        let root = normalize_path(root_path);
        let conn = acquire_lock(&self.conn);
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM code_projects WHERE root_path = ?1",
                params![root],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_error("lookup_project"))?;
        if let Some(id) = existing {
            return Ok(ProjectId::new(id));
        }

        let id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO code_projects (id, name, root_path, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, root, crate::current_timestamp() as i64],
        )
        .map_err(sql_error("register_project"))?;
        Ok(ProjectId::new(id))
    }

    fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT id, name, root_path FROM code_projects ORDER BY name")
            .map_err(sql_error("prepare_list_projects"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProjectRecord {
                    id: ProjectId::new(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    root_path: row.get(2)?,
                })
            })
            .map_err(sql_error("list_projects"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_error("read_project_row"))
    }

    fn get_node(&self, id: &NodeId) -> Result<Option<GraphNode>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM code_nodes WHERE id = ?1",
            params![id.as_str()],
            Self::parse_node_row,
        )
        .optional()
        .map_err(sql_error("get_node"))
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    fn find_nodes(
        &self,
        project: &ProjectId,
        node_type: Option<NodeType>,
    ) -> Result<Vec<GraphNode>> {
        let conn = acquire_lock(&self.conn);
        match node_type {
            Some(t) => Self::query_nodes(
                &conn,
                "SELECT * FROM code_nodes WHERE project_id = ?1 AND node_type = ?2 ORDER BY id",
                &[&project.as_str(), &t.as_str()],
            ),
            None => Self::query_nodes(
                &conn,
                "SELECT * FROM code_nodes WHERE project_id = ?1 ORDER BY id",
                &[&project.as_str()],
            ),
        }
    }

    fn find_nodes_by_path_suffix(&self, project: &ProjectId, path: &str) -> Result<Vec<GraphNode>> {
        let normalized = normalize_path(path);
        let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
        let pattern = format!("%{file_name}");
        let conn = acquire_lock(&self.conn);
        let candidates = Self::query_nodes(
            &conn,
            "SELECT * FROM code_nodes
             WHERE project_id = ?1 AND node_type = 'file' AND file_path LIKE ?2
             ORDER BY id",
            &[&project.as_str(), &pattern],
        )?;
        Ok(candidates
            .into_iter()
            .filter(|n| n.path_matches_suffix(&normalized))
            .collect())
    }

    fn get_edges(&self, node: &NodeId, direction: Direction) -> Result<Vec<GraphEdge>> {
        let sql = match direction {
            Direction::Outgoing => "SELECT * FROM code_edges WHERE source_id = ?1 ORDER BY rowid",
            Direction::Incoming => "SELECT * FROM code_edges WHERE target_id = ?1 ORDER BY rowid",
            Direction::Both => {
                "SELECT * FROM code_edges WHERE source_id = ?1 OR target_id = ?1 ORDER BY rowid"
            },
        };
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(sql).map_err(sql_error("prepare_get_edges"))?;
        let rows = stmt
            .query_map(params![node.as_str()], Self::parse_edge_row)
            .map_err(sql_error("get_edges"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_error("read_edge_row"))
    }

    #[instrument(skip(self, nodes), fields(backend = "sqlite", count = nodes.len()))]
    fn upsert_nodes(&self, nodes: &[GraphNode]) -> Result<usize> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(sql_error("begin_upsert_nodes"))?;
        {
            // ON CONFLICT keeps the row, so edges are not cascaded away.
            let mut stmt = tx
                .prepare(
                    "INSERT INTO code_nodes (id, project_id, name, node_type, file_path, start_line, end_line)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                        project_id = excluded.project_id,
                        name = excluded.name,
                        node_type = excluded.node_type,
                        file_path = excluded.file_path,
                        start_line = excluded.start_line,
                        end_line = excluded.end_line",
                )
                .map_err(sql_error("prepare_upsert_node"))?;
            for node in nodes {
                stmt.execute(params![
                    node.id.as_str(),
                    node.project_id.as_str(),
                    node.name,
                    node.node_type.as_str(),
                    normalize_path(&node.file_path),
                    node.start_line,
                    node.end_line,
                ])
                .map_err(sql_error("upsert_node"))?;
            }
        }
        tx.commit().map_err(sql_error("commit_upsert_nodes"))?;
        Ok(nodes.len())
    }

    #[instrument(skip(self, edges), fields(backend = "sqlite", count = edges.len()))]
    fn upsert_edges(&self, edges: &[GraphEdge]) -> Result<usize> {
        let mut conn = acquire_lock(&self.conn);
        for edge in edges {
            for endpoint in [&edge.source, &edge.target] {
                if !Self::node_exists(&conn, endpoint)? {
                    return Err(Error::InvalidInput(format!(
                        "edge endpoint {endpoint} does not exist"
                    )));
                }
            }
        }

        let tx = conn.transaction().map_err(sql_error("begin_upsert_edges"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO code_edges (source_id, target_id, edge_type, caller_method, callee_method, line)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(source_id, target_id, edge_type) DO UPDATE SET
                        caller_method = excluded.caller_method,
                        callee_method = excluded.callee_method,
                        line = excluded.line",
                )
                .map_err(sql_error("prepare_upsert_edge"))?;
            for edge in edges {
                stmt.execute(params![
                    edge.source.as_str(),
                    edge.target.as_str(),
                    edge.edge_type.as_str(),
                    edge.caller_method,
                    edge.callee_method,
                    edge.line,
                ])
                .map_err(sql_error("upsert_edge"))?;
            }
        }
        tx.commit().map_err(sql_error("commit_upsert_edges"))?;
        Ok(edges.len())
    }

    fn delete_nodes(&self, ids: &[NodeId]) -> Result<usize> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(sql_error("begin_delete_nodes"))?;
        let removed = Self::delete_node_ids(&tx, ids)?;
        tx.commit().map_err(sql_error("commit_delete_nodes"))?;
        Ok(removed)
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    fn delete_by_project(&self, project: &ProjectId) -> Result<usize> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(sql_error("begin_delete_project"))?;
        tx.execute(
            "DELETE FROM code_edges WHERE source_id IN (SELECT id FROM code_nodes WHERE project_id = ?1)
                OR target_id IN (SELECT id FROM code_nodes WHERE project_id = ?1)",
            params![project.as_str()],
        )
        .map_err(sql_error("delete_project_edges"))?;
        let removed = tx
            .execute(
                "DELETE FROM code_nodes WHERE project_id = ?1",
                params![project.as_str()],
            )
            .map_err(sql_error("delete_project_nodes"))?;
        tx.execute(
            "DELETE FROM code_projects WHERE id = ?1",
            params![project.as_str()],
        )
        .map_err(sql_error("delete_project"))?;
        tx.commit().map_err(sql_error("commit_delete_project"))?;
        Ok(removed)
    }

    fn stats(&self, project: &ProjectId) -> Result<GraphStats> {
        let conn = acquire_lock(&self.conn);
        let mut stats = GraphStats::new();

        let mut stmt = conn
            .prepare("SELECT node_type, COUNT(*) FROM code_nodes WHERE project_id = ?1 GROUP BY node_type")
            .map_err(sql_error("prepare_node_stats"))?;
        let rows = stmt
            .query_map(params![project.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(sql_error("node_stats"))?;
        for row in rows {
            let (node_type, count) = row.map_err(sql_error("read_node_stats"))?;
            if let Some(t) = NodeType::parse(&node_type) {
                stats.nodes_by_type.insert(t, count as usize);
                stats.node_count += count as usize;
            }
        }

        let mut stmt = conn
            .prepare(
                "SELECT e.edge_type, COUNT(*) FROM code_edges e
                 JOIN code_nodes n ON e.source_id = n.id
                 WHERE n.project_id = ?1 GROUP BY e.edge_type",
            )
            .map_err(sql_error("prepare_edge_stats"))?;
        let rows = stmt
            .query_map(params![project.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(sql_error("edge_stats"))?;
        for row in rows {
            let (edge_type, count) = row.map_err(sql_error("read_edge_stats"))?;
            if let Some(t) = EdgeType::parse(&edge_type) {
                stats.edges_by_type.insert(t, count as usize);
                stats.edge_count += count as usize;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
#[allow(clippy::redundant_clone)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn node(id: &str, name: &str, node_type: NodeType, path: &str, project: &ProjectId) -> GraphNode {
        GraphNode::new(NodeId::new(id), name, node_type, path, project.clone())
    }

    fn seeded() -> (SqliteGraphStore, ProjectId) {
        let store = SqliteGraphStore::in_memory().unwrap();
        let project = store.register_project("/work/app", "app").unwrap();
        store
            .upsert_nodes(&[
                node("f1", "login.ts", NodeType::File, "src/auth/login.ts", &project),
                node("c1", "LoginHandler", NodeType::Class, "src/auth/login.ts", &project).with_lines(3, 40),
                node("c2", "TokenStore", NodeType::Class, "src/auth/token.ts", &project),
            ])
            .unwrap();
        store
            .upsert_edges(&[
                GraphEdge::new(NodeId::new("f1"), NodeId::new("c1"), EdgeType::Contains),
                GraphEdge::new(NodeId::new("c1"), NodeId::new("c2"), EdgeType::Calls)
                    .with_methods("login", "save")
                    .with_line(17),
            ])
            .unwrap();
        (store, project)
    }

    #[test]
    fn test_roundtrip_node_and_edge() {
        let (store, _) = seeded();
        let c1 = store.get_node(&NodeId::new("c1")).unwrap().unwrap();
        assert_eq!(c1.name, "LoginHandler");
        assert_eq!(c1.line_range(), Some((3, 40)));

        let edges = store.get_edges(&NodeId::new("c1"), Direction::Outgoing).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].caller_method.as_deref(), Some("login"));
        assert_eq!(edges[0].line, Some(17));
    }

    #[test]
    fn test_node_upsert_keeps_edges() {
        let (store, project) = seeded();
        store
            .upsert_nodes(&[node("c1", "LoginHandler", NodeType::Class, "src/auth/login.ts", &project)])
            .unwrap();
        let edges = store.get_edges(&NodeId::new("c1"), Direction::Both).unwrap();
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn test_missing_endpoint_rejected() {
        let (store, _) = seeded();
        let result = store.upsert_edges(&[GraphEdge::new(
            NodeId::new("c1"),
            NodeId::new("nope"),
            EdgeType::Calls,
        )]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_path_suffix_with_windows_separators() {
        let (store, project) = seeded();
        let found = store
            .find_nodes_by_path_suffix(&project, "C:\\work\\app\\src\\auth\\login.ts")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node_type, NodeType::File);
    }

    #[test]
    fn test_delete_by_project() {
        let (store, project) = seeded();
        assert_eq!(store.delete_by_project(&project).unwrap(), 3);
        assert!(store.get_node(&NodeId::new("c1")).unwrap().is_none());
        assert!(store.get_edges(&NodeId::new("c1"), Direction::Both).unwrap().is_empty());
        assert!(store.resolve_project_id("/work/app").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let (store, project) = seeded();
        let stats = store.stats(&project).unwrap();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 2);
        assert_eq!(stats.nodes_by_type.get(&NodeType::Class), Some(&2));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        let project = {
            let store = SqliteGraphStore::new(&path).unwrap();
            let project = store.register_project("/work/app", "app").unwrap();
            store
                .upsert_nodes(&[node("f1", "a.ts", NodeType::File, "a.ts", &project)])
                .unwrap();
            project
        };
        let reopened = SqliteGraphStore::new(&path).unwrap();
        assert_eq!(reopened.resolve_project_id("/work/app").unwrap(), Some(project.clone()));
        assert_eq!(reopened.find_nodes(&project, None).unwrap().len(), 1);
        assert_eq!(reopened.db_path(), Some(path.as_path()));
    }
}
