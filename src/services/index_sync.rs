//! Code graph synchronization after agent edits.
//!
//! [`GraphIndexSync`] re-extracts declarations from modified files with
//! light line-oriented regexes. It never parses: the goal is to keep file
//! and declaration nodes current until the next full index, not to
//! replace it.
//!
//! For each modified file:
//! - missing on disk: its nodes and text document are removed
//! - present: file and declaration nodes are upserted with `contains`
//!   edges, declarations no longer present are deleted, and `extends` /
//!   `implements` clauses become edges when the target is already known
//!
//! Retrieval caches for the root and the touched files are invalidated.

// Static regexes are compiled from literals.
#![allow(clippy::expect_used)]

use crate::models::{
    EdgeType, GraphEdge, GraphNode, NodeId, NodeType, ProjectId, SyncReport, normalize_path,
};
use crate::services::retrieval_cache::RetrievalCache;
use crate::storage::{CodeGraphStore, TextIndex};
use crate::{Error, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::instrument;

/// Files larger than this are not re-extracted; their indexed declarations
/// are kept.
pub const MAX_SYNC_FILE_BYTES: u64 = 1024 * 1024;

static CLASS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\s*)(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:(?:abstract|final|public|private|protected|static|sealed|data|open)\s+)*(?:class|struct|enum)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("static regex: class declaration")
});

static GO_TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)type\s+([A-Za-z_][A-Za-z0-9_]*)\s+(struct|interface)\b")
        .expect("static regex: go type declaration")
});

static INTERFACE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\s*)(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:(?:public|private|protected|sealed)\s+)*(?:interface|trait|protocol)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("static regex: interface declaration")
});

static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\s*)(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:(?:public|private|protected|static|async|const|unsafe|override)\s+)*(?:function\*?|fn|def|func)\s+(?:\([^)]*\)\s*)?([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("static regex: function declaration")
});

static EXTENDS_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bextends\s+([A-Za-z_][A-Za-z0-9_]*)").expect("static regex: extends clause")
});

static IMPLEMENTS_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bimplements\s+([A-Za-z_][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*)*)")
        .expect("static regex: implements clause")
});

/// Updates the index after files changed.
pub trait IndexSync: Send + Sync {
    /// Re-indexes the modified files of the project at `root`.
    ///
    /// Paths may be relative to `root` or absolute.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects a write.
    fn update_index(&self, root: &Path, modified: &[String]) -> Result<SyncReport>;
}

/// A declaration found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Declared name.
    pub name: String,
    /// Entity type.
    pub node_type: NodeType,
    /// First line (1-based).
    pub start_line: u32,
    /// Last line (1-based, inclusive).
    pub end_line: u32,
    /// Names from `extends` clauses.
    pub extends: Vec<String>,
    /// Names from `implements` clauses.
    pub implements: Vec<String>,
    indent: usize,
}

/// Extracts class, interface and function declarations.
///
/// Indented functions are reported as methods. A declaration ends on the
/// line before the next declaration at the same or a shallower indent.
#[must_use]
pub fn extract_declarations(content: &str) -> Vec<Declaration> {
    let mut found: Vec<Declaration> = Vec::new();
    let mut total_lines = 0u32;
    for (i, line) in content.lines().enumerate() {
        let line_no = u32::try_from(i + 1).unwrap_or(u32::MAX);
        total_lines = line_no;
        let Some((indent, name, node_type)) = match_declaration(line) else {
            continue;
        };
        let is_callable = node_type == NodeType::Function || node_type == NodeType::Method;
        let (extends, implements) = if is_callable {
            (Vec::new(), Vec::new())
        } else {
            heritage(line)
        };
        found.push(Declaration {
            name,
            node_type,
            start_line: line_no,
            end_line: line_no,
            extends,
            implements,
            indent,
        });
    }

    for i in 0..found.len() {
        let indent = found[i].indent;
        let next = found[i + 1..]
            .iter()
            .find(|d| d.indent <= indent)
            .map_or(total_lines, |d| d.start_line.saturating_sub(1));
        found[i].end_line = next.max(found[i].start_line);
    }
    found
}

fn match_declaration(line: &str) -> Option<(usize, String, NodeType)> {
    if let Some(caps) = GO_TYPE_DECL.captures(line) {
        let node_type = if &caps[3] == "interface" {
            NodeType::Interface
        } else {
            NodeType::Class
        };
        return Some((caps[1].len(), caps[2].to_string(), node_type));
    }
    if let Some(caps) = INTERFACE_DECL.captures(line) {
        return Some((caps[1].len(), caps[2].to_string(), NodeType::Interface));
    }
    if let Some(caps) = CLASS_DECL.captures(line) {
        return Some((caps[1].len(), caps[2].to_string(), NodeType::Class));
    }
    FUNCTION_DECL.captures(line).map(|caps| {
        let indent = caps[1].len();
        let node_type = if indent > 0 {
            NodeType::Method
        } else {
            NodeType::Function
        };
        (indent, caps[2].to_string(), node_type)
    })
}

fn heritage(line: &str) -> (Vec<String>, Vec<String>) {
    let extends = EXTENDS_CLAUSE
        .captures_iter(line)
        .map(|c| c[1].to_string())
        .collect();
    let implements = IMPLEMENTS_CLAUSE
        .captures(line)
        .map(|c| {
            c[1].split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    (extends, implements)
}

/// Synchronizes the code graph, an optional text index and the retrieval
/// caches.
pub struct GraphIndexSync {
    store: Arc<dyn CodeGraphStore>,
    text_index: Option<Arc<dyn TextIndex>>,
    cache: Option<Arc<RetrievalCache>>,
}

impl GraphIndexSync {
    /// Creates a sync over a graph store.
    #[must_use]
    pub fn new(store: Arc<dyn CodeGraphStore>) -> Self {
        Self {
            store,
            text_index: None,
            cache: None,
        }
    }

    /// Also feeds a text index.
    #[must_use]
    pub fn with_text_index(mut self, index: Arc<dyn TextIndex>) -> Self {
        self.text_index = Some(index);
        self
    }

    /// Invalidates the given retrieval caches.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<RetrievalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn project_for(&self, root: &Path) -> Result<ProjectId> {
        let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let root_str = canonical.to_string_lossy();
        if let Some(id) = self.store.resolve_project_id(&root_str)? {
            return Ok(id);
        }
        let name = canonical
            .file_name()
            .map_or_else(|| root_str.to_string(), |n| n.to_string_lossy().to_string());
        tracing::info!(root = %root_str, name = %name, "Registering project");
        self.store.register_project(&root_str, &name)
    }

    fn remove_file(&self, project: &ProjectId, relative: &str) -> Result<()> {
        let removed = self.store.delete_file(project, relative)?;
        tracing::debug!(path = relative, removed, "Removed nodes of deleted file");
        if let Some(index) = &self.text_index
            && let Err(e) = index.remove_document(project, relative)
        {
            tracing::warn!(path = relative, error = %e, "Failed to remove text document");
        }
        Ok(())
    }

    /// Upserts one file. Returns the number of nodes that did not exist.
    ///
    /// A file that cannot be read, or is over [`MAX_SYNC_FILE_BYTES`],
    /// keeps the declarations already indexed for it.
    fn sync_file(
        &self,
        project: &ProjectId,
        relative: &str,
        absolute: &Path,
        snapshot: &mut ProjectNodes,
    ) -> Result<usize> {
        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        let file_id = NodeId::derive(project, relative, NodeType::File, relative);
        let existing = snapshot.by_file.get(relative).cloned().unwrap_or_default();

        let Some(content) = read_source(absolute, relative) else {
            if existing.contains(&file_id) {
                return Ok(0);
            }
            let node =
                GraphNode::new(file_id, file_name, NodeType::File, relative, project.clone());
            self.store.upsert_nodes(std::slice::from_ref(&node))?;
            snapshot.replace_file(relative, &[node]);
            return Ok(1);
        };

        let line_count = u32::try_from(content.lines().count()).unwrap_or(u32::MAX);
        let mut nodes = vec![
            GraphNode::new(file_id.clone(), file_name, NodeType::File, relative, project.clone())
                .with_lines(1, line_count.max(1)),
        ];
        let declarations = extract_declarations(&content);
        let mut local: HashMap<String, NodeId> = HashMap::new();
        let mut ids: HashSet<NodeId> = HashSet::from([file_id.clone()]);
        for decl in &declarations {
            let id = NodeId::derive(project, relative, decl.node_type, &decl.name);
            local.entry(decl.name.clone()).or_insert_with(|| id.clone());
            // Overloads share an ID; the first declaration wins.
            if ids.insert(id.clone()) {
                nodes.push(
                    GraphNode::new(id, &decl.name, decl.node_type, relative, project.clone())
                        .with_lines(decl.start_line, decl.end_line),
                );
            }
        }

        let created = nodes.iter().filter(|n| !existing.contains(&n.id)).count();
        let stale: Vec<NodeId> = existing.difference(&ids).cloned().collect();
        if !stale.is_empty() {
            self.store.delete_nodes(&stale)?;
        }
        self.store.upsert_nodes(&nodes)?;

        let mut edges: Vec<GraphEdge> = nodes[1..]
            .iter()
            .map(|n| GraphEdge::new(file_id.clone(), n.id.clone(), EdgeType::Contains))
            .collect();
        for decl in &declarations {
            let Some(source) = local.get(&decl.name) else {
                continue;
            };
            let targets = decl
                .extends
                .iter()
                .map(|t| (t, EdgeType::Extends))
                .chain(decl.implements.iter().map(|t| (t, EdgeType::Implements)));
            for (target_name, edge_type) in targets {
                let target = local
                    .get(target_name)
                    .or_else(|| snapshot.type_outside(target_name, relative));
                if let Some(target) = target {
                    edges.push(GraphEdge::new(source.clone(), target.clone(), edge_type));
                }
            }
        }
        self.store.upsert_edges(&edges)?;
        snapshot.replace_file(relative, &nodes);

        if let Some(index) = &self.text_index
            && let Err(e) = index.index_document(project, relative, &content)
        {
            tracing::warn!(path = relative, error = %e, "Failed to index text document");
        }
        Ok(created)
    }
}

/// Nodes of one project, loaded once per sync and kept current as files
/// are processed.
#[derive(Debug, Default)]
struct ProjectNodes {
    /// Node IDs per normalized file path.
    by_file: HashMap<String, HashSet<NodeId>>,
    /// Classes and interfaces by name, with the file declaring them.
    types: HashMap<String, Vec<(String, NodeId)>>,
}

impl ProjectNodes {
    fn load(store: &dyn CodeGraphStore, project: &ProjectId) -> Result<Self> {
        let mut snapshot = Self::default();
        for node in store.find_nodes(project, None)? {
            snapshot.add(node);
        }
        Ok(snapshot)
    }

    fn add(&mut self, node: GraphNode) {
        let file = normalize_path(&node.file_path);
        if matches!(node.node_type, NodeType::Class | NodeType::Interface) {
            self.types
                .entry(node.name)
                .or_default()
                .push((file.clone(), node.id.clone()));
        }
        self.by_file.entry(file).or_default().insert(node.id);
    }

    fn remove_file(&mut self, relative: &str) {
        self.by_file.remove(relative);
        self.types.retain(|_, decls| {
            decls.retain(|(file, _)| file != relative);
            !decls.is_empty()
        });
    }

    fn replace_file(&mut self, relative: &str, nodes: &[GraphNode]) {
        self.remove_file(relative);
        for node in nodes {
            self.add(node.clone());
        }
    }

    /// A class or interface called `name` declared outside `relative`.
    fn type_outside(&self, name: &str, relative: &str) -> Option<&NodeId> {
        self.types
            .get(name)?
            .iter()
            .find(|(file, _)| file != relative)
            .map(|(_, id)| id)
    }
}

/// Reads a file for extraction. Invalid UTF-8 is replaced, not rejected.
fn read_source(absolute: &Path, relative: &str) -> Option<String> {
    let size = std::fs::metadata(absolute).map(|m| m.len()).unwrap_or(0);
    if size > MAX_SYNC_FILE_BYTES {
        tracing::debug!(path = relative, size, "File too large to re-extract");
        return None;
    }
    match std::fs::read(absolute) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::warn!(path = relative, error = %e, "Skipping unreadable file");
            None
        },
    }
}

/// Splits a modified path into its root-relative and absolute forms.
fn locate(root: &Path, canonical_root: &Path, path: &str) -> (String, PathBuf) {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        let relative = candidate
            .strip_prefix(root)
            .or_else(|_| candidate.strip_prefix(canonical_root))
            .map_or_else(|_| path.to_string(), |r| r.to_string_lossy().to_string());
        (normalize_path(&relative), candidate.to_path_buf())
    } else {
        let relative = normalize_path(path);
        (relative.clone(), root.join(relative))
    }
}

impl IndexSync for GraphIndexSync {
    #[instrument(
        skip(self, modified),
        fields(operation = "index_sync", backend = self.store.backend_name(), files = modified.len())
    )]
    fn update_index(&self, root: &Path, modified: &[String]) -> Result<SyncReport> {
        let start = Instant::now();
        if !root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "project root is not a directory: {}",
                root.display()
            )));
        }
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let project = self.project_for(root)?;
        let mut snapshot = ProjectNodes::load(self.store.as_ref(), &project)?;

        let mut report = SyncReport::default();
        let mut seen = HashSet::new();
        let mut absolutes = Vec::new();
        for path in modified {
            let (relative, absolute) = locate(root, &canonical_root, path);
            if relative.is_empty() || !seen.insert(relative.clone()) {
                continue;
            }
            if absolute.is_file() {
                report.nodes_created +=
                    self.sync_file(&project, &relative, &absolute, &mut snapshot)?;
            } else {
                self.remove_file(&project, &relative)?;
                snapshot.remove_file(&relative);
            }
            report.records_updated += 1;
            absolutes.push(absolute);
        }

        if let Some(cache) = &self.cache {
            report.cache_entries_updated = cache.invalidate_files(root, &absolutes);
            if canonical_root != root {
                report.cache_entries_updated +=
                    usize::from(cache.discovery.invalidate(&canonical_root));
            }
        }

        metrics::counter!("index_sync_files_total").increment(report.records_updated as u64);
        metrics::histogram!("index_sync_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::info!(
            records_updated = report.records_updated,
            nodes_created = report.nodes_created,
            cache_entries_updated = report.cache_entries_updated,
            "Index synchronized"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::storage::graph::InMemoryGraphStore;
    use std::fs;
    use tempfile::TempDir;

    const LOGIN_TS: &str = "\
import { AuthService } from './auth';

export class LoginHandler extends BaseHandler implements Handler, Disposable {
    async handle(req) {
        return this.auth.login(req);
    }
}

export function hashPassword(raw) {
    return raw;
}
";

    #[test]
    fn test_extract_declarations() {
        let decls = extract_declarations(LOGIN_TS);
        let names: Vec<_> = decls.iter().map(|d| (d.name.as_str(), d.node_type)).collect();
        assert_eq!(
            names,
            vec![
                ("LoginHandler", NodeType::Class),
                ("hashPassword", NodeType::Function),
            ]
        );
        assert_eq!(decls[0].extends, vec!["BaseHandler"]);
        assert_eq!(decls[0].implements, vec!["Handler", "Disposable"]);
        assert_eq!((decls[0].start_line, decls[0].end_line), (3, 8));
        assert_eq!((decls[1].start_line, decls[1].end_line), (9, 11));
    }

    #[test]
    fn test_extract_other_languages() {
        let rust = "pub struct Store;\npub trait Backend {}\npub(crate) fn open() {}\n";
        let go = "type Server struct {}\ntype Handler interface {}\nfunc (s *Server) Serve() {}\n";
        let python = "class Repo:\n    def save(self):\n        pass\n";
        let kinds = |src: &str| {
            extract_declarations(src)
                .into_iter()
                .map(|d| (d.name, d.node_type))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            kinds(rust),
            vec![
                ("Store".to_string(), NodeType::Class),
                ("Backend".to_string(), NodeType::Interface),
                ("open".to_string(), NodeType::Function),
            ]
        );
        assert_eq!(kinds(go)[1], ("Handler".to_string(), NodeType::Interface));
        assert_eq!(kinds(go)[2], ("Serve".to_string(), NodeType::Function));
        assert_eq!(kinds(python)[1], ("save".to_string(), NodeType::Method));
    }

    fn project_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_sync_registers_and_indexes() {
        let dir = project_with(&[
            ("src/base.ts", "export class BaseHandler {}\n"),
            ("src/login.ts", LOGIN_TS),
        ]);
        let store = Arc::new(InMemoryGraphStore::new());
        let sync = GraphIndexSync::new(store.clone());

        let first = sync
            .update_index(dir.path(), &["src/base.ts".to_string()])
            .unwrap();
        assert_eq!(first.records_updated, 1);
        assert_eq!(first.nodes_created, 2);

        let report = sync
            .update_index(dir.path(), &["src/login.ts".to_string(), "./src/login.ts".to_string()])
            .unwrap();
        assert_eq!(report.records_updated, 1);
        assert_eq!(report.nodes_created, 3);

        let canonical = dir.path().canonicalize().unwrap();
        let project = store
            .resolve_project_id(&canonical.to_string_lossy())
            .unwrap()
            .unwrap();
        let class_id = NodeId::derive(&project, "src/login.ts", NodeType::Class, "LoginHandler");
        let outgoing = store.get_edges(&class_id, Direction::Outgoing).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].edge_type, EdgeType::Extends);

        let file_id = NodeId::derive(&project, "src/login.ts", NodeType::File, "src/login.ts");
        let contains = store.get_edges(&file_id, Direction::Outgoing).unwrap();
        assert_eq!(contains.len(), 2);
    }

    #[test]
    fn test_resync_drops_stale_declarations() {
        let dir = project_with(&[("a.py", "def one():\n    pass\n\ndef two():\n    pass\n")]);
        let store = Arc::new(InMemoryGraphStore::new());
        let sync = GraphIndexSync::new(store.clone());
        sync.update_index(dir.path(), &["a.py".to_string()]).unwrap();

        fs::write(dir.path().join("a.py"), "def one():\n    pass\n").unwrap();
        let report = sync.update_index(dir.path(), &["a.py".to_string()]).unwrap();
        assert_eq!(report.nodes_created, 0);

        let project = store.list_projects().unwrap().remove(0).id;
        let names: Vec<_> = store
            .find_nodes(&project, Some(NodeType::Function))
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["one"]);
    }

    fn function_names(store: &InMemoryGraphStore) -> Vec<String> {
        let project = store.list_projects().unwrap().remove(0).id;
        let mut names: Vec<_> = store
            .find_nodes(&project, Some(NodeType::Function))
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_invalid_utf8_keeps_declarations() {
        let dir = project_with(&[("a.py", "def one():\n    pass\n")]);
        let store = Arc::new(InMemoryGraphStore::new());
        let sync = GraphIndexSync::new(store.clone());
        sync.update_index(dir.path(), &["a.py".to_string()]).unwrap();

        let mut bytes = b"def one():\n    pass\n\ndef two():\n    pass\n# caf".to_vec();
        bytes.push(0xE9);
        fs::write(dir.path().join("a.py"), bytes).unwrap();
        let report = sync.update_index(dir.path(), &["a.py".to_string()]).unwrap();
        assert_eq!(report.nodes_created, 1);
        assert_eq!(function_names(&store), vec!["one", "two"]);
    }

    #[test]
    fn test_oversized_file_keeps_declarations() {
        let dir = project_with(&[("big.py", "def one():\n    pass\n")]);
        let store = Arc::new(InMemoryGraphStore::new());
        let sync = GraphIndexSync::new(store.clone());
        sync.update_index(dir.path(), &["big.py".to_string()]).unwrap();

        let filler = "x = 1\n".repeat(200_000);
        fs::write(dir.path().join("big.py"), filler).unwrap();
        let report = sync.update_index(dir.path(), &["big.py".to_string()]).unwrap();
        assert_eq!(report.records_updated, 1);
        assert_eq!(report.nodes_created, 0);
        assert_eq!(function_names(&store), vec!["one"]);
    }

    #[test]
    fn test_heritage_resolves_within_one_sync() {
        let dir = project_with(&[
            ("src/base.ts", "export class BaseHandler {}\n"),
            ("src/login.ts", LOGIN_TS),
        ]);
        let store = Arc::new(InMemoryGraphStore::new());
        let sync = GraphIndexSync::new(store.clone());
        sync.update_index(
            dir.path(),
            &["src/base.ts".to_string(), "src/login.ts".to_string()],
        )
        .unwrap();

        let project = store.list_projects().unwrap().remove(0).id;
        let class_id = NodeId::derive(&project, "src/login.ts", NodeType::Class, "LoginHandler");
        let outgoing = store.get_edges(&class_id, Direction::Outgoing).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].edge_type, EdgeType::Extends);
    }

    #[test]
    fn test_deleted_file_is_removed() {
        let dir = project_with(&[("gone.rs", "fn main() {}\n")]);
        let store = Arc::new(InMemoryGraphStore::new());
        let sync = GraphIndexSync::new(store.clone());
        sync.update_index(dir.path(), &["gone.rs".to_string()]).unwrap();
        fs::remove_file(dir.path().join("gone.rs")).unwrap();

        let report = sync.update_index(dir.path(), &["gone.rs".to_string()]).unwrap();
        assert_eq!(report.records_updated, 1);
        let project = store.list_projects().unwrap().remove(0).id;
        assert!(store.find_nodes(&project, None).unwrap().is_empty());
    }

    #[test]
    fn test_cache_invalidation_counted() {
        let dir = project_with(&[("a.rs", "fn a() {}\n")]);
        let cache = Arc::new(RetrievalCache::default());
        cache.discovery.insert(dir.path(), Vec::new());
        let sync = GraphIndexSync::new(Arc::new(InMemoryGraphStore::new())).with_cache(cache.clone());
        let report = sync.update_index(dir.path(), &["a.rs".to_string()]).unwrap();
        assert!(report.cache_entries_updated >= 1);
        assert!(cache.discovery.get(dir.path()).is_none());
    }

    #[test]
    fn test_missing_root_is_invalid() {
        let sync = GraphIndexSync::new(Arc::new(InMemoryGraphStore::new()));
        let err = sync
            .update_index(Path::new("/definitely/not/here"), &[])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
