//! Relationship analysis ("Seed + Expand").
//!
//! Maps retrieved files onto the code graph and returns the subgraph around
//! them:
//!
//! 1. Resolve the project for the root path
//! 2. Seeds: file nodes matching a retrieved path, plus what they contain
//! 3. Direct relationships: edges between two seeds (strength 0.9)
//! 4. One-hop expansion over `calls`/`imports`/`extends`/`implements`/`uses`
//!    edges, bounded per seed (strength 0.7)
//! 5. Architectural insights over the result
//!
//! Any store error, an unknown project or an empty seed set yields the
//! basic analysis built from file names alone. [`RelationshipAnalyzer::analyze`]
//! never fails.

// Allow cast precision loss for ratio calculations.
#![allow(clippy::cast_precision_loss)]

use crate::config::AnalysisConfig;
use crate::models::{
    ArchitecturalInsights, ClassInfo, Direction, EXPANDED_CONFIDENCE, EdgeType, GraphContext,
    GraphEdge, GraphNode, NodeId, NodeType, ProjectId, Relationship, RetrievedFile,
    SEED_CONFIDENCE, normalize_path,
};
use crate::storage::CodeGraphStore;
use crate::Result;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Pattern tag used when the graph could not be consulted.
pub const BASIC_ANALYSIS_PATTERN: &str = "basic-analysis";

/// Confidence of entities inferred from file names.
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

const HOTSPOT_COUNT: usize = 3;

/// Pattern tags by edge type, in report order.
const EDGE_PATTERNS: &[(EdgeType, &str)] = &[
    (EdgeType::Implements, "interface-based"),
    (EdgeType::Extends, "inheritance"),
    (EdgeType::Calls, "service-calls"),
    (EdgeType::Imports, "modular"),
    (EdgeType::Uses, "composition"),
];

/// Builds a [`GraphContext`] for retrieved files.
///
/// Depends only on the [`CodeGraphStore`] trait; the backend is irrelevant.
pub struct RelationshipAnalyzer {
    store: Arc<dyn CodeGraphStore>,
    config: AnalysisConfig,
}

/// Seed and expanded nodes collected for one analysis.
#[derive(Default)]
struct Subgraph {
    nodes: Vec<(GraphNode, bool)>,
    ids: HashSet<NodeId>,
    relationships: Vec<Relationship>,
}

impl Subgraph {
    fn admit(&mut self, node: GraphNode, is_seed: bool) -> bool {
        if self.ids.insert(node.id.clone()) {
            self.nodes.push((node, is_seed));
            true
        } else {
            false
        }
    }

    fn name_of(&self, id: &NodeId) -> Option<&str> {
        self.nodes
            .iter()
            .find(|(n, _)| &n.id == id)
            .map(|(n, _)| n.name.as_str())
    }
}

impl RelationshipAnalyzer {
    /// Creates an analyzer over a store with default limits.
    #[must_use]
    pub fn new(store: Arc<dyn CodeGraphStore>) -> Self {
        Self {
            store,
            config: AnalysisConfig::default(),
        }
    }

    /// Sets the seed and expansion limits.
    #[must_use]
    pub const fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the project registered for a root, trying the path as given
    /// and then canonicalized.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    pub fn resolve_project(&self, root: &Path) -> Result<Option<ProjectId>> {
        if let Some(id) = self.store.resolve_project_id(&root.to_string_lossy())? {
            return Ok(Some(id));
        }
        match root.canonicalize() {
            Ok(canonical) if canonical != root => {
                self.store.resolve_project_id(&canonical.to_string_lossy())
            },
            _ => Ok(None),
        }
    }

    /// Analyzes the relationships around the retrieved files.
    ///
    /// Never fails: store errors degrade to [`basic_analysis`].
    #[instrument(
        skip(self, _query, files),
        fields(operation = "analyze", backend = self.store.backend_name(), files = files.len())
    )]
    pub fn analyze(&self, _query: &str, root: &Path, files: &[RetrievedFile]) -> GraphContext {
        let start = Instant::now();
        let (context, outcome) = match self.try_analyze(root, files) {
            Ok(Some(context)) => (context, "graph"),
            Ok(None) => (basic_analysis(files), "fallback"),
            Err(e) => {
                tracing::warn!(error = %e, "Graph analysis failed, using basic analysis");
                (basic_analysis(files), "error")
            },
        };

        metrics::counter!("graph_analysis_total", "outcome" => outcome).increment(1);
        metrics::histogram!("graph_analysis_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            outcome,
            classes = context.classes.len(),
            relationships = context.relationships.len(),
            "Graph analysis complete"
        );
        context
    }

    /// Runs Seed + Expand. `Ok(None)` means the graph had nothing to offer.
    fn try_analyze(&self, root: &Path, files: &[RetrievedFile]) -> Result<Option<GraphContext>> {
        let Some(project) = self.resolve_project(root)? else {
            tracing::debug!(root = %root.display(), "Project not indexed");
            return Ok(None);
        };

        let mut graph = self.collect_seeds(&project, files)?;
        if graph.nodes.is_empty() {
            tracing::debug!("No graph nodes matched the retrieved files");
            return Ok(None);
        }

        self.direct_relationships(&mut graph)?;
        self.expand(&mut graph)?;
        Ok(Some(build_context(graph)))
    }

    /// Outgoing edges by edge type, then target ID, so every backend
    /// caps and orders the same neighbours.
    fn outgoing(&self, id: &NodeId) -> Result<Vec<GraphEdge>> {
        let mut edges = self.store.get_edges(id, Direction::Outgoing)?;
        edges.sort_by(|a, b| (a.edge_type, &a.target).cmp(&(b.edge_type, &b.target)));
        Ok(edges)
    }

    fn collect_seeds(&self, project: &ProjectId, files: &[RetrievedFile]) -> Result<Subgraph> {
        let max_seeds = self.config.max_seeds;
        let mut graph = Subgraph::default();

        'files: for file in files {
            for node in self.store.find_nodes_by_path_suffix(project, &file.path)? {
                if graph.nodes.len() >= max_seeds {
                    break 'files;
                }
                let id = node.id.clone();
                graph.admit(node, true);

                for edge in self.outgoing(&id)? {
                    if edge.edge_type != EdgeType::Contains || graph.ids.contains(&edge.target) {
                        continue;
                    }
                    if graph.nodes.len() >= max_seeds {
                        break 'files;
                    }
                    if let Some(child) = self.store.get_node(&edge.target)? {
                        graph.admit(child, true);
                    }
                }
            }
        }
        Ok(graph)
    }

    fn direct_relationships(&self, graph: &mut Subgraph) -> Result<()> {
        let seed_ids: Vec<NodeId> = graph.nodes.iter().map(|(n, _)| n.id.clone()).collect();
        for id in &seed_ids {
            for edge in self.outgoing(id)? {
                if graph.ids.contains(&edge.target) {
                    push_relationship(graph, &edge, SEED_CONFIDENCE);
                }
            }
        }
        Ok(())
    }

    fn expand(&self, graph: &mut Subgraph) -> Result<()> {
        let per_seed = self.config.max_expansion_per_seed;
        let seed_ids: Vec<NodeId> = graph.nodes.iter().map(|(n, _)| n.id.clone()).collect();

        for id in &seed_ids {
            let mut admitted = 0;
            for edge in self.outgoing(id)? {
                if admitted >= per_seed {
                    break;
                }
                if !EdgeType::expandable().contains(&edge.edge_type)
                    || graph.ids.contains(&edge.target)
                {
                    continue;
                }
                let Some(neighbor) = self.store.get_node(&edge.target)? else {
                    continue;
                };
                graph.admit(neighbor, false);
                push_relationship(graph, &edge, EXPANDED_CONFIDENCE);
                admitted += 1;
            }
        }
        Ok(())
    }
}

fn push_relationship(graph: &mut Subgraph, edge: &GraphEdge, strength: f32) {
    let (Some(from), Some(to)) = (graph.name_of(&edge.source), graph.name_of(&edge.target)) else {
        return;
    };
    let relationship = Relationship {
        from: from.to_string(),
        to: to.to_string(),
        relationship_type: edge.edge_type,
        caller_method: edge.caller_method.clone(),
        callee_method: edge.callee_method.clone(),
        strength,
    };
    graph.relationships.push(relationship);
}

fn package_of(file_path: &str) -> String {
    let normalized = normalize_path(file_path);
    match normalized.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        _ => ".".to_string(),
    }
}

fn build_context(graph: Subgraph) -> GraphContext {
    let classes: Vec<ClassInfo> = graph
        .nodes
        .into_iter()
        .map(|(node, is_seed)| ClassInfo {
            package: package_of(&node.file_path),
            line_range: node.line_range(),
            name: node.name,
            file_path: node.file_path,
            node_type: node.node_type,
            confidence: if is_seed {
                SEED_CONFIDENCE
            } else {
                EXPANDED_CONFIDENCE
            },
            is_seed,
        })
        .collect();
    let packages = distinct_packages(&classes);
    let insights = compute_insights(classes.len(), &graph.relationships);

    GraphContext {
        classes,
        relationships: graph.relationships,
        packages,
        insights,
        used_fallback: false,
    }
}

fn distinct_packages(classes: &[ClassInfo]) -> Vec<String> {
    classes
        .iter()
        .map(|c| c.package.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Computes coupling, complexity, pattern tags and hotspots.
#[must_use]
pub fn compute_insights(
    node_count: usize,
    relationships: &[Relationship],
) -> ArchitecturalInsights {
    let edges = relationships.len() as f32;
    let coupling = if node_count == 0 {
        0.0
    } else {
        (edges / node_count as f32 / 5.0).min(1.0)
    };
    let complexity = (edges / 10.0).min(1.0);

    let present: HashSet<EdgeType> = relationships.iter().map(|r| r.relationship_type).collect();
    let patterns = EDGE_PATTERNS
        .iter()
        .filter(|(t, _)| present.contains(t))
        .map(|(_, tag)| (*tag).to_string())
        .collect();

    let mut degree: HashMap<&str, usize> = HashMap::new();
    for r in relationships {
        *degree.entry(r.from.as_str()).or_insert(0) += 1;
        *degree.entry(r.to.as_str()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = degree.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let hotspots = ranked
        .into_iter()
        .take(HOTSPOT_COUNT)
        .map(|(name, _)| name.to_string())
        .collect();

    ArchitecturalInsights {
        coupling,
        complexity,
        patterns,
        hotspots,
    }
}

/// Infers a class name from a file stem: `login-handler.ts` => `LoginHandler`.
#[must_use]
pub fn infer_class_name(path: &str) -> String {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    stem.split(['-', '_', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect()
}

/// Builds a context from file names alone.
///
/// Class names come from file-stem casing and packages from the parent
/// directory. Relationships are empty and the only pattern is
/// [`BASIC_ANALYSIS_PATTERN`].
#[must_use]
pub fn basic_analysis(files: &[RetrievedFile]) -> GraphContext {
    let classes: Vec<ClassInfo> = files
        .iter()
        .filter_map(|f| {
            let name = infer_class_name(&f.path);
            (!name.is_empty()).then(|| ClassInfo {
                name,
                file_path: f.path.clone(),
                package: package_of(&f.path),
                node_type: NodeType::Class,
                line_range: f.line_range,
                confidence: FALLBACK_CONFIDENCE,
                is_seed: false,
            })
        })
        .collect();
    let packages = distinct_packages(&classes);

    GraphContext {
        classes,
        relationships: Vec::new(),
        packages,
        insights: ArchitecturalInsights {
            patterns: vec![BASIC_ANALYSIS_PATTERN.to_string()],
            ..ArchitecturalInsights::default()
        },
        used_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::{FileKind, ProjectRecord};
    use crate::storage::GraphStats;
    use crate::storage::graph::InMemoryGraphStore;
    use test_case::test_case;

    fn retrieved(path: &str) -> RetrievedFile {
        RetrievedFile::new(path, FileKind::Source, 0.8)
    }

    fn node(project: &ProjectId, id: &str, name: &str, node_type: NodeType, path: &str) -> GraphNode {
        GraphNode::new(NodeId::new(id), name, node_type, path, project.clone())
    }

    /// Two seed files A and B, `A calls B`, and one extra neighbor each.
    fn example_store() -> (Arc<InMemoryGraphStore>, ProjectId) {
        let store = Arc::new(InMemoryGraphStore::new());
        let project = store.register_project("/work/app", "app").unwrap();
        store
            .upsert_nodes(&[
                node(&project, "a", "a.ts", NodeType::File, "src/a.ts"),
                node(&project, "b", "b.ts", NodeType::File, "src/b.ts"),
                node(&project, "c", "c.ts", NodeType::File, "src/lib/c.ts"),
                node(&project, "d", "d.ts", NodeType::File, "src/lib/d.ts"),
            ])
            .unwrap();
        store
            .upsert_edges(&[
                GraphEdge::new(NodeId::new("a"), NodeId::new("b"), EdgeType::Calls),
                GraphEdge::new(NodeId::new("a"), NodeId::new("c"), EdgeType::Imports),
                GraphEdge::new(NodeId::new("b"), NodeId::new("d"), EdgeType::Uses),
            ])
            .unwrap();
        (store, project)
    }

    #[test]
    fn test_seed_and_expand() {
        let (store, _) = example_store();
        let analyzer = RelationshipAnalyzer::new(store);
        let context = analyzer.analyze(
            "q",
            Path::new("/work/app"),
            &[retrieved("src/a.ts"), retrieved("src/b.ts")],
        );

        assert!(!context.used_fallback);
        let direct: Vec<_> = context.relationships.iter().filter(|r| r.strength == SEED_CONFIDENCE).collect();
        let expanded: Vec<_> = context.relationships.iter().filter(|r| r.strength == EXPANDED_CONFIDENCE).collect();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].relationship_type, EdgeType::Calls);
        assert_eq!(expanded.len(), 2);

        let seeds = context.classes.iter().filter(|c| c.is_seed).count();
        assert_eq!(seeds, 2);
        assert!(context
            .classes
            .iter()
            .all(|c| c.is_seed || c.confidence < SEED_CONFIDENCE));
        assert_eq!(
            context.insights.patterns,
            vec!["service-calls", "modular", "composition"]
        );
        assert_eq!(context.packages, vec!["src", "src/lib"]);
    }

    #[test]
    fn test_contained_declarations_are_seeds() {
        let store = Arc::new(InMemoryGraphStore::new());
        let project = store.register_project("/work/app", "app").unwrap();
        store
            .upsert_nodes(&[
                node(&project, "f", "auth.ts", NodeType::File, "src/auth.ts"),
                node(&project, "k", "AuthService", NodeType::Class, "src/auth.ts"),
            ])
            .unwrap();
        store
            .upsert_edges(&[GraphEdge::new(NodeId::new("f"), NodeId::new("k"), EdgeType::Contains)])
            .unwrap();

        let context = RelationshipAnalyzer::new(store).analyze(
            "q",
            Path::new("/work/app"),
            &[retrieved("src\\auth.ts")],
        );
        let names: Vec<&str> = context.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["auth.ts", "AuthService"]);
        assert!(context.classes.iter().all(|c| c.is_seed));
    }

    #[test]
    fn test_expansion_cap_per_seed() {
        let store = Arc::new(InMemoryGraphStore::new());
        let project = store.register_project("/work/app", "app").unwrap();
        let mut nodes = vec![node(&project, "s", "s.ts", NodeType::File, "src/s.ts")];
        let mut edges = Vec::new();
        for i in (0..6).rev() {
            let id = format!("n{i}");
            nodes.push(node(&project, &id, &id, NodeType::Class, "src/other.ts"));
            edges.push(GraphEdge::new(NodeId::new("s"), NodeId::new(id), EdgeType::Calls));
        }
        store.upsert_nodes(&nodes).unwrap();
        store.upsert_edges(&edges).unwrap();

        let context = RelationshipAnalyzer::new(store).analyze(
            "q",
            Path::new("/work/app"),
            &[retrieved("src/s.ts")],
        );
        assert_eq!(context.relationships.len(), 3);
        assert!(context.relationships.iter().all(|r| r.strength == EXPANDED_CONFIDENCE));
        let targets: Vec<&str> = context.relationships.iter().map(|r| r.to.as_str()).collect();
        assert_eq!(targets, vec!["n0", "n1", "n2"]);
    }

    #[test]
    fn test_unknown_project_falls_back() {
        let store = Arc::new(InMemoryGraphStore::new());
        let context = RelationshipAnalyzer::new(store).analyze(
            "q",
            Path::new("/nowhere"),
            &[retrieved("src/auth/login-handler.ts")],
        );
        assert!(context.used_fallback);
        assert_eq!(context.insights.patterns, vec![BASIC_ANALYSIS_PATTERN]);
        assert_eq!(context.classes[0].name, "LoginHandler");
        assert_eq!(context.classes[0].package, "src/auth");
    }

    struct BrokenStore;

    impl CodeGraphStore for BrokenStore {
        fn backend_name(&self) -> &'static str {
            "broken"
        }
        fn resolve_project_id(&self, _: &str) -> Result<Option<ProjectId>> {
            Err(Error::BackendUnavailable {
                backend: "broken".to_string(),
                cause: "connection refused".to_string(),
            })
        }
        fn register_project(&self, _: &str, _: &str) -> Result<ProjectId> {
            Err(Error::operation("register_project", "broken"))
        }
        fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
            Ok(Vec::new())
        }
        fn get_node(&self, _: &NodeId) -> Result<Option<GraphNode>> {
            Ok(None)
        }
        fn find_nodes(&self, _: &ProjectId, _: Option<NodeType>) -> Result<Vec<GraphNode>> {
            Ok(Vec::new())
        }
        fn get_edges(&self, _: &NodeId, _: Direction) -> Result<Vec<GraphEdge>> {
            Ok(Vec::new())
        }
        fn upsert_nodes(&self, _: &[GraphNode]) -> Result<usize> {
            Ok(0)
        }
        fn upsert_edges(&self, _: &[GraphEdge]) -> Result<usize> {
            Ok(0)
        }
        fn delete_nodes(&self, _: &[NodeId]) -> Result<usize> {
            Ok(0)
        }
        fn delete_by_project(&self, _: &ProjectId) -> Result<usize> {
            Ok(0)
        }
        fn stats(&self, _: &ProjectId) -> Result<GraphStats> {
            Ok(GraphStats::default())
        }
    }

    #[test]
    fn test_backend_error_falls_back() {
        let context = RelationshipAnalyzer::new(Arc::new(BrokenStore)).analyze(
            "q",
            Path::new("/work/app"),
            &[retrieved("src/user_service.py")],
        );
        assert!(context.used_fallback);
        assert_eq!(context.insights.patterns, vec!["basic-analysis"]);
        assert_eq!(context.classes[0].name, "UserService");
    }

    #[test_case("src/auth/login-handler.ts", "LoginHandler")]
    #[test_case("app/user_service.py", "UserService")]
    #[test_case("AuthService.java", "AuthService")]
    #[test_case("src\\db\\models.rs", "Models")]
    fn test_infer_class_name(path: &str, expected: &str) {
        assert_eq!(infer_class_name(path), expected);
    }

    #[test]
    fn test_insights() {
        let rel = |from: &str, to: &str, t: EdgeType| Relationship {
            from: from.to_string(),
            to: to.to_string(),
            relationship_type: t,
            caller_method: None,
            callee_method: None,
            strength: 0.9,
        };
        let relationships = vec![
            rel("A", "B", EdgeType::Implements),
            rel("A", "C", EdgeType::Calls),
            rel("D", "A", EdgeType::Calls),
        ];
        let insights = compute_insights(4, &relationships);
        assert!((insights.coupling - 0.15).abs() < 1e-6);
        assert!((insights.complexity - 0.3).abs() < 1e-6);
        assert_eq!(insights.patterns, vec!["interface-based", "service-calls"]);
        assert_eq!(insights.hotspots[0], "A");
        assert_eq!(insights.hotspots.len(), 3);
    }
}
