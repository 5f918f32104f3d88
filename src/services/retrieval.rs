//! File retrieval.
//!
//! Discovers candidate files under a project root, scores them against a
//! query and returns the best matches with previews.
//!
//! # Pipeline
//!
//! 1. Discovery: a `walkdir` walk, cached per root in [`DiscoveryCache`]
//! 2. Scoring: the optional [`TextIndex`] first, else [`RelevanceScorer`]
//! 3. Threshold: scores strictly above `relevance_threshold` survive
//! 4. Previews: first lines of each survivor, cached in [`PreviewCache`]
//!
//! Scoring and preview reads run on a dedicated rayon pool.
//!
//! # Failure Semantics
//!
//! Nothing here fails the caller. Unreadable directories and files are
//! logged and skipped, and a failing text index falls back to the heuristic
//! scorer.
//!
//! [`DiscoveryCache`]: crate::services::retrieval_cache::DiscoveryCache
//! [`PreviewCache`]: crate::services::retrieval_cache::PreviewCache

use crate::config::RetrievalConfig;
use crate::models::{FileKind, ProjectId, RetrievedFile, normalize_path};
use crate::services::relevance::RelevanceScorer;
use crate::services::retrieval_cache::{DiscoveredFile, Preview, RetrievalCache};
use crate::storage::TextIndex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;
use walkdir::{DirEntry, WalkDir};

/// Directories never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    ".next",
    "__pycache__",
    ".venv",
    "venv",
    "vendor",
    "coverage",
    ".idea",
    ".vscode",
    ".cache",
    ".taskscope",
];

/// Extensions of files considered for retrieval.
pub const INCLUDED_EXTENSIONS: &[&str] = &[
    // source
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "kts", "scala", "rb",
    "php", "cs", "swift", "c", "h", "cc", "cpp", "hpp", "m", "vue", "svelte", "sh", "sql",
    "graphql", "proto", "css", "scss", "html",
    // config
    "json", "toml", "yaml", "yml", "ini", "cfg", "conf", "env",
    // docs
    "md", "mdx", "rst", "txt", "adoc",
];

/// Ranks project files against a query.
pub struct FileRetriever {
    config: RetrievalConfig,
    cache: Arc<RetrievalCache>,
    pool: Option<rayon::ThreadPool>,
    text_index: Option<Arc<dyn TextIndex>>,
}

impl FileRetriever {
    /// Creates a retriever with its own caches.
    #[must_use]
    pub fn new(config: RetrievalConfig) -> Self {
        let cache = Arc::new(RetrievalCache::new(
            config.discovery_ttl,
            config.preview_cache_capacity,
        ));
        Self::with_cache(config, cache)
    }

    /// Creates a retriever sharing the given caches.
    #[must_use]
    pub fn with_cache(config: RetrievalConfig, cache: Arc<RetrievalCache>) -> Self {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("taskscope-retrieval-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build retrieval pool, scoring sequentially");
                None
            },
        };
        Self {
            config,
            cache,
            pool,
            text_index: None,
        }
    }

    /// Attaches a text index consulted before the heuristic scorer.
    #[must_use]
    pub fn with_text_index(mut self, index: Arc<dyn TextIndex>) -> Self {
        self.text_index = Some(index);
        self
    }

    /// Returns the shared caches.
    #[must_use]
    pub fn cache(&self) -> &Arc<RetrievalCache> {
        &self.cache
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Returns the best files for a query using the heuristic scorer.
    #[must_use]
    pub fn search(&self, query: &str, root: &Path) -> Vec<RetrievedFile> {
        self.search_in_project(query, root, None)
    }

    /// Returns the best files for a query.
    ///
    /// When a project ID and a text index are both available, index hits
    /// replace the heuristic scores. Results are sorted by descending
    /// similarity, every similarity is strictly above the threshold, and at
    /// most `max_results` are returned.
    #[instrument(skip(self, query), fields(operation = "retrieve", root = %root.display()))]
    pub fn search_in_project(
        &self,
        query: &str,
        root: &Path,
        project: Option<&ProjectId>,
    ) -> Vec<RetrievedFile> {
        let start = Instant::now();
        let files = self.discover(root);

        let mut source = "heuristic";
        let mut scored = match (project, &self.text_index) {
            (Some(project), Some(index)) => {
                let hits = self.score_with_index(index.as_ref(), query, project, &files);
                if hits.is_empty() {
                    Vec::new()
                } else {
                    source = "text_index";
                    hits
                }
            },
            _ => Vec::new(),
        };
        if scored.is_empty() {
            scored = self.score_heuristic(query, &files);
        }

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.relative.cmp(&b.0.relative))
        });
        scored.truncate(self.config.max_results);

        let results = self.with_previews(scored);

        metrics::counter!("retrieval_searches_total", "source" => source).increment(1);
        metrics::histogram!("retrieval_duration_ms", "source" => source)
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            candidates = files.len(),
            results = results.len(),
            source,
            "Retrieval complete"
        );
        results
    }

    /// Returns the candidate files under a root, using the discovery cache.
    #[must_use]
    pub fn discover(&self, root: &Path) -> Arc<Vec<DiscoveredFile>> {
        if let Some(files) = self.cache.discovery.get(root) {
            return files;
        }
        let files = walk(root);
        tracing::debug!(root = %root.display(), files = files.len(), "Discovered files");
        self.cache.discovery.insert(root, files)
    }

    fn score_heuristic<'a>(
        &self,
        query: &str,
        files: &'a [DiscoveredFile],
    ) -> Vec<(&'a DiscoveredFile, f32)> {
        let scorer = RelevanceScorer::new(query);
        let threshold = self.config.relevance_threshold;
        let score = |file: &'a DiscoveredFile| {
            let s = scorer.score(&file.relative);
            (s > threshold).then_some((file, s))
        };
        match &self.pool {
            Some(pool) => pool.install(|| files.par_iter().filter_map(score).collect()),
            None => files.iter().filter_map(score).collect(),
        }
    }

    fn score_with_index<'a>(
        &self,
        index: &dyn TextIndex,
        query: &str,
        project: &ProjectId,
        files: &'a [DiscoveredFile],
    ) -> Vec<(&'a DiscoveredFile, f32)> {
        let hits = match index.search_by_text(query, project, self.config.max_results * 2) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "Text index search failed, using heuristic scorer");
                metrics::counter!("retrieval_index_fallback_total", "reason" => "error")
                    .increment(1);
                return Vec::new();
            },
        };

        let by_path: HashMap<String, &DiscoveredFile> = files
            .iter()
            .map(|f| (normalize_path(&f.relative), f))
            .collect();
        let threshold = self.config.relevance_threshold;
        let scored: Vec<_> = hits
            .into_iter()
            .filter(|hit| hit.score > threshold)
            .filter_map(|hit| {
                by_path
                    .get(&normalize_path(&hit.path))
                    .map(|f| (*f, hit.score.clamp(0.0, 1.0)))
            })
            .collect();
        if scored.is_empty() {
            metrics::counter!("retrieval_index_fallback_total", "reason" => "empty").increment(1);
        }
        scored
    }

    fn with_previews(&self, scored: Vec<(&DiscoveredFile, f32)>) -> Vec<RetrievedFile> {
        let build = |(file, score): (&DiscoveredFile, f32)| {
            let mut result =
                RetrievedFile::new(&file.relative, FileKind::infer(&file.relative), score);
            if let Some(preview) = self.preview(file) {
                if preview.line_count > 0 {
                    result = result.with_line_range(1, preview.line_count);
                }
                result = result.with_preview(preview.text.clone());
            }
            result
        };
        // Both branches keep input order, so the descending sort survives.
        match &self.pool {
            Some(pool) => pool.install(|| scored.into_par_iter().map(build).collect()),
            None => scored.into_iter().map(build).collect(),
        }
    }

    fn preview(&self, file: &DiscoveredFile) -> Option<Arc<Preview>> {
        if let Some(hit) = self.cache.previews.get(&file.absolute) {
            return Some(hit);
        }
        // Oversized files stay candidates but never get a preview.
        if file.size > self.config.max_file_bytes {
            return None;
        }
        match read_preview(&file.absolute, self.config.preview_lines) {
            Ok(preview) => Some(self.cache.previews.insert(&file.absolute, preview)),
            Err(e) => {
                tracing::warn!(path = %file.absolute.display(), error = %e, "Failed to read preview");
                None
            },
        }
    }
}

impl Default for FileRetriever {
    fn default() -> Self {
        Self::new(RetrievalConfig::default())
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

fn is_included(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with(".env") {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| INCLUDED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn walk(root: &Path) -> Vec<DiscoveredFile> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry during discovery");
                continue;
            },
        };
        if !entry.file_type().is_file() || !is_included(entry.path()) {
            continue;
        }
        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Skipping file without metadata"
                );
                continue;
            },
        };
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        files.push(DiscoveredFile {
            absolute: entry.path().to_path_buf(),
            relative: normalize_path(&relative.to_string_lossy()),
            size,
        });
    }
    files
}

fn read_preview(path: &Path, max_lines: usize) -> std::io::Result<Preview> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines().take(max_lines) {
        match line {
            Ok(line) => lines.push(line),
            // Binary or non-UTF-8 content ends the preview.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => break,
            Err(e) => return Err(e),
        }
    }
    Ok(Preview {
        line_count: u32::try_from(lines.len()).unwrap_or(u32::MAX),
        text: lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TextHit;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    struct FixedIndex(crate::Result<Vec<TextHit>>);

    impl TextIndex for FixedIndex {
        fn search_by_text(&self, _: &str, _: &ProjectId, _: usize) -> crate::Result<Vec<TextHit>> {
            match &self.0 {
                Ok(hits) => Ok(hits.clone()),
                Err(_) => Err(crate::Error::OperationFailed {
                    operation: "search".to_string(),
                    cause: "down".to_string(),
                }),
            }
        }
        fn index_document(&self, _: &ProjectId, _: &str, _: &str) -> crate::Result<()> {
            Ok(())
        }
        fn remove_document(&self, _: &ProjectId, _: &str) -> crate::Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_login_handler_is_found() {
        let dir = project(&[
            ("src/auth/login-handler.ts", "export function login() {}\n"),
            ("src/utils/date.ts", "export const now = () => 0;\n"),
        ]);
        let retriever = FileRetriever::default();
        let results = retriever.search("fix login bug", dir.path());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "src/auth/login-handler.ts");
        assert!((results[0].similarity - 0.9).abs() < 1e-6);
        assert_eq!(results[0].line_range, Some((1, 1)));
        assert!(results[0].preview.contains("login"));
    }

    #[test]
    fn test_excluded_dirs_and_extensions() {
        let dir = project(&[
            ("node_modules/auth/login.js", "x"),
            ("target/login.rs", "x"),
            ("src/login.png", "x"),
            ("src/login.rs", "x"),
        ]);
        let retriever = FileRetriever::default();
        let files = retriever.discover(dir.path());
        let paths: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(paths, vec!["src/login.rs"]);
    }

    #[test]
    fn test_results_capped_sorted_and_above_threshold() {
        let files: Vec<(String, &str)> = (0..25)
            .map(|i| (format!("src/auth/login_{i:02}.ts"), "x"))
            .chain([("src/auth/session.ts".to_string(), "x")])
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), *c)).collect();
        let dir = project(&refs);

        let retriever = FileRetriever::default();
        let results = retriever.search("fix login bug", dir.path());
        assert_eq!(results.len(), 10);
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!(results.iter().all(|r| r.similarity > 0.3));
    }

    #[test]
    fn test_discovery_is_cached() {
        let dir = project(&[("src/login.rs", "x")]);
        let retriever = FileRetriever::default();
        assert_eq!(retriever.discover(dir.path()).len(), 1);
        fs::write(dir.path().join("src/logout.rs"), "x").unwrap();
        assert_eq!(retriever.discover(dir.path()).len(), 1);
        retriever.cache().discovery.invalidate(dir.path());
        assert_eq!(retriever.discover(dir.path()).len(), 2);
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let retriever = FileRetriever::default();
        assert!(retriever.search("fix login", Path::new("/definitely/not/here")).is_empty());
    }

    #[test]
    fn test_text_index_hits_replace_heuristic() {
        let dir = project(&[("src/auth/login.ts", "x"), ("src/billing.ts", "x")]);
        let index = FixedIndex(Ok(vec![TextHit {
            path: "src/billing.ts".to_string(),
            score: 0.8,
            snippet: None,
        }]));
        let retriever = FileRetriever::default().with_text_index(Arc::new(index));
        let results =
            retriever.search_in_project("fix login", dir.path(), Some(&ProjectId::new("p")));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "src/billing.ts");
    }

    #[test]
    fn test_text_index_error_falls_back() {
        let dir = project(&[("src/auth/login.ts", "x")]);
        let index = FixedIndex(Err(crate::Error::FeatureNotEnabled("x".to_string())));
        let retriever = FileRetriever::default().with_text_index(Arc::new(index));
        let results =
            retriever.search_in_project("fix login", dir.path(), Some(&ProjectId::new("p")));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "src/auth/login.ts");
    }

    #[test]
    fn test_preview_is_bounded() {
        let long: String = (0..200).map(|i| format!("line {i}\n")).collect();
        let dir = project(&[("src/auth/login.ts", &long)]);
        let retriever = FileRetriever::default();
        let results = retriever.search("fix login", dir.path());
        assert_eq!(results[0].line_range, Some((1, 50)));
        assert_eq!(results[0].preview.lines().count(), 50);
    }
}
