//! Retrieved file types.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inferred role of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Production source code.
    Source,
    /// Test code.
    Test,
    /// Configuration.
    Config,
    /// Prose documentation.
    Documentation,
}

const CONFIG_EXTENSIONS: &[&str] = &["json", "toml", "yaml", "yml", "ini", "cfg", "conf", "env"];
const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "rst", "txt", "adoc"];

impl FileKind {
    /// Returns all file kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Source, Self::Test, Self::Config, Self::Documentation]
    }

    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Test => "test",
            Self::Config => "config",
            Self::Documentation => "documentation",
        }
    }

    /// Infers the kind from a path.
    #[must_use]
    pub fn infer(path: &str) -> Self {
        let normalized = path.replace('\\', "/").to_lowercase();
        let file_name = normalized.rsplit('/').next().unwrap_or(&normalized);
        let in_test_dir = normalized
            .split('/')
            .any(|seg| matches!(seg, "test" | "tests" | "__tests__" | "spec"));

        if in_test_dir
            || file_name.contains(".test.")
            || file_name.contains(".spec.")
            || file_name.contains("_test.")
            || file_name.starts_with("test_")
        {
            return Self::Test;
        }

        if file_name.starts_with(".env") || file_name.contains(".config.") {
            return Self::Config;
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        if CONFIG_EXTENSIONS.contains(&extension) {
            Self::Config
        } else if DOC_EXTENSIONS.contains(&extension) {
            Self::Documentation
        } else {
            Self::Source
        }
    }
}

/// A candidate file with a relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedFile {
    /// Path relative to the project root.
    pub path: String,
    /// Inferred role.
    pub kind: FileKind,
    /// Relevance in `[0, 1]`; comparable only within one retrieval call.
    pub similarity: f32,
    /// First lines of the file.
    pub preview: String,
    /// Line range of the relevant region, when known.
    pub line_range: Option<(u32, u32)>,
}

impl RetrievedFile {
    /// Creates a retrieved file with an empty preview.
    ///
    /// The similarity is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: FileKind, similarity: f32) -> Self {
        Self {
            path: path.into(),
            kind,
            similarity: similarity.clamp(0.0, 1.0),
            preview: String::new(),
            line_range: None,
        }
    }

    /// Sets the preview text.
    #[must_use]
    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = preview.into();
        self
    }

    /// Sets the line range.
    #[must_use]
    pub const fn with_line_range(mut self, start: u32, end: u32) -> Self {
        self.line_range = Some((start, end));
        self
    }

    /// Returns `path:start-end` when a range is known, else the path.
    #[must_use]
    pub fn location(&self) -> String {
        match self.line_range {
            Some((start, end)) => format!("{}:{start}-{end}", self.path),
            None => self.path.clone(),
        }
    }

    /// Returns the file name component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}
