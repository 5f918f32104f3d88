//! Text index trait.
//!
//! A text index ranks a project's files against free text. When one is
//! configured, the file retriever uses its hits instead of the heuristic
//! relevance scorer, and falls back to the scorer on error or empty results.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Features |
//! |---------|----------|----------|
//! | `SqliteTextIndex` | Default; embedded | FTS5 with BM25 ranking |

use crate::Result;
use crate::models::ProjectId;

/// A ranked document returned by a text index.
#[derive(Debug, Clone, PartialEq)]
pub struct TextHit {
    /// File path relative to the project root.
    pub path: String,
    /// Normalized score in `[0, 1]`.
    pub score: f32,
    /// Matching snippet, if the backend provides one.
    pub snippet: Option<String>,
}

/// Trait for text index backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn TextIndex>`
/// - Scores must be normalized to `[0, 1]`, higher is better
/// - Results are ordered by descending score
pub trait TextIndex: Send + Sync {
    /// Searches a project's documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    fn search_by_text(&self, query: &str, project: &ProjectId, limit: usize)
    -> Result<Vec<TextHit>>;

    /// Indexes or replaces a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn index_document(&self, project: &ProjectId, path: &str, content: &str) -> Result<()>;

    /// Removes a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn remove_document(&self, project: &ProjectId, path: &str) -> Result<bool>;
}
