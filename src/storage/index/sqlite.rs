//! `SQLite` FTS5 text index over project files.

// Allow cast_possible_truncation for BM25 f64 to f32 conversion.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

use crate::models::{ProjectId, normalize_path};
use crate::storage::traits::{TextHit, TextIndex};
use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::instrument;

/// Documents longer than this are truncated before indexing.
const MAX_INDEXED_BYTES: usize = 256 * 1024;

fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Text index mutex was poisoned, recovering");
            poisoned.into_inner()
        },
    }
}

/// Builds an FTS5 query that ORs quoted terms.
///
/// FTS5 special characters (`-`, `*`, `"`, `:`) lose their meaning inside
/// quotes; embedded quotes are doubled.
fn build_fts_query(query: &str) -> String {
    let terms: Vec<_> = query.split_whitespace().collect();
    let estimated_len = terms.iter().map(|t| t.len() + 8).sum::<usize>();
    let mut fts_query = String::with_capacity(estimated_len);
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            fts_query.push_str(" OR ");
        }
        fts_query.push('"');
        for c in term.chars() {
            if c == '"' {
                fts_query.push_str("\"\"");
            } else {
                fts_query.push(c);
            }
        }
        fts_query.push('"');
    }
    fts_query
}

/// Rescales BM25 scores against the best hit of the same query.
///
/// FTS5 `bm25()` is negative, more negative meaning a better match. The
/// best hit scores 1.0 and the rest keep their ratio to it, so weak hits
/// fall under the relevance threshold.
fn normalize_bm25(scores: &[f64]) -> Vec<f32> {
    let best = scores.iter().map(|s| -s).fold(0.0_f64, f64::max);
    scores
        .iter()
        .map(|s| {
            if best <= f64::EPSILON {
                1.0
            } else {
                ((-s) / best).clamp(0.0, 1.0) as f32
            }
        })
        .collect()
}

/// Full-text index of file contents, scoped per project.
pub struct SqliteTextIndex {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteTextIndex {
    /// Opens or creates an index at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::operation("open_text_index", e))?;
        let index = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        index.initialize()?;
        Ok(index)
    }

    /// Creates an in-memory index (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::operation("open_text_index_memory", e))?;
        let index = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        index.initialize()?;
        Ok(index)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&std::path::Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS file_fts USING fts5(
                project_id UNINDEXED,
                path UNINDEXED,
                content,
                tokenize = 'unicode61 tokenchars ''_'''
            )",
            [],
        )
        .map_err(|e| Error::operation("create_file_fts_table", e))?;
        Ok(())
    }
}

impl TextIndex for SqliteTextIndex {
    #[instrument(
        skip(self, query),
        fields(backend = "sqlite_fts", query_length = query.len(), limit = limit)
    )]
    fn search_by_text(
        &self,
        query: &str,
        project: &ProjectId,
        limit: usize,
    ) -> Result<Vec<TextHit>> {
        let fts_query = build_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT path, bm25(file_fts) AS score, snippet(file_fts, 2, '', '', '…', 12)
                 FROM file_fts
                 WHERE file_fts MATCH ?1 AND project_id = ?2
                 ORDER BY score
                 LIMIT ?3",
            )
            .map_err(|e| Error::operation("prepare_text_search", e))?;
        let rows = stmt
            .query_map(
                params![fts_query, project.as_str(), limit as i64],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?, row.get::<_, String>(2)?)),
            )
            .map_err(|e| Error::operation("execute_text_search", e))?;
        let rows = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("read_text_search_row", e))?;

        let raw: Vec<f64> = rows.iter().map(|(_, score, _)| *score).collect();
        Ok(rows
            .into_iter()
            .zip(normalize_bm25(&raw))
            .map(|((path, _, snippet), score)| TextHit {
                path,
                score,
                snippet: Some(snippet),
            })
            .collect())
    }

    fn index_document(&self, project: &ProjectId, path: &str, content: &str) -> Result<()> {
        let path = normalize_path(path);
        let mut end = content.len().min(MAX_INDEXED_BYTES);
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::operation("begin_index_document", e))?;
        tx.execute(
            "DELETE FROM file_fts WHERE project_id = ?1 AND path = ?2",
            params![project.as_str(), path],
        )
        .map_err(|e| Error::operation("delete_stale_document", e))?;
        tx.execute(
            "INSERT INTO file_fts (project_id, path, content) VALUES (?1, ?2, ?3)",
            params![project.as_str(), path, &content[..end]],
        )
        .map_err(|e| Error::operation("insert_document", e))?;
        tx.commit()
            .map_err(|e| Error::operation("commit_index_document", e))
    }

    fn remove_document(&self, project: &ProjectId, path: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let removed = conn
            .execute(
                "DELETE FROM file_fts WHERE project_id = ?1 AND path = ?2",
                params![project.as_str(), normalize_path(path)],
            )
            .map_err(|e| Error::operation("remove_document", e))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;

    #[test]
    fn test_build_fts_query_quotes_terms() {
        assert_eq!(build_fts_query("login handler"), "\"login\" OR \"handler\"");
        assert_eq!(build_fts_query("say \"hi\""), "\"say\" OR \"\"\"hi\"\"\"");
        assert_eq!(build_fts_query("   "), "");
    }

    #[test]
    fn test_normalize_bm25_is_relative_to_best() {
        let scores = normalize_bm25(&[-8.0, -4.0, -2.0]);
        assert_eq!(scores, vec![1.0, 0.5, 0.25]);
        assert!(scores[2] < RetrievalConfig::default().relevance_threshold);
        assert!(normalize_bm25(&[]).is_empty());
        assert_eq!(normalize_bm25(&[0.0]), vec![1.0]);
    }

    #[test]
    fn test_search_scoped_by_project() {
        let index = SqliteTextIndex::in_memory().unwrap();
        let a = ProjectId::new("a");
        let b = ProjectId::new("b");
        index
            .index_document(&a, "src/auth/login.ts", "export class LoginHandler { login() {} }")
            .unwrap();
        index
            .index_document(&b, "src/auth/login.ts", "export class LoginHandler {}")
            .unwrap();
        index
            .index_document(&a, "src/utils/date.ts", "export function formatDate() {}")
            .unwrap();

        let hits = index.search_by_text("LoginHandler", &a, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/auth/login.ts");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_reindex_replaces_and_remove() {
        let index = SqliteTextIndex::in_memory().unwrap();
        let p = ProjectId::new("p");
        index.index_document(&p, "a.ts", "alpha").unwrap();
        index.index_document(&p, "a.ts", "beta").unwrap();
        assert!(index.search_by_text("alpha", &p, 10).unwrap().is_empty());
        assert_eq!(index.search_by_text("beta", &p, 10).unwrap().len(), 1);
        assert!(index.remove_document(&p, "a.ts").unwrap());
        assert!(!index.remove_document(&p, "a.ts").unwrap());
    }
}
