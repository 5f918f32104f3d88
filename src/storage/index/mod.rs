//! Text index backends.
//!
//! | Backend | Use Case | Features |
//! |---------|----------|----------|
//! | [`SqliteTextIndex`] | Default; embedded | FTS5 with BM25 ranking |

mod sqlite;

pub use sqlite::SqliteTextIndex;
