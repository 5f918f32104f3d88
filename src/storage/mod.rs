//! Storage layer abstraction.
//!
//! Two stores back the pipeline:
//! - **Graph**: Projects, code entities and relationships (`SQLite`, `FalkorDB`, in-memory)
//! - **Text index**: Optional full-text ranking of file contents (`SQLite` + FTS5)
//!
//! The backend is chosen once at startup by [`StorageMode`]; everything
//! downstream depends on the traits only.

// Allow cast precision loss for score calculations where exact precision is not critical.
#![allow(clippy::cast_precision_loss)]
// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod graph;
pub mod index;
pub mod traits;

use serde::{Deserialize, Serialize};

pub use traits::{CodeGraphStore, GraphStats, TextHit, TextIndex};

/// Which graph backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Embedded `SQLite` database.
    #[default]
    Sqlite,
    /// Networked `FalkorDB` server.
    Falkordb,
    /// Non-persistent, for tests and dry runs.
    Memory,
}

impl StorageMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Falkordb => "falkordb",
            Self::Memory => "memory",
        }
    }

    /// Parses a mode.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "local" => Some(Self::Sqlite),
            "falkordb" | "falkor" | "remote" => Some(Self::Falkordb),
            "memory" | "in-memory" | "inmemory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_mode_parse() {
        assert_eq!(StorageMode::parse("SQLite"), Some(StorageMode::Sqlite));
        assert_eq!(StorageMode::parse("falkor"), Some(StorageMode::Falkordb));
        assert_eq!(StorageMode::parse("memory"), Some(StorageMode::Memory));
        assert_eq!(StorageMode::parse("postgres"), None);
    }
}
