//! Code graph backends.
//!
//! This module provides implementations of the [`CodeGraphStore`] trait.
//!
//! # Available Backends
//!
//! | Backend | Use Case | Features |
//! |---------|----------|----------|
//! | [`SqliteGraphStore`] | Default; embedded | Disk-persisted |
//! | `FalkorGraphStore` | Networked | Requires the `falkordb` feature |
//! | [`InMemoryGraphStore`] | Testing | Fast, no persistence |
//!
//! # Example
//!
//! ```rust
//! use taskscope::models::{GraphNode, NodeId, NodeType};
//! use taskscope::storage::graph::SqliteGraphStore;
//! use taskscope::storage::CodeGraphStore;
//!
//! let store = SqliteGraphStore::in_memory().unwrap();
//! let project = store.register_project("/work/app", "app").unwrap();
//! let node = GraphNode::new(NodeId::new("f1"), "a.ts", NodeType::File, "src/a.ts", project.clone());
//! store.upsert_nodes(&[node]).unwrap();
//! assert_eq!(store.find_nodes(&project, Some(NodeType::File)).unwrap().len(), 1);
//! ```

#[cfg(feature = "falkordb")]
mod falkor;
mod memory;
mod sqlite;

#[cfg(feature = "falkordb")]
pub use falkor::FalkorGraphStore;
pub use memory::InMemoryGraphStore;
pub use sqlite::SqliteGraphStore;

// Re-export trait for convenience
pub use crate::storage::traits::graph::{CodeGraphStore, GraphStats};
