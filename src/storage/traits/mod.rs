//! Storage backend traits.

pub mod graph;
mod text;

pub use graph::{CodeGraphStore, GraphStats};
pub use text::{TextHit, TextIndex};
