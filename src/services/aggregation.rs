//! Aggregation of per-task results.
//!
//! Complex runs collect files, entities and relationships from every
//! sub-task. Deduplication keeps:
//!
//! - files: one per path, the highest similarity (first on ties)
//! - classes: one per name, the first seen
//! - relationships: one per `(from, type, to)`, the first seen
//!
//! Order of first appearance is preserved. Deduplicating twice changes
//! nothing.

use crate::models::{ClassInfo, Relationship, RetrievedFile};
use std::collections::{HashMap, HashSet};

/// Accumulates results across sub-tasks.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    /// Retrieved files.
    pub files: Vec<RetrievedFile>,
    /// Entities.
    pub classes: Vec<ClassInfo>,
    /// Relationships.
    pub relationships: Vec<Relationship>,
    /// Files reported as modified by the agent.
    pub modified_files: Vec<String>,
}

impl Aggregate {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one task's results.
    pub fn extend(
        &mut self,
        files: &[RetrievedFile],
        classes: &[ClassInfo],
        relationships: &[Relationship],
    ) {
        self.files.extend_from_slice(files);
        self.classes.extend_from_slice(classes);
        self.relationships.extend_from_slice(relationships);
    }

    /// Appends modified file paths.
    pub fn add_modified(&mut self, paths: &[String]) {
        self.modified_files.extend_from_slice(paths);
    }

    /// Deduplicates every collection in place.
    pub fn dedup(&mut self) {
        self.files = dedup_files(std::mem::take(&mut self.files));
        self.classes = dedup_classes(std::mem::take(&mut self.classes));
        self.relationships = dedup_relationships(std::mem::take(&mut self.relationships));
        let mut seen = HashSet::new();
        self.modified_files.retain(|p| seen.insert(p.clone()));
    }
}

/// Keeps one file per path with the highest similarity, in first-seen order.
#[must_use]
pub fn dedup_files(files: Vec<RetrievedFile>) -> Vec<RetrievedFile> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<RetrievedFile> = Vec::with_capacity(files.len());
    for file in files {
        match index.get(&file.path) {
            Some(&i) => {
                if file.similarity > out[i].similarity {
                    out[i] = file;
                }
            },
            None => {
                index.insert(file.path.clone(), out.len());
                out.push(file);
            },
        }
    }
    out
}

/// Keeps the first class of each name.
#[must_use]
pub fn dedup_classes(classes: Vec<ClassInfo>) -> Vec<ClassInfo> {
    let mut seen = HashSet::new();
    classes
        .into_iter()
        .filter(|c| seen.insert(c.name.clone()))
        .collect()
}

/// Keeps the first relationship of each `(from, type, to)` key.
#[must_use]
pub fn dedup_relationships(relationships: Vec<Relationship>) -> Vec<Relationship> {
    let mut seen = HashSet::new();
    relationships
        .into_iter()
        .filter(|r| seen.insert(r.key()))
        .collect()
}
