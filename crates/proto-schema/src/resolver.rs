//! Dependency resolution for schema files.
//!
//! Files are linked by iterative fixed-point passes: a file resolves once all
//! of its imports have resolved, and holds `Arc` links to those exact
//! resolved files. Files with a missing import or caught in an import cycle
//! never resolve and are reported together.

use crate::descriptor::{EnumDescriptor, MessageDescriptor};
use crate::error::{Error, Result};
use crate::store::FileDescriptorRecord;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// A schema file whose dependencies have all been resolved.
#[derive(Debug)]
pub struct ResolvedFile {
    record: FileDescriptorRecord,
    dependencies: Vec<Arc<ResolvedFile>>,
}

impl ResolvedFile {
    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn package(&self) -> &str {
        &self.record.package
    }

    pub fn record(&self) -> &FileDescriptorRecord {
        &self.record
    }

    /// Resolved dependencies, in the order the file declares them.
    pub fn dependencies(&self) -> &[Arc<ResolvedFile>] {
        &self.dependencies
    }

    /// Top-level messages declared in this file.
    pub fn messages(&self) -> &[Arc<MessageDescriptor>] {
        &self.record.types.messages
    }

    /// Find a message by fully qualified name in this file or, recursively,
    /// in any file it depends on.
    pub fn find_message(&self, full_name: &str) -> Option<Arc<MessageDescriptor>> {
        let mut visited = HashSet::new();
        self.search(&mut visited, &|file| {
            file.record
                .types
                .all_messages()
                .find(|m| m.full_name == full_name)
                .cloned()
        })
    }

    /// Find an enum by fully qualified name in this file or its dependencies.
    pub fn find_enum(&self, full_name: &str) -> Option<Arc<EnumDescriptor>> {
        let mut visited = HashSet::new();
        self.search(&mut visited, &|file| {
            file.record
                .types
                .enums
                .iter()
                .find(|e| e.full_name == full_name)
                .cloned()
        })
    }

    fn search<'a, T>(
        &'a self,
        visited: &mut HashSet<&'a str>,
        probe: &dyn Fn(&ResolvedFile) -> Option<T>,
    ) -> Option<T> {
        if !visited.insert(self.name()) {
            return None;
        }
        if let Some(found) = probe(self) {
            return Some(found);
        }
        self.dependencies
            .iter()
            .find_map(|dep| dep.search(visited, probe))
    }
}

/// The linked collection of schema files from one snapshot.
#[derive(Debug, Default)]
pub struct SchemaGraph {
    files: Vec<Arc<ResolvedFile>>,
    index: HashMap<String, usize>,
    unresolved: Vec<FileDescriptorRecord>,
    passes: usize,
}

impl SchemaGraph {
    /// Link records into a graph.
    ///
    /// The first pass resolves every file without imports. Each following
    /// pass resolves the files whose imports are all resolved, until a pass
    /// makes no progress. This takes at most one pass per record.
    pub fn resolve(records: Vec<FileDescriptorRecord>) -> Self {
        let mut graph = SchemaGraph::default();
        let mut pending = records;

        while !pending.is_empty() {
            graph.passes += 1;
            let before = pending.len();
            let mut remaining = Vec::with_capacity(before);

            for record in pending {
                match graph.linked_dependencies(&record) {
                    Some(dependencies) => {
                        debug!(
                            "Resolved {} in pass {} ({} dependencies)",
                            record.name,
                            graph.passes,
                            dependencies.len()
                        );
                        graph.insert(ResolvedFile {
                            record,
                            dependencies,
                        });
                    }
                    None => remaining.push(record),
                }
            }

            pending = remaining;
            if pending.len() == before {
                break;
            }
        }

        if !pending.is_empty() {
            let names: Vec<&str> = pending.iter().map(|r| r.name.as_str()).collect();
            warn!("Could not resolve dependencies for: {:?}", names);
        }
        graph.unresolved = pending;
        graph
    }

    fn linked_dependencies(&self, record: &FileDescriptorRecord) -> Option<Vec<Arc<ResolvedFile>>> {
        record
            .dependencies
            .iter()
            .map(|dep| self.file(dep).cloned())
            .collect()
    }

    fn insert(&mut self, file: ResolvedFile) {
        self.index.insert(file.name().to_string(), self.files.len());
        self.files.push(Arc::new(file));
    }

    /// Resolved files in the order they were resolved.
    pub fn files(&self) -> &[Arc<ResolvedFile>] {
        &self.files
    }

    /// Look up a resolved file by name.
    pub fn file(&self, name: &str) -> Option<&Arc<ResolvedFile>> {
        self.index.get(name).map(|&i| &self.files[i])
    }

    /// Records that never became resolvable.
    pub fn unresolved(&self) -> &[FileDescriptorRecord] {
        &self.unresolved
    }

    pub fn unresolved_names(&self) -> Vec<String> {
        self.unresolved.iter().map(|r| r.name.clone()).collect()
    }

    /// Number of passes the resolution took.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Fail with `UnresolvedDependencies` if any record stayed unresolved.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(Error::UnresolvedDependencies(self.unresolved_names()))
        }
    }
}
