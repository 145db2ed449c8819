//! File-level dependency graph for incremental checking.
//!
//! One node per source file, with forward and reverse edges kept
//! symmetric. Cycles are allowed (module imports may cycle); staleness
//! propagates along the dependency direction, so dependents of a changed
//! file re-check transitively.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::models::error::FastCheckError;
use crate::utils::helpers::djb2_hash;

#[derive(Debug, Clone)]
pub struct FileNode {
    pub path: PathBuf,
    pub content_hash: u64,
    pub last_modified: SystemTime,
    pub deps: FxHashSet<PathBuf>,
    pub dependents: FxHashSet<PathBuf>,
}

/// Thread-safe dependency graph. Readers take the shared lock; mutation
/// takes the exclusive lock.
pub struct DependencyGraph {
    nodes: RwLock<FxHashMap<PathBuf, FileNode>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Ensure a node exists for `path`, populating its mtime and content
    /// hash from disk. Existing nodes are refreshed.
    pub fn add_file(&self, path: &Path) -> Result<(), FastCheckError> {
        let (hash, mtime) = hash_and_mtime(path)?;

        let mut nodes = self.nodes.write();
        let node = nodes.entry(path.to_path_buf()).or_insert_with(|| FileNode {
            path: path.to_path_buf(),
            content_hash: 0,
            last_modified: SystemTime::UNIX_EPOCH,
            deps: FxHashSet::default(),
            dependents: FxHashSet::default(),
        });
        node.content_hash = hash;
        node.last_modified = mtime;
        trace!(path = %path.display(), hash, "dependency node refreshed");
        Ok(())
    }

    /// Record that `from` depends on `to`. Both edges are maintained;
    /// repeated calls are idempotent.
    pub fn add_dependency(&self, from: &Path, to: &Path) -> Result<(), FastCheckError> {
        if !self.contains(from) {
            self.add_file(from)?;
        }
        if !self.contains(to) {
            self.add_file(to)?;
        }

        let mut nodes = self.nodes.write();
        if let Some(node) = nodes.get_mut(from) {
            node.deps.insert(to.to_path_buf());
        }
        if let Some(node) = nodes.get_mut(to) {
            node.dependents.insert(from.to_path_buf());
        }
        Ok(())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.read().contains_key(path)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn deps_of(&self, path: &Path) -> Vec<PathBuf> {
        self.nodes
            .read()
            .get(path)
            .map(|node| node.deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, path: &Path) -> Vec<PathBuf> {
        self.nodes
            .read()
            .get(path)
            .map(|node| node.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// A file is stale when its on-disk state is newer than the node, its
    /// content hash changed, or any transitive dependency is stale.
    /// Unknown files are stale by definition.
    pub fn is_stale(&self, path: &Path) -> bool {
        let nodes = self.nodes.read();
        let mut visited: FxHashSet<&Path> = FxHashSet::default();
        let mut queue: VecDeque<&Path> = VecDeque::new();
        queue.push_back(path);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = nodes.get(current) else {
                return true;
            };
            if file_is_stale(node) {
                return true;
            }
            for dep in &node.deps {
                queue.push_back(dep.as_path());
            }
        }
        false
    }

    /// Snapshot of a single node, mostly for inspection and tests.
    pub fn node(&self, path: &Path) -> Option<FileNode> {
        self.nodes.read().get(path).cloned()
    }

    /// Verify the symmetric-edge invariant: every dependency edge has a
    /// matching reverse edge.
    pub fn edges_are_symmetric(&self) -> bool {
        let nodes = self.nodes.read();
        nodes.values().all(|node| {
            node.deps.iter().all(|dep| {
                nodes
                    .get(dep)
                    .is_some_and(|dep_node| dep_node.dependents.contains(&node.path))
            }) && node.dependents.iter().all(|dependent| {
                nodes
                    .get(dependent)
                    .is_some_and(|dependent_node| dependent_node.deps.contains(&node.path))
            })
        })
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn file_is_stale(node: &FileNode) -> bool {
    let Ok(metadata) = fs::metadata(&node.path) else {
        return true;
    };
    if let Ok(mtime) = metadata.modified() {
        if mtime > node.last_modified {
            return true;
        }
    }
    match fs::read(&node.path) {
        Ok(bytes) => djb2_hash(&bytes) != node.content_hash,
        Err(_) => true,
    }
}

fn hash_and_mtime(path: &Path) -> Result<(u64, SystemTime), FastCheckError> {
    let metadata = fs::metadata(path).map_err(|_| FastCheckError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mtime = metadata.modified()?;
    let bytes = fs::read(path)?;
    Ok((djb2_hash(&bytes), mtime))
}
