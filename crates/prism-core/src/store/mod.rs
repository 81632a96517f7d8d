//! Hierarchical object store contract.
//!
//! The store is a tree of named nodes under a single private root. A node is
//! either a directory or a leaf holding bytes. Directories are addressed by a
//! [`NodePath`] obtained from [`ObjectStore::ensure_directory`].

use crate::error::{PrismError, Result};
use async_trait::async_trait;
use std::fmt;

/// Kind of a namespace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    Leaf,
}

/// A child as reported by [`ObjectStore::list_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub kind: NodeKind,
}

impl ChildEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Address of a directory relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    /// The store root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns the path of `name` inside this directory.
    pub fn child(&self, name: &str) -> Result<Self> {
        validate_name(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// Rejects names that would escape their directory or collide with staging files.
///
/// Names starting with `.` are reserved for in-progress writes.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(PrismError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Primitive operations over the hierarchical namespace.
///
/// Every operation may suspend on storage I/O and fails fast: errors are
/// surfaced to the caller and never retried here.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates `name` under `parent` if missing and returns its path.
    async fn ensure_directory(&self, parent: &NodePath, name: &str) -> Result<NodePath>;

    /// Reads a leaf. Fails with `NotFound` if it is absent.
    async fn read_leaf(&self, dir: &NodePath, name: &str) -> Result<Vec<u8>>;

    /// Replaces a leaf's content. Readers observe either the old or the new
    /// content, never a partial write. `dir` must already exist.
    async fn write_leaf(&self, dir: &NodePath, name: &str, content: &[u8]) -> Result<()>;

    /// Lists the children of `dir` in no particular order.
    async fn list_children(&self, dir: &NodePath) -> Result<Vec<ChildEntry>>;

    /// Removes a child. Removing an absent child succeeds. A non-empty
    /// directory requires `recursive`.
    async fn remove_child(&self, dir: &NodePath, name: &str, recursive: bool) -> Result<()>;

    /// Reads a leaf as UTF-8 text.
    async fn read_text(&self, dir: &NodePath, name: &str) -> Result<String> {
        let bytes = self.read_leaf(dir, name).await?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Writes a UTF-8 text leaf.
    async fn write_text(&self, dir: &NodePath, name: &str, content: &str) -> Result<()> {
        self.write_leaf(dir, name, content.as_bytes()).await
    }

    /// Ensures every segment of `names` in turn, starting at the root.
    async fn ensure_path(&self, names: &[&str]) -> Result<NodePath> {
        let mut current = NodePath::root();
        for name in names {
            current = self.ensure_directory(&current, name).await?;
        }
        Ok(current)
    }
}
