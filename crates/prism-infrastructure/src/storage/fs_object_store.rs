//! Filesystem-backed hierarchical object store.
//!
//! Directories map to real directories under a single root; leaves map to
//! files. Leaf writes go to a hidden staging file in the same directory which
//! is fsynced and then renamed over the target, so readers see either the
//! previous content or the complete new content.

use async_trait::async_trait;
use prism_core::error::{PrismError, Result};
use prism_core::store::{ChildEntry, NodeKind, NodePath, ObjectStore, validate_name};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Staging files younger than this may belong to a write still in progress.
const STALE_STAGING_AGE: Duration = Duration::from_secs(60);

/// Object store rooted at a directory on disk.
///
/// Directory structure mirrors the namespace:
/// ```text
/// root/
/// ├── preferences/
/// │   └── apiKey
/// └── conversations/
///     └── 1700000000/
///         ├── conversation.json
///         ├── summary.json
///         └── images/
///             └── 1.png
/// ```
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    staging_counter: AtomicU64,
}

impl FsObjectStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        match sweep_stale_staging(&root).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Removed stale staging files"),
            Err(e) => tracing::warn!("Staging sweep failed: {}", e),
        }
        tracing::debug!(root = %root.display(), "Opened object store");
        Ok(Self {
            root,
            staging_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, dir: &NodePath) -> PathBuf {
        let mut path = self.root.clone();
        for segment in dir.segments() {
            path.push(segment);
        }
        path
    }

    async fn existing_directory(&self, dir: &NodePath) -> Result<PathBuf> {
        let path = self.resolve(dir);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(PrismError::io(format!("{} is not a directory", dir))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PrismError::not_found("Directory", dir.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn staging_path(&self, dir_path: &Path, name: &str) -> PathBuf {
        let n = self.staging_counter.fetch_add(1, Ordering::Relaxed);
        dir_path.join(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
    }
}

fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

/// Removes staging files left by writes that were interrupted before the rename.
async fn sweep_stale_staging(root: &Path) -> Result<usize> {
    let mut pending = vec![root.to_path_buf()];
    let mut removed = 0;
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
                continue;
            }
            let staging = entry.file_name().to_str().is_some_and(is_staging_name);
            if !staging || !file_type.is_file() {
                continue;
            }
            let stale = entry
                .metadata()
                .await?
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .is_some_and(|age| age >= STALE_STAGING_AGE);
            if stale {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn ensure_directory(&self, parent: &NodePath, name: &str) -> Result<NodePath> {
        let node = parent.child(name)?;
        let path = self.resolve(&node);
        fs::create_dir_all(&path).await?;
        Ok(node)
    }

    async fn read_leaf(&self, dir: &NodePath, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        let path = self.resolve(dir).join(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PrismError::not_found("Leaf", format!("{}/{}", dir, name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_leaf(&self, dir: &NodePath, name: &str, content: &[u8]) -> Result<()> {
        validate_name(name)?;
        let dir_path = self.existing_directory(dir).await?;
        let target = dir_path.join(name);
        let staging = self.staging_path(&dir_path, name);

        let result = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(content).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&staging, &target).await
        }
        .await;

        if let Err(e) = result {
            // Staging files are hidden from listings, but don't leave them around.
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn list_children(&self, dir: &NodePath) -> Result<Vec<ChildEntry>> {
        let dir_path = self.existing_directory(dir).await?;
        let mut entries = fs::read_dir(&dir_path).await?;
        let mut children = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!("Skipping non UTF-8 entry {:?} in {}", raw, dir);
                    continue;
                }
            };
            if name.starts_with('.') {
                continue;
            }
            let kind = if entry.file_type().await?.is_dir() {
                NodeKind::Directory
            } else {
                NodeKind::Leaf
            };
            children.push(ChildEntry { name, kind });
        }

        Ok(children)
    }

    async fn remove_child(&self, dir: &NodePath, name: &str, recursive: bool) -> Result<()> {
        validate_name(name)?;
        let path = self.resolve(dir).join(name);
        let meta = match fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let result = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_dir(&path).await
            }
        } else {
            fs::remove_file(&path).await
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, FsObjectStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path()).await.unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_ensure_directory_is_idempotent() {
        let (_temp, store) = store().await;
        let first = store
            .ensure_directory(&NodePath::root(), "conversations")
            .await
            .unwrap();
        let second = store
            .ensure_directory(&NodePath::root(), "conversations")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert!(store.root().join("conversations").is_dir());
    }

    #[tokio::test]
    async fn test_write_and_read_leaf() {
        let (_temp, store) = store().await;
        let dir = store.ensure_path(&["a", "b"]).await.unwrap();

        store.write_leaf(&dir, "data.bin", &[1, 2, 3]).await.unwrap();
        assert_eq!(store.read_leaf(&dir, "data.bin").await.unwrap(), vec![1, 2, 3]);

        store.write_text(&dir, "data.bin", "replaced").await.unwrap();
        assert_eq!(store.read_text(&dir, "data.bin").await.unwrap(), "replaced");
    }

    #[tokio::test]
    async fn test_write_leaves_no_staging_files() {
        let (temp, store) = store().await;
        let dir = store.ensure_directory(&NodePath::root(), "d").await.unwrap();
        store.write_text(&dir, "leaf", "content").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path().join("d"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["leaf".to_string()]);
    }

    #[tokio::test]
    async fn test_reopen_sweeps_stale_staging_files() {
        let (temp, store) = store().await;
        let dir = store.ensure_path(&["conversations", "1000"]).await.unwrap();
        store.write_text(&dir, "summary.json", "{}").await.unwrap();

        let conversation_dir = temp.path().join("conversations/1000");
        let stale = conversation_dir.join(".summary.json.1.0.tmp");
        let fresh = conversation_dir.join(".conversation.json.2.0.tmp");
        std::fs::write(&stale, "partial").unwrap();
        std::fs::write(&fresh, "in progress").unwrap();
        let an_hour_ago = std::time::SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(an_hour_ago)
            .unwrap();

        drop(store);
        let reopened = FsObjectStore::new(temp.path()).await.unwrap();
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert_eq!(reopened.read_text(&dir, "summary.json").await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_read_missing_leaf_is_not_found() {
        let (_temp, store) = store().await;
        let err = store.read_leaf(&NodePath::root(), "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let (_temp, store) = store().await;
        let dir = NodePath::root().child("nowhere").unwrap();
        let err = store.write_text(&dir, "leaf", "x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_children_reports_kinds_and_hides_staging() {
        let (temp, store) = store().await;
        let dir = store.ensure_directory(&NodePath::root(), "d").await.unwrap();
        store.ensure_directory(&dir, "sub").await.unwrap();
        store.write_text(&dir, "leaf", "x").await.unwrap();
        std::fs::write(temp.path().join("d").join(".leaf.1.0.tmp"), "partial").unwrap();

        let mut children = store.list_children(&dir).await.unwrap();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            children,
            vec![
                ChildEntry {
                    name: "leaf".to_string(),
                    kind: NodeKind::Leaf
                },
                ChildEntry {
                    name: "sub".to_string(),
                    kind: NodeKind::Directory
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_child() {
        let (_temp, store) = store().await;
        let dir = store.ensure_path(&["top", "nested"]).await.unwrap();
        store.write_text(&dir, "leaf", "x").await.unwrap();
        let top = NodePath::root().child("top").unwrap();

        // Absent children are fine
        store.remove_child(&top, "ghost", false).await.unwrap();

        // Non-empty directory needs recursive
        assert!(store.remove_child(&top, "nested", false).await.is_err());
        store.remove_child(&top, "nested", true).await.unwrap();
        assert!(store.list_children(&top).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_names_are_rejected() {
        let (_temp, store) = store().await;
        assert!(matches!(
            store.ensure_directory(&NodePath::root(), "..").await,
            Err(PrismError::InvalidName(_))
        ));
        assert!(matches!(
            store.write_text(&NodePath::root(), "a/b", "x").await,
            Err(PrismError::InvalidName(_))
        ));
    }
}
