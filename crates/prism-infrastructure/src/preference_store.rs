//! Preference store layered on the object store.
//!
//! Each preference is a UTF-8 leaf named after its key under `/preferences`.

use async_trait::async_trait;
use prism_core::error::Result;
use prism_core::preference::PreferenceStore;
use prism_core::store::{NodePath, ObjectStore};
use std::sync::Arc;

const PREFERENCES_DIR: &str = "preferences";

pub struct StorePreferenceStore {
    store: Arc<dyn ObjectStore>,
}

impl StorePreferenceStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    async fn dir(&self) -> Result<NodePath> {
        self.store
            .ensure_directory(&NodePath::root(), PREFERENCES_DIR)
            .await
    }

    async fn try_get(&self, key: &str) -> Result<Option<String>> {
        let dir = self.dir().await?;
        match self.store.read_text(&dir, key).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn try_clear(&self) -> Result<()> {
        let dir = self.dir().await?;
        for child in self.store.list_children(&dir).await? {
            self.store.remove_child(&dir, &child.name, true).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for StorePreferenceStore {
    async fn get(&self, key: &str, default: Option<&str>) -> Option<String> {
        match self.try_get(key).await {
            Ok(Some(value)) if !value.trim().is_empty() => Some(value),
            Ok(_) => default.map(str::to_string),
            Err(e) => {
                tracing::warn!(key, "Failed to read preference: {}", e);
                default.map(str::to_string)
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> bool {
        let result = async {
            let dir = self.dir().await?;
            self.store.write_text(&dir, key, value).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, "Failed to save preference: {}", e);
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let result = async {
            let dir = self.dir().await?;
            self.store.remove_child(&dir, key, false).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, "Failed to delete preference: {}", e);
                false
            }
        }
    }

    async fn list(&self) -> Vec<String> {
        let result = async {
            let dir = self.dir().await?;
            self.store.list_children(&dir).await
        }
        .await;
        match result {
            Ok(children) => {
                let mut keys: Vec<String> = children
                    .into_iter()
                    .filter(|c| !c.is_directory())
                    .map(|c| c.name)
                    .collect();
                keys.sort();
                keys
            }
            Err(e) => {
                tracing::warn!("Failed to list preferences: {}", e);
                Vec::new()
            }
        }
    }

    async fn clear(&self) -> bool {
        match self.try_clear().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to clear preferences: {}", e);
                false
            }
        }
    }
}
