//! Wires the infrastructure and the orchestrator together for one CLI run.

use crate::render::TerminalRenderSink;
use anyhow::{Context, Result};
use prism_application::GenerationOrchestrator;
use prism_core::clock::{Clock, SystemClock};
use prism_core::store::ObjectStore;
use prism_infrastructure::paths::PrismPaths;
use prism_infrastructure::{
    ConfigService, FsObjectStore, StoreConversationRepository, StorePreferenceStore,
    StoreSummaryCache,
};
use prism_interaction::OpenRouterClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct App {
    pub orchestrator: GenerationOrchestrator,
    pub preferences: Arc<StorePreferenceStore>,
    pub repository: Arc<StoreConversationRepository>,
    store_root: PathBuf,
}

impl App {
    pub async fn build(config_path: Option<PathBuf>) -> Result<Self> {
        let config_service = match config_path {
            Some(path) => ConfigService::with_path(path),
            None => ConfigService::new()?,
        };
        let config = config_service.get_config();

        let store_root = match &config.storage.root {
            Some(root) => root.clone(),
            None => PrismPaths::store_root()?,
        };
        let store: Arc<dyn ObjectStore> = Arc::new(
            FsObjectStore::new(&store_root)
                .await
                .with_context(|| format!("Failed to open store at {}", store_root.display()))?,
        );
        tracing::debug!(root = %store_root.display(), config = %config_service.path().display(), "Starting prism");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let repository = Arc::new(StoreConversationRepository::new(store.clone(), clock.clone()));
        let summaries = Arc::new(StoreSummaryCache::new(
            store.clone(),
            repository.clone(),
            clock,
        ));
        let preferences = Arc::new(StorePreferenceStore::new(store));
        let api = Arc::new(OpenRouterClient::from_config(&config.api));

        let orchestrator = GenerationOrchestrator::new(
            repository.clone(),
            summaries,
            preferences.clone(),
            api,
            Arc::new(TerminalRenderSink),
            config,
        );

        Ok(Self {
            orchestrator,
            preferences,
            repository,
            store_root,
        })
    }

    /// Location of a stored image on disk.
    pub fn image_path(&self, timestamp: i64, index: u32) -> PathBuf {
        image_path(&self.store_root, timestamp, index)
    }
}

fn image_path(root: &Path, timestamp: i64, index: u32) -> PathBuf {
    root.join("conversations")
        .join(timestamp.to_string())
        .join("images")
        .join(format!("{}.png", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_path_layout() {
        let path = image_path(Path::new("/data/store"), 1000, 3);
        assert_eq!(path, PathBuf::from("/data/store/conversations/1000/images/3.png"));
    }
}
