//! Summary cache persisted next to each conversation as `summary.json`.

use crate::conversation_repository::{CONVERSATIONS_DIR, StoreConversationRepository};
use async_trait::async_trait;
use prism_core::clock::Clock;
use prism_core::conversation::{ConversationRepository, ConversationSummary, SummaryCache};
use prism_core::error::Result;
use prism_core::store::ObjectStore;
use std::sync::Arc;

const SUMMARY_FILE: &str = "summary.json";

pub struct StoreSummaryCache {
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn ConversationRepository>,
    clock: Arc<dyn Clock>,
}

impl StoreSummaryCache {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn ConversationRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            repository,
            clock,
        }
    }

    async fn write(&self, timestamp: i64, summary: &ConversationSummary) -> Result<()> {
        let name = timestamp.to_string();
        let dir = self
            .store
            .ensure_path(&[CONVERSATIONS_DIR, name.as_str()])
            .await?;
        let json = serde_json::to_string_pretty(summary)?;
        self.store.write_text(&dir, SUMMARY_FILE, &json).await
    }

    async fn read(&self, timestamp: i64) -> Result<ConversationSummary> {
        let dir = StoreConversationRepository::conversation_path(timestamp)?;
        let json = self.store.read_text(&dir, SUMMARY_FILE).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait]
impl SummaryCache for StoreSummaryCache {
    async fn initialize(&self, timestamp: i64) -> Option<ConversationSummary> {
        let summary = ConversationSummary::initial(timestamp);
        match self.write(timestamp, &summary).await {
            Ok(()) => Some(summary),
            Err(e) => {
                tracing::error!(timestamp, "Failed to initialize summary: {}", e);
                None
            }
        }
    }

    async fn recompute(
        &self,
        timestamp: i64,
        title: Option<String>,
    ) -> Option<ConversationSummary> {
        let conversation = self.repository.load(timestamp).await?;

        let mut summary = match self.get(timestamp).await {
            Some(summary) => summary,
            None => ConversationSummary::initial(timestamp),
        };
        summary.refresh_counts(&conversation);
        if let Some(title) = title {
            summary.title = title;
        }
        summary.updated = self.clock.now_secs();

        if let Err(e) = self.write(timestamp, &summary).await {
            tracing::error!(timestamp, "Failed to persist summary: {}", e);
        }
        Some(summary)
    }

    async fn get(&self, timestamp: i64) -> Option<ConversationSummary> {
        match self.read(timestamp).await {
            Ok(summary) => Some(summary),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                tracing::warn!(timestamp, "Ignoring unreadable summary: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsObjectStore;
    use prism_core::clock::ManualClock;
    use prism_core::conversation::{
        Conversation, ConversationEntry, EntryMessage, PLACEHOLDER_TITLE, Resolution,
    };
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        clock: Arc<ManualClock>,
        repo: Arc<StoreConversationRepository>,
        cache: StoreSummaryCache,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(temp.path()).await.unwrap());
        let clock = Arc::new(ManualClock::new(1000));
        let repo = Arc::new(StoreConversationRepository::new(store.clone(), clock.clone()));
        let cache = StoreSummaryCache::new(store, repo.clone(), clock.clone());
        Fixture {
            _temp: temp,
            clock,
            repo,
            cache,
        }
    }

    fn conversation_with_images(timestamp: i64, counts: &[u32]) -> Conversation {
        let mut next = 1;
        let entries = counts
            .iter()
            .map(|count| {
                let mut entry = ConversationEntry::placeholder(
                    EntryMessage {
                        system_prompt: String::new(),
                        text: "prompt".to_string(),
                        seed: Some(1),
                    },
                    Resolution::OneK,
                );
                entry.response.image_filenames.clear();
                entry.response.image_resolutions.clear();
                for _ in 0..*count {
                    entry.push_image(next, Resolution::OneK);
                    next += 1;
                }
                entry
            })
            .collect();
        Conversation { timestamp, entries }
    }

    #[tokio::test]
    async fn test_initialize_writes_placeholder() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        let summary = f.cache.initialize(ts).await.unwrap();
        assert_eq!(summary.title, PLACEHOLDER_TITLE);
        assert_eq!((summary.image_count, summary.entry_count), (0, 0));
        assert_eq!((summary.created, summary.updated), (1000, 1000));
        assert_eq!(f.cache.get(ts).await, Some(summary));
    }

    #[tokio::test]
    async fn test_recompute_missing_conversation_is_none() {
        let f = fixture().await;
        assert!(f.cache.recompute(4242, None).await.is_none());
        assert!(f.cache.get(4242).await.is_none());
    }

    #[tokio::test]
    async fn test_recompute_counts_and_title() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        f.repo.save(ts, &conversation_with_images(ts, &[1, 2])).await;
        f.cache.initialize(ts).await;

        f.clock.set(1100);
        let titled = f.cache.recompute(ts, Some("Cats".to_string())).await.unwrap();
        assert_eq!(titled.title, "Cats");
        assert_eq!((titled.image_count, titled.entry_count), (3, 2));
        assert_eq!((titled.created, titled.updated), (1000, 1100));

        // Later recomputes keep the title unless a new one is supplied.
        f.clock.set(1200);
        let counts_only = f.cache.recompute(ts, None).await.unwrap();
        assert_eq!(counts_only.title, "Cats");
        assert_eq!(counts_only.updated, 1200);
    }

    #[tokio::test]
    async fn test_recompute_twice_differs_only_in_updated() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        f.repo.save(ts, &conversation_with_images(ts, &[1])).await;

        let first = f.cache.recompute(ts, None).await.unwrap();
        f.clock.advance(30);
        let second = f.cache.recompute(ts, None).await.unwrap();

        assert_eq!(first.title, second.title);
        assert_eq!(first.image_count, second.image_count);
        assert_eq!(first.entry_count, second.entry_count);
        assert_eq!(first.created, second.created);
        assert_eq!(second.updated, first.updated + 30);
    }

    #[tokio::test]
    async fn test_recompute_without_summary_starts_from_placeholder() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        f.repo.save(ts, &conversation_with_images(ts, &[2])).await;
        f.clock.set(1500);

        let summary = f.cache.recompute(ts, None).await.unwrap();
        assert_eq!(summary.title, PLACEHOLDER_TITLE);
        assert_eq!(summary.created, 1000);
        assert_eq!(summary.image_count, 2);
        assert_eq!(f.cache.get(ts).await, Some(summary));
    }
}
