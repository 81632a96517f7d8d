//! Object-store-backed ConversationRepository implementation.

use crate::image_data::{decode_image_payload, to_png_data_url};
use async_trait::async_trait;
use prism_core::clock::Clock;
use prism_core::conversation::{Conversation, ConversationRepository};
use prism_core::error::{PrismError, Result};
use prism_core::store::{NodePath, ObjectStore};
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) const CONVERSATIONS_DIR: &str = "conversations";
pub(crate) const CONVERSATION_FILE: &str = "conversation.json";
pub(crate) const IMAGES_DIR: &str = "images";
const PNG_EXTENSION: &str = ".png";
/// Highest image index ever deleted from a conversation.
const WATERMARK_LEAF: &str = "watermark";

/// Conversation repository over an [`ObjectStore`].
///
/// Layout:
/// ```text
/// conversations/
/// └── <timestamp>/
///     ├── conversation.json
///     ├── summary.json
///     └── images/
///         ├── 1.png
///         ├── 2.png
///         └── watermark
/// ```
///
/// The next image index is `max(indices on disk, watermark) + 1`. The
/// watermark only exists so that deleting the newest image does not hand its
/// index out again.
pub struct StoreConversationRepository {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    /// Serializes index allocation and watermark updates.
    image_lock: Mutex<()>,
}

impl StoreConversationRepository {
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            image_lock: Mutex::new(()),
        }
    }

    pub(crate) fn conversation_path(timestamp: i64) -> Result<NodePath> {
        NodePath::root()
            .child(CONVERSATIONS_DIR)?
            .child(&timestamp.to_string())
    }

    async fn conversations_dir(&self) -> Result<NodePath> {
        self.store
            .ensure_directory(&NodePath::root(), CONVERSATIONS_DIR)
            .await
    }

    async fn ensure_conversation_dir(&self, timestamp: i64) -> Result<NodePath> {
        let name = timestamp.to_string();
        self.store
            .ensure_path(&[CONVERSATIONS_DIR, name.as_str()])
            .await
    }

    async fn ensure_images_dir(&self, timestamp: i64) -> Result<NodePath> {
        let name = timestamp.to_string();
        self.store
            .ensure_path(&[CONVERSATIONS_DIR, name.as_str(), IMAGES_DIR])
            .await
    }

    async fn conversation_exists(&self, timestamp: i64) -> Result<bool> {
        let conversations = self.conversations_dir().await?;
        let name = timestamp.to_string();
        Ok(self
            .store
            .list_children(&conversations)
            .await?
            .iter()
            .any(|c| c.is_directory() && c.name == name))
    }

    async fn try_load(&self, timestamp: i64) -> Result<Conversation> {
        let dir = Self::conversation_path(timestamp)?;
        let json = self.store.read_text(&dir, CONVERSATION_FILE).await?;
        let mut conversation: Conversation = serde_json::from_str(&json)?;
        // The directory name is authoritative.
        conversation.timestamp = timestamp;
        Ok(conversation)
    }

    async fn try_save(&self, timestamp: i64, conversation: &Conversation) -> Result<()> {
        let dir = self.ensure_conversation_dir(timestamp).await?;
        let json = serde_json::to_string_pretty(conversation)?;
        self.store.write_text(&dir, CONVERSATION_FILE, &json).await
    }

    async fn read_watermark(&self, images: &NodePath) -> Result<u32> {
        match self.store.read_text(images, WATERMARK_LEAF).await {
            Ok(text) => Ok(text.trim().parse().unwrap_or(0)),
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn raise_watermark(&self, images: &NodePath, index: u32) -> Result<()> {
        if index > self.read_watermark(images).await? {
            self.store
                .write_text(images, WATERMARK_LEAF, &index.to_string())
                .await?;
        }
        Ok(())
    }

    async fn image_indices(&self, images: &NodePath) -> Result<Vec<u32>> {
        Ok(self
            .store
            .list_children(images)
            .await?
            .into_iter()
            .filter(|c| !c.is_directory())
            .filter_map(|c| parse_image_name(&c.name))
            .collect())
    }

    async fn try_save_image(&self, timestamp: i64, bytes: &[u8]) -> Result<u32> {
        let _guard = self.image_lock.lock().await;
        let images = self.ensure_images_dir(timestamp).await?;
        let highest_on_disk = self
            .image_indices(&images)
            .await?
            .into_iter()
            .max()
            .unwrap_or(0);
        let next = highest_on_disk
            .max(self.read_watermark(&images).await?)
            .checked_add(1)
            .ok_or_else(|| PrismError::io("Image index space exhausted"))?;
        self.store
            .write_leaf(&images, &image_name(next), bytes)
            .await?;
        Ok(next)
    }

    async fn try_delete_image(&self, timestamp: i64, index: u32) -> Result<()> {
        let _guard = self.image_lock.lock().await;
        let images = self.ensure_images_dir(timestamp).await?;
        self.raise_watermark(&images, index).await?;
        self.store
            .remove_child(&images, &image_name(index), false)
            .await
    }
}

fn image_name(index: u32) -> String {
    format!("{}{}", index, PNG_EXTENSION)
}

/// Parses `<index>.png` where `<index>` is a positive decimal without leading zeros.
fn parse_image_name(name: &str) -> Option<u32> {
    let digits = name.strip_suffix(PNG_EXTENSION)?;
    parse_decimal(digits).and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0)
}

fn parse_decimal(s: &str) -> Option<u64> {
    let canonical = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    if canonical { s.parse().ok() } else { None }
}

#[async_trait]
impl ConversationRepository for StoreConversationRepository {
    async fn create(&self) -> i64 {
        let timestamp = self.clock.now_secs();
        if let Err(e) = self.ensure_images_dir(timestamp).await {
            tracing::error!(timestamp, "Failed to create conversation directory: {}", e);
        } else {
            tracing::debug!(timestamp, "Created conversation");
        }
        timestamp
    }

    async fn list(&self) -> Vec<i64> {
        let result = async {
            let dir = self.conversations_dir().await?;
            self.store.list_children(&dir).await
        }
        .await;

        let children = match result {
            Ok(children) => children,
            Err(e) => {
                tracing::error!("Failed to list conversations: {}", e);
                return Vec::new();
            }
        };

        let mut timestamps: Vec<i64> = children
            .into_iter()
            .filter(|c| c.is_directory())
            .filter_map(|c| parse_decimal(&c.name))
            .filter_map(|n| i64::try_from(n).ok())
            .collect();
        timestamps.sort_unstable_by(|a, b| b.cmp(a));
        timestamps.dedup();
        timestamps
    }

    async fn load(&self, timestamp: i64) -> Option<Conversation> {
        match self.try_load(timestamp).await {
            Ok(conversation) => Some(conversation),
            Err(e) if e.is_not_found() => {
                tracing::debug!(timestamp, "Conversation not found");
                None
            }
            Err(e) => {
                tracing::warn!(timestamp, "Failed to load conversation: {}", e);
                None
            }
        }
    }

    async fn save(&self, timestamp: i64, conversation: &Conversation) -> bool {
        match self.try_save(timestamp, conversation).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(timestamp, "Failed to save conversation: {}", e);
                false
            }
        }
    }

    async fn delete(&self, timestamp: i64) -> bool {
        let result = async {
            let dir = self.conversations_dir().await?;
            self.store
                .remove_child(&dir, &timestamp.to_string(), true)
                .await
        }
        .await;
        match result {
            Ok(()) => {
                tracing::info!(timestamp, "Deleted conversation");
                true
            }
            Err(e) => {
                tracing::error!(timestamp, "Failed to delete conversation: {}", e);
                false
            }
        }
    }

    async fn save_image(&self, timestamp: i64, image: &str) -> Option<u32> {
        let bytes = match decode_image_payload(image) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(timestamp, "Dropping undecodable image payload: {}", e);
                return None;
            }
        };
        match self.try_save_image(timestamp, &bytes).await {
            Ok(index) => {
                tracing::debug!(timestamp, index, size = bytes.len(), "Saved image");
                Some(index)
            }
            Err(e) => {
                tracing::error!(timestamp, "Failed to save image: {}", e);
                None
            }
        }
    }

    async fn get_image(&self, timestamp: i64, index: u32) -> Option<Vec<u8>> {
        let result = async {
            let images = Self::conversation_path(timestamp)?.child(IMAGES_DIR)?;
            self.store.read_leaf(&images, &image_name(index)).await
        }
        .await;
        match result {
            Ok(bytes) => Some(bytes),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                tracing::warn!(timestamp, index, "Failed to read image: {}", e);
                None
            }
        }
    }

    async fn get_image_data_url(&self, timestamp: i64, index: u32) -> Option<String> {
        self.get_image(timestamp, index)
            .await
            .map(|bytes| to_png_data_url(&bytes))
    }

    async fn delete_image(&self, timestamp: i64, index: u32) -> bool {
        match self.conversation_exists(timestamp).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                tracing::error!(timestamp, "Failed to look up conversation: {}", e);
                return false;
            }
        }
        match self.try_delete_image(timestamp, index).await {
            Ok(()) => {
                tracing::debug!(timestamp, index, "Deleted image");
                true
            }
            Err(e) => {
                tracing::error!(timestamp, index, "Failed to delete image: {}", e);
                false
            }
        }
    }

    async fn delete_all_images(&self, timestamp: i64) {
        let _guard = self.image_lock.lock().await;
        let images = match Self::conversation_path(timestamp).and_then(|p| p.child(IMAGES_DIR)) {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(timestamp, "Invalid images path: {}", e);
                return;
            }
        };
        let indices = match self.image_indices(&images).await {
            Ok(indices) => indices,
            Err(e) => {
                tracing::debug!(timestamp, "No images to delete: {}", e);
                return;
            }
        };

        if let Some(highest) = indices.iter().copied().max() {
            if let Err(e) = self.raise_watermark(&images, highest).await {
                tracing::warn!(timestamp, "Failed to record image watermark: {}", e);
            }
        }
        for index in indices {
            if let Err(e) = self
                .store
                .remove_child(&images, &image_name(index), false)
                .await
            {
                tracing::warn!(timestamp, index, "Failed to delete image: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsObjectStore;
    use prism_core::clock::ManualClock;
    use prism_core::conversation::{ConversationEntry, EntryMessage, Resolution};
    use tempfile::TempDir;

    const PNG_A: &str = "data:image/png;base64,aGVsbG8=";
    const PNG_B: &str = "d29ybGQ=";

    struct Fixture {
        temp: TempDir,
        clock: Arc<ManualClock>,
        repo: StoreConversationRepository,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FsObjectStore::new(temp.path()).await.unwrap());
        let clock = Arc::new(ManualClock::new(1000));
        let repo = StoreConversationRepository::new(store, clock.clone());
        Fixture { temp, clock, repo }
    }

    fn sample_conversation(timestamp: i64) -> Conversation {
        let mut entry = ConversationEntry::placeholder(
            EntryMessage {
                system_prompt: "be vivid".to_string(),
                text: "a cat".to_string(),
                seed: Some(42),
            },
            Resolution::TwoK,
        );
        entry.response.image_filenames.clear();
        entry.response.image_resolutions.clear();
        entry.push_image(1, Resolution::TwoK);
        entry.response.text = Some("Here you go".to_string());
        entry.response.response_data = Some(serde_json::json!({"id": "gen-1"}));
        Conversation {
            timestamp,
            entries: vec![entry],
        }
    }

    #[tokio::test]
    async fn test_create_makes_directories() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        assert_eq!(ts, 1000);
        assert!(f.temp.path().join("conversations/1000/images").is_dir());
        assert_eq!(f.repo.list().await, vec![1000]);
    }

    #[tokio::test]
    async fn test_same_second_creation_shares_one_record() {
        let f = fixture().await;
        let first = f.repo.create().await;
        assert!(f.repo.save(first, &sample_conversation(first)).await);

        let second = f.repo.create().await;
        assert_eq!(first, second);
        assert_eq!(f.repo.list().await, vec![1000]);
        // Re-creating does not wipe the existing record.
        assert_eq!(f.repo.load(second).await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_list_sorted_descending_and_skips_non_numeric() {
        let f = fixture().await;
        for ts in [1000, 3000, 2000] {
            f.clock.set(ts);
            f.repo.create().await;
        }
        let root = f.temp.path().join("conversations");
        std::fs::create_dir(root.join("notes")).unwrap();
        std::fs::create_dir(root.join("0042")).unwrap();
        std::fs::write(root.join("5000"), "a leaf, not a conversation").unwrap();

        assert_eq!(f.repo.list().await, vec![3000, 2000, 1000]);
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        let conversation = sample_conversation(ts);
        assert!(f.repo.save(ts, &conversation).await);
        assert_eq!(f.repo.load(ts).await, Some(conversation));

        let json = std::fs::read_to_string(f.temp.path().join("conversations/1000/conversation.json"))
            .unwrap();
        assert!(json.contains("\n  \"entries\""));
        assert!(json.contains("\"imageFilenames\""));
    }

    #[tokio::test]
    async fn test_load_missing_or_corrupt_is_none() {
        let f = fixture().await;
        assert!(f.repo.load(1234).await.is_none());

        let ts = f.repo.create().await;
        std::fs::write(
            f.temp.path().join("conversations/1000/conversation.json"),
            "{ not json",
        )
        .unwrap();
        assert!(f.repo.load(ts).await.is_none());
    }

    #[tokio::test]
    async fn test_save_image_indices_increase_by_one() {
        let f = fixture().await;
        let ts = f.repo.create().await;

        assert_eq!(f.repo.save_image(ts, PNG_A).await, Some(1));
        assert_eq!(f.repo.save_image(ts, "%%% not base64").await, None);
        assert_eq!(f.repo.save_image(ts, PNG_B).await, Some(2));

        assert_eq!(f.repo.get_image(ts, 1).await, Some(b"hello".to_vec()));
        assert_eq!(f.repo.get_image(ts, 2).await, Some(b"world".to_vec()));
        assert_eq!(
            f.repo.get_image_data_url(ts, 1).await.as_deref(),
            Some("data:image/png;base64,aGVsbG8=")
        );
        assert!(f.repo.get_image(ts, 3).await.is_none());
    }

    #[tokio::test]
    async fn test_deleted_indices_are_never_reused() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        f.repo.save_image(ts, PNG_A).await;
        f.repo.save_image(ts, PNG_A).await;
        f.repo.save_image(ts, PNG_A).await;

        // Deleting the newest image must not free its index.
        assert!(f.repo.delete_image(ts, 3).await);
        assert!(f.repo.get_image(ts, 3).await.is_none());
        assert_eq!(f.repo.save_image(ts, PNG_B).await, Some(4));

        // Nor may deleting a middle one renumber anything.
        assert!(f.repo.delete_image(ts, 2).await);
        assert_eq!(f.repo.get_image(ts, 4).await, Some(b"world".to_vec()));
        assert_eq!(f.repo.save_image(ts, PNG_B).await, Some(5));
    }

    #[tokio::test]
    async fn test_index_scan_self_heals_from_stray_files() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        // An image written by an earlier run that never made it into the record.
        std::fs::write(f.temp.path().join("conversations/1000/images/7.png"), b"x").unwrap();
        std::fs::write(f.temp.path().join("conversations/1000/images/08.png"), b"x").unwrap();
        assert_eq!(f.repo.save_image(ts, PNG_A).await, Some(8));
    }

    #[tokio::test]
    async fn test_exhausted_index_space_fails_quietly() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        let images = f.temp.path().join("conversations/1000/images");
        std::fs::write(images.join("4294967295.png"), b"x").unwrap();
        assert_eq!(f.repo.save_image(ts, PNG_A).await, None);

        std::fs::remove_file(images.join("4294967295.png")).unwrap();
        std::fs::write(images.join(WATERMARK_LEAF), u32::MAX.to_string()).unwrap();
        assert_eq!(f.repo.save_image(ts, PNG_A).await, None);
        assert!(!images.join("0.png").exists());
    }

    #[tokio::test]
    async fn test_delete_all_images_keeps_numbering() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        f.repo.save_image(ts, PNG_A).await;
        f.repo.save_image(ts, PNG_A).await;

        f.repo.delete_all_images(ts).await;
        assert!(f.repo.get_image(ts, 1).await.is_none());
        assert!(f.repo.get_image(ts, 2).await.is_none());
        assert_eq!(f.repo.save_image(ts, PNG_A).await, Some(3));

        // Missing conversation is a quiet no-op.
        f.repo.delete_all_images(9999).await;
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let f = fixture().await;
        let ts = f.repo.create().await;
        f.repo.save(ts, &sample_conversation(ts)).await;
        f.repo.save_image(ts, PNG_A).await;

        assert!(f.repo.delete(ts).await);
        assert!(f.repo.list().await.is_empty());
        assert!(f.repo.load(ts).await.is_none());
        assert!(f.repo.get_image(ts, 1).await.is_none());
        assert!(!f.repo.delete_image(ts, 1).await);
    }
}
