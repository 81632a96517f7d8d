//! Conversation repository trait.
//!
//! Defines the interface for conversation and image persistence.

use super::model::Conversation;
use async_trait::async_trait;

/// An abstract repository owning conversation and image lifecycles.
///
/// Conversations are keyed by their creation timestamp (seconds since epoch).
///
/// # Failure policy
///
/// Implementations log storage failures and return a sentinel absence
/// (`None`, `false`, empty `Vec`) instead of propagating them, so callers
/// driving a screen can always degrade gracefully.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Mints a timestamp from the current second and creates its directory
    /// with an empty images subdirectory.
    ///
    /// The timestamp is returned even when the storage step fails.
    async fn create(&self) -> i64;

    /// Timestamps of all conversations, most recent first.
    async fn list(&self) -> Vec<i64>;

    /// Loads a conversation, or `None` when missing or unreadable.
    async fn load(&self, timestamp: i64) -> Option<Conversation>;

    /// Overwrites the whole conversation record.
    async fn save(&self, timestamp: i64, conversation: &Conversation) -> bool;

    /// Removes the conversation with its entries, summary and images.
    async fn delete(&self, timestamp: i64) -> bool;

    /// Decodes a data URL or raw base64 payload and stores it as the next image.
    ///
    /// The index is one past the highest index currently on disk, so indices
    /// only ever grow. Returns `None` if decoding or writing fails.
    async fn save_image(&self, timestamp: i64, image: &str) -> Option<u32>;

    /// Raw bytes of `{index}.png`.
    async fn get_image(&self, timestamp: i64, index: u32) -> Option<Vec<u8>>;

    /// `{index}.png` encoded as a `data:image/png;base64,` URL.
    async fn get_image_data_url(&self, timestamp: i64, index: u32) -> Option<String>;

    /// Removes one image file. Its index is never handed out again.
    async fn delete_image(&self, timestamp: i64, index: u32) -> bool;

    /// Best-effort removal of every image of a conversation.
    async fn delete_all_images(&self, timestamp: i64);
}
