//! Derived per-conversation metadata.

use super::model::Conversation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Title shown until a generated one arrives.
pub const PLACEHOLDER_TITLE: &str = "New Conversation";

/// Cheap-to-read view of a conversation for list rendering.
///
/// Never authoritative: counts can always be recomputed from the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub title: String,
    pub image_count: usize,
    pub entry_count: usize,
    pub created: i64,
    pub updated: i64,
}

impl ConversationSummary {
    /// Fresh summary with the placeholder title and zero counts.
    pub fn initial(timestamp: i64) -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            image_count: 0,
            entry_count: 0,
            created: timestamp,
            updated: timestamp,
        }
    }

    /// Refreshes counts from the live record, keeping `title` and `created`.
    pub fn refresh_counts(&mut self, conversation: &Conversation) {
        self.image_count = conversation.image_count();
        self.entry_count = conversation.entries.len();
    }
}

/// Keeps summaries eventually consistent with the repository.
///
/// Calling [`SummaryCache::recompute`] redundantly is always safe: the result
/// only differs in `updated`.
#[async_trait]
pub trait SummaryCache: Send + Sync {
    /// Writes the initial summary for a conversation.
    async fn initialize(&self, timestamp: i64) -> Option<ConversationSummary>;

    /// Recomputes counts from the stored conversation, replaces the title when
    /// one is given, stamps `updated`, and persists the result.
    ///
    /// Returns `None` if the conversation does not exist.
    async fn recompute(&self, timestamp: i64, title: Option<String>)
    -> Option<ConversationSummary>;

    /// Reads the cached summary without touching it.
    async fn get(&self, timestamp: i64) -> Option<ConversationSummary>;
}
