//! Notifications from the orchestrator to whatever draws the screen.

use super::api::Balance;
use crate::conversation::{Conversation, ConversationSummary};

/// Synchronous callbacks driven by the orchestrator's state transitions.
pub trait RenderSink: Send + Sync {
    /// A placeholder entry was appended to the current conversation.
    fn on_placeholder_created(&self, conversation: &Conversation);

    /// An entry was finalized, removed, or otherwise changed in place.
    fn on_entry_finalized(&self, conversation: &Conversation);

    /// A conversation's list item (title, date, counts) changed.
    fn on_summary_updated(&self, timestamp: i64, summary: &ConversationSummary);

    /// A user-visible failure.
    fn on_error(&self, message: &str);

    /// The set of conversations changed and the list should be rebuilt.
    fn on_conversations_changed(&self) {}

    /// Fresh account balance.
    fn on_balance_updated(&self, _balance: &Balance) {}
}

/// Sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderSink;

impl RenderSink for NullRenderSink {
    fn on_placeholder_created(&self, _conversation: &Conversation) {}
    fn on_entry_finalized(&self, _conversation: &Conversation) {}
    fn on_summary_updated(&self, _timestamp: i64, _summary: &ConversationSummary) {}
    fn on_error(&self, _message: &str) {}
}
