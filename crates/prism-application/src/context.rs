//! State shared between the orchestrator and its background tasks.

use prism_core::conversation::{
    Conversation, ConversationRepository, ConversationSummary, SummaryCache,
};
use prism_core::generation::{ChatTurn, RenderSink};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The conversation on screen and the model context built up for it.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub current: Option<Conversation>,
    pub history: Vec<ChatTurn>,
}

impl SessionState {
    pub fn is_current(&self, timestamp: i64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.timestamp == timestamp)
    }

    pub fn show(&mut self, conversation: Conversation) {
        self.history = conversation.history();
        self.current = Some(conversation);
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.history.clear();
    }
}

pub(crate) struct SessionContext {
    pub repository: Arc<dyn ConversationRepository>,
    pub summaries: Arc<dyn SummaryCache>,
    pub sink: Arc<dyn RenderSink>,
    /// Every write of a conversation record happens while holding this lock.
    pub state: Mutex<SessionState>,
    /// Makes summary read-modify-write cycles atomic with respect to each other.
    summary_lock: Mutex<()>,
}

impl SessionContext {
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        summaries: Arc<dyn SummaryCache>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            repository,
            summaries,
            sink,
            state: Mutex::new(SessionState::default()),
            summary_lock: Mutex::new(()),
        }
    }

    /// Applies `mutate` to a conversation and persists the whole record.
    ///
    /// The in-memory copy is used when the conversation is on screen (and the
    /// screen is re-rendered); otherwise the stored record is loaded. Returns
    /// `None` when the conversation no longer exists.
    pub async fn update_conversation<F, R>(
        &self,
        timestamp: i64,
        mutate: F,
    ) -> Option<(Conversation, R)>
    where
        F: FnOnce(&mut Conversation) -> R,
    {
        let mut state = self.state.lock().await;
        if let Some(current) = state.current.as_mut().filter(|c| c.timestamp == timestamp) {
            let output = mutate(current);
            let snapshot = current.clone();
            self.persist(&snapshot).await;
            self.sink.on_entry_finalized(&snapshot);
            return Some((snapshot, output));
        }

        let mut conversation = self.repository.load(timestamp).await?;
        let output = mutate(&mut conversation);
        self.persist(&conversation).await;
        Some((conversation, output))
    }

    /// Saves `conversation` without any in-flight placeholder.
    async fn persist(&self, conversation: &Conversation) {
        let mut stored = conversation.clone();
        stored.entries.retain(|entry| !entry.is_pending());
        if !self.repository.save(conversation.timestamp, &stored).await {
            tracing::error!(
                timestamp = conversation.timestamp,
                "Conversation could not be persisted"
            );
        }
    }

    pub async fn initialize_summary(&self, timestamp: i64) -> Option<ConversationSummary> {
        let _guard = self.summary_lock.lock().await;
        self.summaries.initialize(timestamp).await
    }

    pub async fn recompute_summary(
        &self,
        timestamp: i64,
        title: Option<String>,
    ) -> Option<ConversationSummary> {
        let _guard = self.summary_lock.lock().await;
        self.summaries.recompute(timestamp, title).await
    }
}
