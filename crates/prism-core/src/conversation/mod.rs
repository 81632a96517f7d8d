//! Conversation domain: the record model, its repository, and the derived summary.

mod model;
mod repository;
mod summary;

pub use model::{
    Conversation, ConversationEntry, EntryMessage, EntryResponse, GENERATING_SENTINEL, Resolution,
};
pub use repository::ConversationRepository;
pub use summary::{ConversationSummary, PLACEHOLDER_TITLE, SummaryCache};
