//! Conversation domain model.
//!
//! The serialized form of [`Conversation`] is the `conversation.json` record;
//! field names are camelCase on disk.

use crate::generation::{ChatRole, ChatTurn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Filename marking an entry whose generation is still in flight.
pub const GENERATING_SENTINEL: &str = "generating";

/// Output resolution requested from the image model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    #[strum(serialize = "1K")]
    OneK,
    #[serde(rename = "2K")]
    #[strum(serialize = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    #[strum(serialize = "4K")]
    FourK,
}

/// A conversation: ordered generation rounds, identified by its creation second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub entries: Vec<ConversationEntry>,
}

impl Conversation {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            entries: Vec::new(),
        }
    }

    /// Number of stored images across all finalized entries.
    pub fn image_count(&self) -> usize {
        self.entries.iter().map(ConversationEntry::image_count).sum()
    }

    /// Role-tagged model context rebuilt from finalized entries.
    pub fn history(&self) -> Vec<ChatTurn> {
        let mut turns = Vec::with_capacity(self.entries.len() * 2);
        for entry in self.entries.iter().filter(|e| !e.is_pending()) {
            turns.push(ChatTurn::new(ChatRole::User, entry.message.text.clone()));
            if let Some(text) = entry.response.text.as_deref() {
                if !text.trim().is_empty() {
                    turns.push(ChatTurn::new(ChatRole::Assistant, text));
                }
            }
        }
        turns
    }
}

/// One generation round: the user's request and what came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub message: EntryMessage,
    pub response: EntryResponse,
}

impl ConversationEntry {
    /// Optimistic entry shown while the remote call is in flight.
    pub fn placeholder(message: EntryMessage, resolution: Resolution) -> Self {
        Self {
            message,
            response: EntryResponse {
                text: None,
                image_filenames: vec![GENERATING_SENTINEL.to_string()],
                image_resolutions: vec![resolution],
                response_data: None,
                generation_data: None,
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        self.response.image_filenames.len() == 1
            && self.response.image_filenames[0] == GENERATING_SENTINEL
    }

    pub fn image_count(&self) -> usize {
        if self.is_pending() {
            0
        } else {
            self.response.image_filenames.len()
        }
    }

    /// Image indices of this entry, skipping names that are not numeric.
    pub fn image_indices(&self) -> Vec<u32> {
        self.response
            .image_filenames
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect()
    }

    /// Generation id reported by the API for this round, if recorded.
    pub fn generation_id(&self) -> Option<&str> {
        self.response
            .response_data
            .as_ref()
            .and_then(|data| data.get("id"))
            .and_then(Value::as_str)
    }

    /// Appends a stored image and its resolution, keeping the arrays parallel.
    pub fn push_image(&mut self, index: u32, resolution: Resolution) {
        self.response.image_filenames.push(index.to_string());
        self.response.image_resolutions.push(resolution);
    }

    /// Removes the image at `position` from both parallel arrays.
    pub fn remove_image_at(&mut self, position: usize) -> Option<(String, Resolution)> {
        if position >= self.response.image_filenames.len() {
            return None;
        }
        let filename = self.response.image_filenames.remove(position);
        let resolution = if position < self.response.image_resolutions.len() {
            self.response.image_resolutions.remove(position)
        } else {
            Resolution::default()
        };
        Some((filename, resolution))
    }
}

/// The user turn and the exact parameters used to generate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMessage {
    #[serde(default)]
    pub system_prompt: String,
    pub text: String,
    #[serde(default)]
    pub seed: Option<i64>,
}

/// What the model returned for one entry.
///
/// `image_filenames` and `image_resolutions` are parallel arrays.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_filenames: Vec<String>,
    #[serde(default)]
    pub image_resolutions: Vec<Resolution>,
    #[serde(default)]
    pub response_data: Option<Value>,
    #[serde(default)]
    pub generation_data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn message(text: &str) -> EntryMessage {
        EntryMessage {
            system_prompt: String::new(),
            text: text.to_string(),
            seed: Some(42),
        }
    }

    #[test]
    fn test_resolution_string_forms() {
        assert_eq!(Resolution::TwoK.to_string(), "2K");
        assert_eq!(Resolution::from_str("4k").unwrap(), Resolution::FourK);
        assert!(Resolution::from_str("8K").is_err());
        assert_eq!(serde_json::to_string(&Resolution::OneK).unwrap(), "\"1K\"");
    }

    #[test]
    fn test_placeholder_shape() {
        let entry = ConversationEntry::placeholder(message("a cat"), Resolution::TwoK);
        assert!(entry.is_pending());
        assert_eq!(entry.response.image_filenames, vec![GENERATING_SENTINEL]);
        assert_eq!(entry.response.image_resolutions, vec![Resolution::TwoK]);
        assert!(entry.response.text.is_none());
        assert!(entry.response.response_data.is_none());
        assert!(entry.response.generation_data.is_none());
        assert_eq!(entry.image_count(), 0);
    }

    #[test]
    fn test_serialized_field_names_are_camel_case() {
        let mut entry = ConversationEntry::placeholder(message("a cat"), Resolution::OneK);
        entry.response.image_filenames = vec!["1".to_string()];
        let conversation = Conversation {
            timestamp: 1000,
            entries: vec![entry],
        };
        let json = serde_json::to_value(&conversation).unwrap();
        let entry = &json["entries"][0];
        assert_eq!(entry["message"]["systemPrompt"], "");
        assert_eq!(entry["message"]["seed"], 42);
        assert_eq!(entry["response"]["imageFilenames"][0], "1");
        assert_eq!(entry["response"]["imageResolutions"][0], "1K");
        assert!(entry["response"]["generationData"].is_null());
    }

    #[test]
    fn test_history_skips_pending_and_empty_text() {
        let mut done = ConversationEntry::placeholder(message("a cat"), Resolution::OneK);
        done.response.image_filenames = vec!["1".to_string()];
        done.response.text = Some("Here is your cat".to_string());
        let mut silent = ConversationEntry::placeholder(message("a dog"), Resolution::OneK);
        silent.response.image_filenames = vec!["2".to_string()];
        let pending = ConversationEntry::placeholder(message("a bird"), Resolution::OneK);

        let conversation = Conversation {
            timestamp: 1,
            entries: vec![done, silent, pending],
        };
        let history = conversation.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], ChatTurn::new(ChatRole::User, "a cat"));
        assert_eq!(history[1], ChatTurn::new(ChatRole::Assistant, "Here is your cat"));
        assert_eq!(history[2], ChatTurn::new(ChatRole::User, "a dog"));
        assert_eq!(conversation.image_count(), 2);
    }

    #[test]
    fn test_remove_image_keeps_arrays_parallel() {
        let mut entry = ConversationEntry::placeholder(message("a cat"), Resolution::OneK);
        entry.response.image_filenames.clear();
        entry.response.image_resolutions.clear();
        entry.push_image(1, Resolution::OneK);
        entry.push_image(2, Resolution::FourK);

        let removed = entry.remove_image_at(0).unwrap();
        assert_eq!(removed, ("1".to_string(), Resolution::OneK));
        assert_eq!(entry.response.image_filenames, vec!["2"]);
        assert_eq!(entry.response.image_resolutions, vec![Resolution::FourK]);
        assert!(entry.remove_image_at(5).is_none());
        assert_eq!(entry.image_indices(), vec![2]);
    }
}
