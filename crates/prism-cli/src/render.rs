//! Terminal rendering of orchestrator events.

use colored::Colorize;
use prism_core::conversation::{Conversation, ConversationSummary, PLACEHOLDER_TITLE};
use prism_core::generation::{Balance, RenderSink};

/// Prints progress to stderr so stdout stays usable for piping.
pub struct TerminalRenderSink;

impl RenderSink for TerminalRenderSink {
    fn on_placeholder_created(&self, conversation: &Conversation) {
        eprintln!(
            "{} entry #{} in conversation {}",
            "⏳ Generating".bright_cyan(),
            conversation.entries.len().saturating_sub(1),
            conversation.timestamp
        );
    }

    fn on_entry_finalized(&self, conversation: &Conversation) {
        tracing::debug!(
            timestamp = conversation.timestamp,
            entries = conversation.entries.len(),
            "Conversation updated"
        );
    }

    fn on_summary_updated(&self, timestamp: i64, summary: &ConversationSummary) {
        if summary.title != PLACEHOLDER_TITLE {
            eprintln!("{} {} ({})", "📝".dimmed(), summary.title.bold(), timestamp);
        }
    }

    fn on_error(&self, message: &str) {
        print_error(message);
    }

    fn on_balance_updated(&self, balance: &Balance) {
        eprintln!("{} ${:.4} remaining", "💳".dimmed(), balance.remaining());
    }
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Keeps the last four characters of a secret.
pub fn mask_secret(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = value.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-or-v1-abcd1234"), "*************1234");
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret(""), "");
    }
}
