//! Notification channel abstraction.
//!
//! The orchestrator asks humans questions through a `NotificationChannel`
//! and receives their replies as `InboundMessage`s from whatever gateway
//! the host process runs (Discord bot, CLI loop, ...).

pub mod cli;
pub mod discord;

pub use cli::{CliChannel, CLI_CHANNEL};
pub use discord::DiscordChannel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Reference to a message the channel created (the prompt we asked).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// Channel the message was posted in.
    pub channel: String,
    /// Channel-native message id.
    pub message_id: String,
}

/// A chat message arriving from a human.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Channel the message arrived on.
    pub channel: String,
    /// Author identity (the channel's user id).
    pub author_id: String,
    /// Message text.
    pub content: String,
    /// Message id this is a direct reply to, if any.
    pub reply_to: Option<String>,
    /// For thread messages: the channel the thread was opened from.
    pub thread_parent: Option<String>,
}

/// Trait for outbound notification adapters — pure I/O, no session logic.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel adapter name (e.g. "discord", "cli").
    fn name(&self) -> &str;

    /// Post `text` to `channel`, returning a reference to the created message.
    async fn send(&self, channel: &str, text: &str) -> Result<MessageRef, ChannelError>;
}

/// Split a message into chunks no longer than `max_len` characters,
/// preferring line boundaries.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        // A single oversized line gets hard-split at char boundaries.
        if line.chars().count() > max_len {
            let mut buf = String::new();
            for c in line.chars() {
                if buf.chars().count() == max_len {
                    chunks.push(std::mem::take(&mut buf));
                }
                buf.push(c);
            }
            current = buf;
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_short_message_unchanged() {
        assert_eq!(split_message("hello", 100), vec!["hello"]);
    }

    #[test]
    fn split_prefers_line_boundaries() {
        let text = "aaa\nbbb\nccc\n";
        let chunks = split_message(text, 8);
        assert_eq!(chunks, vec!["aaa\nbbb\n", "ccc\n"]);
    }

    #[test]
    fn split_hard_breaks_long_lines() {
        let text = "x".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn split_handles_multibyte() {
        let text = "héllo wörld ".repeat(10);
        for chunk in split_message(&text, 16) {
            assert!(chunk.chars().count() <= 16);
        }
    }
}
