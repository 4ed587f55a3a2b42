//! CLI channel — prints questions to stdout.
//!
//! Lets the binary run without chat credentials: questions are printed,
//! answers come back as lines the main loop converts into
//! `InboundMessage`s on the same channel name.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::channels::{MessageRef, NotificationChannel};
use crate::error::ChannelError;

/// Channel name used for CLI messages.
pub const CLI_CHANNEL: &str = "cli";

pub struct CliChannel {
    counter: AtomicU64,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationChannel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn send(&self, channel: &str, text: &str) -> Result<MessageRef, ChannelError> {
        println!("[{channel}] {text}");
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(MessageRef {
            channel: channel.to_string(),
            message_id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn message_ids_are_monotonic() {
        let ch = CliChannel::new();
        let a = ch.send(CLI_CHANNEL, "one").await.unwrap();
        let b = ch.send(CLI_CHANNEL, "two").await.unwrap();
        assert_eq!(a.channel, CLI_CHANNEL);
        assert_ne!(a.message_id, b.message_id);
    }
}
