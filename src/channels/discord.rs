//! Discord channel — posts messages through the REST API.
//!
//! Outbound only: the inbound gateway (websocket) is run by the host
//! process, which feeds replies into the orchestrator as
//! `InboundMessage`s.

use async_trait::async_trait;
use serde::Deserialize;

use crate::channels::{split_message, MessageRef, NotificationChannel};
use crate::error::ChannelError;

/// Maximum message length for Discord's create-message API.
const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

/// Discord channel adapter.
pub struct DiscordChannel {
    bot_token: String,
    client: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
}

impl DiscordChannel {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            api_base: "https://discord.com/api/v10".to_string(),
        }
    }

    /// Override the API base (for tests against a local stub).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn send_chunk(&self, channel: &str, text: &str) -> Result<MessageRef, ChannelError> {
        let url = format!("{}/channels/{channel}/messages", self.api_base);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "discord".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "discord".into(),
                reason: format!("createMessage returned {status}: {body}"),
            });
        }

        let created: CreatedMessage = resp.json().await.map_err(|e| ChannelError::SendFailed {
            name: "discord".into(),
            reason: format!("bad createMessage response: {e}"),
        })?;

        Ok(MessageRef {
            channel: channel.to_string(),
            message_id: created.id,
        })
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, channel: &str, text: &str) -> Result<MessageRef, ChannelError> {
        let chunks = split_message(text, DISCORD_MAX_MESSAGE_LENGTH);

        // The last chunk's id is the one replies land on.
        let mut last = None;
        for chunk in &chunks {
            last = Some(self.send_chunk(channel, chunk).await?);
        }
        last.ok_or_else(|| ChannelError::InvalidMessage("empty message".into()))
    }
}
