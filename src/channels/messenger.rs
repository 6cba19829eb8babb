//! Page messaging Send API client
//!
//! Every message the bot sends carries the configured metadata tag. The
//! platform echoes page messages back through the webhook, and the tag is how
//! the bot's own echoes are told apart from a human operator's.

use super::Channel;
use crate::config::settings::MessengerConfig;
use crate::error::DeliveryError;
use crate::handover::ConversationId;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct OutboundText<'a> {
    text: &'a str,
    metadata: &'a str,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    messaging_type: &'static str,
    recipient: Recipient<'a>,
    message: OutboundText<'a>,
}

#[derive(Debug, Serialize)]
struct SenderActionRequest<'a> {
    recipient: Recipient<'a>,
    sender_action: &'static str,
}

pub struct MessengerClient {
    client: Client,
    graph_url: String,
    access_token: String,
    bot_metadata: String,
    max_message_chars: usize,
}

impl MessengerClient {
    pub fn new(config: &MessengerConfig, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            graph_url: config.graph_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            bot_metadata: config.bot_metadata.clone(),
            max_message_chars: config.max_message_chars,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/me/messages", self.graph_url)
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), DeliveryError> {
        if self.access_token.is_empty() {
            return Err(DeliveryError::MissingToken);
        }

        let response = self
            .client
            .post(self.messages_url())
            .query(&[("access_token", self.access_token.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for MessengerClient {
    async fn send_reply(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        if text.is_empty() {
            return Ok(());
        }

        let text = truncate_chars(text, self.max_message_chars);
        let request = SendRequest {
            messaging_type: "RESPONSE",
            recipient: Recipient {
                id: conversation.as_str(),
            },
            message: OutboundText {
                text,
                metadata: &self.bot_metadata,
            },
        };

        self.post(&request).await?;
        tracing::info!(conversation = %conversation, "[Messenger] Sent message");
        Ok(())
    }

    async fn send_typing(&self, conversation: &ConversationId) -> Result<(), DeliveryError> {
        let request = SenderActionRequest {
            recipient: Recipient {
                id: conversation.as_str(),
            },
            sender_action: "typing_on",
        };
        self.post(&request).await
    }
}

/// Longest prefix of `text` with at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
