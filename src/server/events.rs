//! Webhook payload types and event classification

use crate::handover::ConversationId;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
    pub sender: Participant,
    pub recipient: Participant,
    #[serde(default)]
    pub message: Option<InboundMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub is_echo: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Echo of a message the bot itself sent.
    BotEcho,
    /// A human operator wrote from the page. Echoes are addressed to the user,
    /// so the conversation is the recipient.
    Operator {
        conversation: ConversationId,
        text: Option<String>,
    },
    User {
        conversation: ConversationId,
        text: String,
    },
    /// Deliveries, reads, stickers and anything else without text.
    Ignored,
}

impl MessagingEvent {
    pub fn classify(&self, bot_metadata: &str) -> InboundEvent {
        let Some(message) = &self.message else {
            return InboundEvent::Ignored;
        };

        if message.is_echo {
            if message.metadata.as_deref() == Some(bot_metadata) {
                return InboundEvent::BotEcho;
            }
            return InboundEvent::Operator {
                conversation: ConversationId::new(self.recipient.id.clone()),
                text: message.text.clone(),
            };
        }

        match &message.text {
            Some(text) if !text.trim().is_empty() => InboundEvent::User {
                conversation: ConversationId::new(self.sender.id.clone()),
                text: text.clone(),
            },
            _ => InboundEvent::Ignored,
        }
    }
}
