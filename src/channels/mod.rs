//! Outbound messaging
//!
//! Information Hiding:
//! - Platform wire format and authentication hidden behind `Channel`
//! - Lets the webhook pipeline and the sweeper run against test doubles

pub mod messenger;

use crate::error::DeliveryError;
use crate::handover::ConversationId;
use async_trait::async_trait;

pub use messenger::MessengerClient;

#[async_trait]
pub trait Channel: Send + Sync {
    /// Send an automated reply to the conversation.
    async fn send_reply(&self, conversation: &ConversationId, text: &str)
        -> Result<(), DeliveryError>;

    /// Show a "typing" indicator while a reply is being prepared.
    async fn send_typing(&self, _conversation: &ConversationId) -> Result<(), DeliveryError> {
        Ok(())
    }

    /// Out-of-band notice, such as "automation has resumed".
    async fn deliver_notification(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.send_reply(conversation, text).await
    }
}
