//! Per-event processing behind the webhook

use super::events::{InboundEvent, MessagingEvent};
use super::AppState;
use crate::handover::ConversationId;
use tokio::time::Instant;

pub async fn dispatch_event(state: &AppState, event: &MessagingEvent) {
    match event.classify(&state.bot_metadata) {
        InboundEvent::BotEcho => {
            tracing::debug!(conversation = %event.recipient.id, "Bot echo, skipping");
        }
        InboundEvent::Operator { conversation, text } => {
            let resume = text
                .as_deref()
                .is_some_and(|text| state.relay.is_resume_phrase(text));
            if resume {
                state.relay.handle_explicit_resume(&conversation).await;
            } else {
                state
                    .relay
                    .handle_incoming_operator_message(&conversation, Instant::now())
                    .await;
            }
        }
        InboundEvent::User { conversation, text } => {
            handle_user_text(state, &conversation, &text).await;
        }
        InboundEvent::Ignored => {}
    }
}

async fn handle_user_text(state: &AppState, conversation: &ConversationId, text: &str) {
    if state.relay.is_resume_phrase(text) {
        state.relay.handle_explicit_resume(conversation).await;
    }

    let outcome = state
        .relay
        .handle_incoming_user_message(conversation, text, Instant::now())
        .await;
    if !outcome.should_auto_reply {
        return;
    }

    if let Err(e) = state.channel.send_typing(conversation).await {
        tracing::debug!(conversation = %conversation, "Typing indicator failed: {}", e);
    }

    match state
        .generator
        .generate_reply(text, &outcome.context_rows, &outcome.history_snapshot)
        .await
    {
        Ok(reply) => match state.channel.send_reply(conversation, &reply).await {
            Ok(()) => state.relay.record_reply(conversation, reply).await,
            Err(e) => {
                tracing::warn!(conversation = %conversation, "Failed to send reply: {}", e);
            }
        },
        Err(e) => {
            tracing::error!(conversation = %conversation, "Reply generation failed: {}", e);
            if let Err(e) = state
                .channel
                .send_reply(conversation, &state.fallback_reply)
                .await
            {
                tracing::warn!(conversation = %conversation, "Failed to send apology: {}", e);
            }
        }
    }
}
