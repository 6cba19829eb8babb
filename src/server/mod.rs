//! Webhook Server
//!
//! Endpoints:
//! - GET  /         health check
//! - GET  /webhook  subscription verification handshake
//! - POST /webhook  messaging events; acknowledged at once, processed in the background

pub mod events;
pub mod pipeline;

use crate::channels::Channel;
use crate::core::llm::ReplyGenerator;
use crate::relay::Relay;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use events::WebhookPayload;
use serde::Deserialize;
use std::sync::Arc;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub channel: Arc<dyn Channel>,
    pub generator: Arc<dyn ReplyGenerator>,
    pub verify_token: String,
    pub bot_metadata: String,
    pub fallback_reply: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/webhook", get(verify_webhook).post(receive_events))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "Switchboard is running. Status: OK"
}

async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> (StatusCode, String) {
    let (Some(mode), Some(token)) = (params.mode, params.verify_token) else {
        return (StatusCode::BAD_REQUEST, String::new());
    };

    if mode == "subscribe" && !state.verify_token.is_empty() && token == state.verify_token {
        tracing::info!("Webhook verified successfully");
        (StatusCode::OK, params.challenge.unwrap_or_default())
    } else {
        tracing::warn!("Webhook verification failed: invalid token");
        (StatusCode::FORBIDDEN, String::new())
    }
}

async fn receive_events(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    if payload.object != "page" {
        return (StatusCode::NOT_FOUND, "");
    }

    // The platform expects a quick acknowledgement; replies can take seconds.
    tokio::spawn(async move {
        for entry in &payload.entry {
            for event in &entry.messaging {
                pipeline::dispatch_event(&state, event).await;
            }
        }
    });

    (StatusCode::OK, "EVENT_RECEIVED")
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("Webhook server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Webhook server shutting down gracefully");
        })
        .await?;
    Ok(())
}
