//! Composition root
//!
//! Wires settings and secrets into the relay, its collaborators and the
//! background tasks. Each `System` owns its own stores, so tests and tools can
//! run independent instances side by side.

use crate::channels::{Channel, MessengerClient};
use crate::config::{Secrets, Settings};
use crate::core::llm::{LLMClient, ReplyGenerator};
use crate::knowledge::{KnowledgeCache, KnowledgeSource, SheetsSource};
use crate::relay::{Relay, RelayConfig};
use crate::server::AppState;
use crate::sweeper::{IdleSweeperHandle, NotifierHandle};
use std::sync::Arc;

pub struct System {
    relay: Arc<Relay>,
    notifier: NotifierHandle,
    sweeper: IdleSweeperHandle,
    state: AppState,
}

impl System {
    /// Build against the real platform, spreadsheet and generation APIs.
    pub fn new(settings: &Settings, secrets: &Secrets) -> Self {
        let source = Arc::new(SheetsSource::from_config(
            &settings.knowledge,
            secrets.spreadsheet_id.clone(),
            secrets.sheets_api_key.clone(),
        ));
        let channel = Arc::new(MessengerClient::new(
            &settings.messenger,
            secrets.page_access_token.clone(),
        ));
        let generator = Arc::new(LLMClient::new(
            secrets.gemini_api_key.clone(),
            settings.llm.clone(),
        ));

        Self::with_collaborators(
            settings,
            secrets.verify_token.clone(),
            source,
            channel,
            generator,
        )
    }

    /// Build with explicit collaborators. Must be called inside a tokio runtime.
    pub fn with_collaborators(
        settings: &Settings,
        verify_token: String,
        source: Arc<dyn KnowledgeSource>,
        channel: Arc<dyn Channel>,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        let cache = Arc::new(KnowledgeCache::new(
            source,
            settings.knowledge.ttl(),
            settings.knowledge.fetch_timeout(),
        ));
        let relay = Arc::new(Relay::new(RelayConfig::from_settings(settings), cache));

        let buffer_size = settings.system.channel_buffer_size;
        let notifier = NotifierHandle::new(
            Arc::clone(&channel),
            settings.handover.resume_notice.clone(),
            buffer_size,
        );
        let sweeper = IdleSweeperHandle::new(
            Arc::clone(&relay),
            notifier.clone(),
            settings.handover.sweep_interval(),
            buffer_size,
        );

        let state = AppState {
            relay: Arc::clone(&relay),
            channel,
            generator,
            verify_token,
            bot_metadata: settings.messenger.bot_metadata.clone(),
            fallback_reply: settings.llm.fallback_reply.clone(),
        };

        tracing::info!("Switchboard system initialized");
        Self {
            relay,
            notifier,
            sweeper,
            state,
        }
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn sweeper(&self) -> &IdleSweeperHandle {
        &self.sweeper
    }

    pub fn app_state(&self) -> AppState {
        self.state.clone()
    }

    /// Stop the background tasks.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.sweeper.shutdown().await?;
        self.notifier.shutdown().await?;
        tracing::info!("Switchboard system shutdown complete");
        Ok(())
    }
}
