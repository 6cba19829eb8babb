//! Idle Sweeper and resumption notifier
//!
//! Two background tasks, each owned through a handle:
//! - the sweeper wakes on a fixed interval, reverts human-held conversations
//!   whose operator went idle, and queues a notice for each
//! - the notifier drains that queue and delivers the notices; a failed
//!   delivery is logged and the next notice is attempted

use crate::channels::Channel;
use crate::handover::ConversationId;
use crate::relay::Relay;
use std::sync::Arc;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

#[derive(Debug)]
pub struct ResumptionNotice {
    pub conversation: ConversationId,
}

#[derive(Debug)]
pub enum NotifierMessage {
    Notify(ResumptionNotice),
    Shutdown,
}

#[derive(Clone)]
pub struct NotifierHandle {
    sender: Sender<NotifierMessage>,
}

impl NotifierHandle {
    pub fn new(channel_impl: Arc<dyn Channel>, notice_text: String, buffer_size: usize) -> Self {
        let (sender, receiver) = channel(buffer_size);
        tokio::spawn(notifier_actor(receiver, channel_impl, notice_text));
        Self { sender }
    }

    pub async fn enqueue(&self, conversation: ConversationId) -> anyhow::Result<()> {
        self.sender
            .send(NotifierMessage::Notify(ResumptionNotice { conversation }))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to queue resumption notice: {}", e))
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.sender
            .send(NotifierMessage::Shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send shutdown to notifier: {}", e))
    }
}

async fn notifier_actor(
    mut receiver: Receiver<NotifierMessage>,
    channel_impl: Arc<dyn Channel>,
    notice_text: String,
) {
    tracing::info!("Notifier actor started");

    while let Some(message) = receiver.recv().await {
        match message {
            NotifierMessage::Notify(notice) => {
                match channel_impl
                    .deliver_notification(&notice.conversation, &notice_text)
                    .await
                {
                    Ok(()) => tracing::debug!(
                        conversation = %notice.conversation,
                        "Resumption notice delivered"
                    ),
                    Err(e) => tracing::warn!(
                        conversation = %notice.conversation,
                        "Failed to deliver resumption notice: {}",
                        e
                    ),
                }
            }
            NotifierMessage::Shutdown => {
                tracing::info!("Notifier received shutdown signal");
                break;
            }
        }
    }
}

#[derive(Debug)]
pub enum SweeperMessage {
    /// Run a sweep immediately and report which conversations were reverted.
    SweepNow(oneshot::Sender<Vec<ConversationId>>),
    Shutdown,
}

pub struct IdleSweeperHandle {
    sender: Sender<SweeperMessage>,
}

impl IdleSweeperHandle {
    pub fn new(
        relay: Arc<Relay>,
        notifier: NotifierHandle,
        sweep_interval: Duration,
        buffer_size: usize,
    ) -> Self {
        let (sender, receiver) = channel(buffer_size);
        tokio::spawn(sweeper_actor(receiver, relay, notifier, sweep_interval));
        Self { sender }
    }

    pub async fn sweep_now(&self) -> anyhow::Result<Vec<ConversationId>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(SweeperMessage::SweepNow(response_tx))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send message to sweeper: {}", e))?;
        response_rx
            .await
            .map_err(|e| anyhow::anyhow!("Failed to receive sweep result: {}", e))
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.sender
            .send(SweeperMessage::Shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send shutdown to sweeper: {}", e))
    }
}

async fn sweeper_actor(
    mut receiver: Receiver<SweeperMessage>,
    relay: Arc<Relay>,
    notifier: NotifierHandle,
    sweep_interval: Duration,
) {
    tracing::info!("Idle sweeper started (interval {:?})", sweep_interval);

    // First sweep one interval after start; nothing can have expired before that.
    let mut ticker = interval_at(Instant::now() + sweep_interval, sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&relay, &notifier).await;
            }
            message = receiver.recv() => match message {
                Some(SweeperMessage::SweepNow(response_tx)) => {
                    let reverted = sweep(&relay, &notifier).await;
                    let _ = response_tx.send(reverted);
                }
                Some(SweeperMessage::Shutdown) => {
                    tracing::info!("Idle sweeper received shutdown signal");
                    break;
                }
                None => {
                    tracing::info!("Idle sweeper channel closed");
                    break;
                }
            }
        }
    }
}

async fn sweep(relay: &Relay, notifier: &NotifierHandle) -> Vec<ConversationId> {
    let reverted = relay.run_idle_sweep_tick(Instant::now()).await;
    if !reverted.is_empty() {
        tracing::info!("Idle sweep reverted {} conversation(s)", reverted.len());
    }
    for conversation in &reverted {
        if let Err(e) = notifier.enqueue(conversation.clone()).await {
            tracing::error!(conversation = %conversation, "{}", e);
        }
    }
    reverted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeliveryError, FetchError};
    use crate::knowledge::{KnowledgeCache, KnowledgeRow, KnowledgeSource};
    use crate::relay::RelayConfig;
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedSender;

    struct EmptySource;

    #[async_trait]
    impl KnowledgeSource for EmptySource {
        async fn fetch_rows(&self) -> Result<Vec<KnowledgeRow>, FetchError> {
            Ok(Vec::new())
        }
    }

    /// Reports every delivery attempt; fails for the conversation named `broken`.
    struct RecordingChannel {
        attempts: UnboundedSender<(String, String)>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        async fn send_reply(
            &self,
            conversation: &ConversationId,
            text: &str,
        ) -> Result<(), DeliveryError> {
            let _ = self
                .attempts
                .send((conversation.to_string(), text.to_string()));
            if conversation.as_str() == "broken" {
                return Err(DeliveryError::MissingToken);
            }
            Ok(())
        }
    }

    fn relay() -> Arc<Relay> {
        let cache = Arc::new(KnowledgeCache::new(
            Arc::new(EmptySource),
            Duration::from_secs(300),
            Duration::from_secs(5),
        ));
        Arc::new(Relay::new(
            RelayConfig {
                idle_timeout: Duration::from_secs(60),
                ..RelayConfig::default()
            },
            cache,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_reverts_and_notifies() {
        let relay = relay();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let notifier = NotifierHandle::new(
            Arc::new(RecordingChannel { attempts: tx }),
            "bot is back".to_string(),
            16,
        );

        let id = ConversationId::new("user-1");
        relay.handle_incoming_operator_message(&id, Instant::now()).await;

        let sweeper = IdleSweeperHandle::new(
            Arc::clone(&relay),
            notifier.clone(),
            Duration::from_secs(60),
            16,
        );

        let (conversation, text) = tokio::time::timeout(Duration::from_secs(300), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation, "user-1");
        assert_eq!(text, "bot is back");

        // Only one notice for one reversion
        assert!(sweeper.sweep_now().await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        sweeper.shutdown().await.unwrap();
        notifier.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_does_not_stop_notices() {
        let relay = relay();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let notifier = NotifierHandle::new(
            Arc::new(RecordingChannel { attempts: tx }),
            "bot is back".to_string(),
            16,
        );
        let sweeper = IdleSweeperHandle::new(
            Arc::clone(&relay),
            notifier.clone(),
            Duration::from_secs(3600),
            16,
        );

        let t0 = Instant::now();
        relay.handle_incoming_operator_message(&"broken".into(), t0).await;
        relay.handle_incoming_operator_message(&"healthy".into(), t0).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let mut reverted = sweeper.sweep_now().await.unwrap();
        reverted.sort();
        assert_eq!(reverted, vec![ConversationId::new("broken"), ConversationId::new("healthy")]);

        let mut delivered = vec![rx.recv().await.unwrap().0, rx.recv().await.unwrap().0];
        delivered.sort();
        assert_eq!(delivered, vec!["broken", "healthy"]);

        sweeper.shutdown().await.unwrap();
    }
}
