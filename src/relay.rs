//! Relay core
//!
//! Information Hiding:
//! - Session lookup, handover transitions and context building hidden behind
//!   the four inbound operations
//! - No network I/O happens while a session lock is held; the only blocking
//!   call is the knowledge cache refresh

use crate::config::Settings;
use crate::handover::{ConversationId, SessionStore, Turn};
use crate::knowledge::{FallbackPolicy, KnowledgeCache, KnowledgeRow, Ranker};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub idle_timeout: Duration,
    pub history_capacity: usize,
    pub top_k: usize,
    pub min_token_chars: usize,
    pub fallback: FallbackPolicy,
    pub resume_keywords: Vec<String>,
}

impl RelayConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            idle_timeout: settings.handover.idle_timeout(),
            history_capacity: settings.handover.history_capacity,
            top_k: settings.knowledge.top_k,
            min_token_chars: settings.knowledge.min_token_chars,
            fallback: settings.knowledge.fallback,
            resume_keywords: settings.handover.resume_keywords.clone(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// What the caller needs to decide on, and produce, an automated reply.
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessageOutcome {
    pub should_auto_reply: bool,
    pub context_rows: Vec<KnowledgeRow>,
    /// History as it stood before this message.
    pub history_snapshot: Vec<Turn>,
}

impl UserMessageOutcome {
    fn silent() -> Self {
        Self {
            should_auto_reply: false,
            context_rows: Vec::new(),
            history_snapshot: Vec::new(),
        }
    }
}

pub struct Relay {
    store: SessionStore,
    cache: Arc<KnowledgeCache>,
    ranker: Ranker,
    top_k: usize,
    fallback: FallbackPolicy,
    resume_keywords: Vec<String>,
}

impl Relay {
    pub fn new(config: RelayConfig, cache: Arc<KnowledgeCache>) -> Self {
        Self {
            store: SessionStore::new(config.idle_timeout, config.history_capacity),
            cache,
            ranker: Ranker::new(config.min_token_chars),
            top_k: config.top_k,
            fallback: config.fallback,
            resume_keywords: config
                .resume_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<KnowledgeCache> {
        &self.cache
    }

    /// An end user wrote `text`. While automated, the user turn is recorded
    /// and grounding context is built; while human-held, the operator's
    /// window is renewed and nothing else happens.
    pub async fn handle_incoming_user_message(
        &self,
        id: &ConversationId,
        text: &str,
        now: Instant,
    ) -> UserMessageOutcome {
        let session = self.store.get_or_create(id).await;

        let history_snapshot = {
            let mut session = session.lock().await;
            if !session.handover_mut().is_automated(now) {
                session.handover_mut().on_user_activity(now);
                tracing::info!(conversation = %id, "[Relay] Human mode, skipping automated reply");
                return UserMessageOutcome::silent();
            }
            let snapshot = session.history().snapshot();
            session.record(Turn::user(text));
            snapshot
        };

        let rows = self.cache.get().await;
        let context_rows = self.build_context(text, &rows);
        tracing::info!(
            conversation = %id,
            "[Relay] Found {} context rows",
            context_rows.len()
        );

        UserMessageOutcome {
            should_auto_reply: true,
            context_rows,
            history_snapshot,
        }
    }

    /// An operator replied in the conversation: silence automation.
    pub async fn handle_incoming_operator_message(&self, id: &ConversationId, now: Instant) {
        let session = self.store.get_or_create(id).await;
        let mut session = session.lock().await;
        session.handover_mut().on_operator_message(now);
        tracing::info!(
            conversation = %id,
            deadline_in = ?session.handover().idle_timeout(),
            "[Relay] Operator took over"
        );
    }

    pub async fn handle_explicit_resume(&self, id: &ConversationId) {
        let session = self.store.get_or_create(id).await;
        session.lock().await.handover_mut().on_explicit_resume();
        tracing::info!(conversation = %id, "[Relay] Automation resumed on request");
    }

    /// Revert every human-held conversation whose deadline has passed.
    pub async fn run_idle_sweep_tick(&self, now: Instant) -> Vec<ConversationId> {
        let mut reverted = Vec::new();
        for (id, session) in self.store.all_sessions().await {
            if session.lock().await.handover_mut().check_and_maybe_revert(now) {
                tracing::info!(conversation = %id, "[Relay] Operator idle, automation resumed");
                reverted.push(id);
            }
        }
        reverted
    }

    /// Record the automated reply that was sent for the latest user turn.
    pub async fn record_reply(&self, id: &ConversationId, reply: impl Into<String>) {
        let session = self.store.get_or_create(id).await;
        session.lock().await.record(Turn::assistant(reply));
    }

    /// Whether `text` is one of the configured phrases that hand control back to automation.
    pub fn is_resume_phrase(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.resume_keywords.iter().any(|k| *k == text)
    }

    /// Ranked rows for `query`, or the configured fallback when nothing matches.
    /// This is the only place the fallback policy is applied.
    pub fn build_context(&self, query: &str, rows: &[KnowledgeRow]) -> Vec<KnowledgeRow> {
        let ranked = self.ranker.rank(query, rows, self.top_k);
        if ranked.is_empty() {
            tracing::debug!("[Relay] No row matched, applying {:?} fallback", self.fallback);
            return self.fallback.apply(rows, self.top_k);
        }
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::handover::{HandoverMode, Speaker};
    use crate::knowledge::KnowledgeSource;
    use async_trait::async_trait;

    const TIMEOUT: Duration = Duration::from_secs(60);

    struct StaticSource(Vec<&'static str>);

    #[async_trait]
    impl KnowledgeSource for StaticSource {
        async fn fetch_rows(&self) -> Result<Vec<KnowledgeRow>, FetchError> {
            Ok(self.0.iter().map(|t| KnowledgeRow::new(*t)).collect())
        }
    }

    fn relay_with(config: RelayConfig) -> Relay {
        let source = Arc::new(StaticSource(vec![
            "Topic: Office hours | Answer: 9-17",
            "Topic: Tuition fee | Answer: 40000",
            "Topic: Dormitory | Answer: available",
        ]));
        let cache = Arc::new(KnowledgeCache::new(
            source,
            Duration::from_secs(300),
            Duration::from_secs(5),
        ));
        Relay::new(config, cache)
    }

    fn relay() -> Relay {
        relay_with(RelayConfig {
            idle_timeout: TIMEOUT,
            ..RelayConfig::default()
        })
    }

    async fn mode(relay: &Relay, id: &ConversationId) -> HandoverMode {
        let session = relay.store().get_or_create(id).await;
        let mode = session.lock().await.handover().mode();
        mode
    }

    #[tokio::test]
    async fn test_automated_message_gets_context_and_history() {
        let relay = relay();
        let id = ConversationId::new("user-1");
        let now = Instant::now();

        let first = relay.handle_incoming_user_message(&id, "tuition fee?", now).await;
        assert!(first.should_auto_reply);
        assert_eq!(first.context_rows.len(), 1);
        assert!(first.context_rows[0].text().contains("40000"));
        assert!(first.history_snapshot.is_empty());

        relay.record_reply(&id, "It is 40000.").await;

        let second = relay.handle_incoming_user_message(&id, "thanks", now).await;
        let speakers: Vec<Speaker> = second.history_snapshot.iter().map(|t| t.speaker()).collect();
        assert_eq!(speakers, vec![Speaker::User, Speaker::Assistant]);
        assert_eq!(second.history_snapshot[0].text(), "tuition fee?");
    }

    #[tokio::test]
    async fn test_unmatched_query_uses_fallback() {
        let relay = relay();
        let outcome = relay
            .handle_incoming_user_message(&"u".into(), "zzz qqq", Instant::now())
            .await;
        assert_eq!(outcome.context_rows.len(), 3);

        let strict = relay_with(RelayConfig {
            fallback: FallbackPolicy::None,
            ..RelayConfig::default()
        });
        let outcome = strict
            .handle_incoming_user_message(&"u".into(), "zzz qqq", Instant::now())
            .await;
        assert!(outcome.should_auto_reply);
        assert!(outcome.context_rows.is_empty());
    }

    #[tokio::test]
    async fn test_human_mode_silences_and_extends() {
        let relay = relay();
        let id = ConversationId::new("user-1");
        let t0 = Instant::now();

        relay.handle_incoming_operator_message(&id, t0).await;
        let outcome = relay
            .handle_incoming_user_message(&id, "hello?", t0 + Duration::from_secs(30))
            .await;

        assert_eq!(outcome, UserMessageOutcome::silent());
        let session = relay.store().get_or_create(&id).await;
        let session = session.lock().await;
        assert_eq!(
            session.handover().deadline(),
            Some(t0 + Duration::from_secs(30) + TIMEOUT)
        );
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_expired_hold_answers_immediately() {
        let relay = relay();
        let id = ConversationId::new("user-1");
        let t0 = Instant::now();

        relay.handle_incoming_operator_message(&id, t0).await;
        let outcome = relay.handle_incoming_user_message(&id, "anyone?", t0 + TIMEOUT).await;

        assert!(outcome.should_auto_reply);
        assert_eq!(mode(&relay, &id).await, HandoverMode::Automated);
    }

    #[tokio::test]
    async fn test_explicit_resume() {
        let relay = relay();
        let id = ConversationId::new("user-1");
        relay.handle_incoming_operator_message(&id, Instant::now()).await;
        relay.handle_explicit_resume(&id).await;
        assert_eq!(mode(&relay, &id).await, HandoverMode::Automated);
    }

    #[tokio::test]
    async fn test_sweep_reverts_only_expired_sessions() {
        let relay = relay();
        let t0 = Instant::now();
        let early = ConversationId::new("early");
        let late = ConversationId::new("late");
        let idle = ConversationId::new("automated");

        relay.handle_incoming_operator_message(&early, t0).await;
        relay
            .handle_incoming_operator_message(&late, t0 + Duration::from_secs(30))
            .await;
        relay.handle_incoming_user_message(&idle, "hi", t0).await;

        let reverted = relay.run_idle_sweep_tick(t0 + Duration::from_secs(61)).await;
        assert_eq!(reverted, vec![early.clone()]);
        assert_eq!(mode(&relay, &late).await, HandoverMode::Human);

        let reverted = relay.run_idle_sweep_tick(t0 + Duration::from_secs(91)).await;
        assert_eq!(reverted, vec![late]);
        assert!(relay.run_idle_sweep_tick(t0 + Duration::from_secs(200)).await.is_empty());
    }

    #[test]
    fn test_resume_phrase_matching() {
        let relay = relay_with(RelayConfig {
            resume_keywords: vec!["#bot".to_string(), "Talk To Bot ".to_string(), "  ".to_string()],
            ..RelayConfig::default()
        });
        assert!(relay.is_resume_phrase("#BOT"));
        assert!(relay.is_resume_phrase("  talk to bot"));
        assert!(!relay.is_resume_phrase("please #bot"));
        assert!(!relay.is_resume_phrase(""));
    }
}
