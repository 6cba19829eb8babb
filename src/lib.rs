//! Switchboard - messaging relay with human handover
//!
//! Relays end-user messages to an automated responder grounded in a small
//! knowledge table, lets a human operator silently take a conversation over,
//! and hands it back to automation once the operator goes idle.

pub mod channels;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod handover;
pub mod knowledge;
pub mod relay;
pub mod server;
pub mod sweeper;
pub mod system;
pub mod utils;

pub use crate::config::{Secrets, Settings};
pub use handover::{ConversationId, HandoverMode, Turn};
pub use knowledge::{FallbackPolicy, KnowledgeRow};
pub use relay::{Relay, RelayConfig, UserMessageOutcome};
pub use system::System;
