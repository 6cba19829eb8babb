//! Conversation handover: who may reply, and the bounded history each
//! conversation carries.

pub mod history;
pub mod session;
pub mod state;
pub mod store;

pub use history::{HistoryBuffer, Speaker, Turn};
pub use session::Session;
pub use state::{HandoverMachine, HandoverMode, HandoverState};
pub use store::{ConversationId, SessionHandle, SessionStore};
