use super::history::{HistoryBuffer, Turn};
use super::state::HandoverMachine;
use std::time::Duration;

/// Per-conversation state: who may reply, and what has been said.
#[derive(Debug)]
pub struct Session {
    handover: HandoverMachine,
    history: HistoryBuffer,
}

impl Session {
    pub fn new(idle_timeout: Duration, history_capacity: usize) -> Self {
        Self {
            handover: HandoverMachine::new(idle_timeout),
            history: HistoryBuffer::new(history_capacity),
        }
    }

    pub fn handover(&self) -> &HandoverMachine {
        &self.handover
    }

    pub fn handover_mut(&mut self) -> &mut HandoverMachine {
        &mut self.handover
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn record(&mut self, turn: Turn) {
        self.history.append(turn);
    }
}
