//! Handover state machine
//!
//! A conversation is either answered by the automated responder or held by a
//! human operator until an idle deadline. The deadline only exists in the
//! `Human` variant, so "human without deadline" cannot be represented.
//!
//! Every operation takes the current instant from the caller. Deadlines only
//! ever move forward: a late-delivered call carrying an older `now` cannot
//! shorten a window that a newer call already extended.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverMode {
    Automated,
    Human,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverState {
    Automated,
    Human { deadline: Instant },
}

impl HandoverState {
    pub fn mode(&self) -> HandoverMode {
        match self {
            HandoverState::Automated => HandoverMode::Automated,
            HandoverState::Human { .. } => HandoverMode::Human,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            HandoverState::Automated => None,
            HandoverState::Human { deadline } => Some(*deadline),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandoverMachine {
    state: HandoverState,
    idle_timeout: Duration,
}

impl HandoverMachine {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            state: HandoverState::Automated,
            idle_timeout,
        }
    }

    pub fn state(&self) -> HandoverState {
        self.state
    }

    pub fn mode(&self) -> HandoverMode {
        self.state.mode()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// An operator spoke: hand the conversation to them (or extend their window).
    pub fn on_operator_message(&mut self, now: Instant) {
        let deadline = self.extended_deadline(now);
        self.state = HandoverState::Human { deadline };
    }

    /// The end user spoke. Renews the operator's window while human-held;
    /// does nothing while automated.
    pub fn on_user_activity(&mut self, now: Instant) {
        self.check_and_maybe_revert(now);
        if let HandoverState::Human { .. } = self.state {
            let deadline = self.extended_deadline(now);
            self.state = HandoverState::Human { deadline };
        }
    }

    /// Force control back to automation regardless of the current mode.
    pub fn on_explicit_resume(&mut self) {
        self.state = HandoverState::Automated;
    }

    /// Revert to automation once the deadline has passed.
    /// Returns true only when this call performed the reversion.
    pub fn check_and_maybe_revert(&mut self, now: Instant) -> bool {
        match self.state {
            HandoverState::Human { deadline } if now >= deadline => {
                self.state = HandoverState::Automated;
                true
            }
            _ => false,
        }
    }

    /// Collapses an expired human hold before answering, so an expired hold
    /// is never reported as human.
    pub fn is_automated(&mut self, now: Instant) -> bool {
        self.check_and_maybe_revert(now);
        self.state == HandoverState::Automated
    }

    fn extended_deadline(&self, now: Instant) -> Instant {
        let candidate = now + self.idle_timeout;
        match self.state {
            HandoverState::Human { deadline } => deadline.max(candidate),
            HandoverState::Automated => candidate,
        }
    }
}
