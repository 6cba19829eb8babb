//! Error taxonomy for the relay's external collaborators.
//!
//! None of these reach end users. Fetch failures degrade to stale or empty
//! context, delivery failures are logged and dropped, and generation failures
//! are answered with a fixed apology.

use std::time::Duration;
use thiserror::Error;

/// Knowledge source unreachable or returned something unusable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("knowledge source request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("knowledge source returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed knowledge payload: {0}")]
    Malformed(String),

    #[error("knowledge fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound message could not be handed to the messaging platform.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("messaging platform returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("page access token is not configured")]
    MissingToken,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generation API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generation API returned no text")]
    EmptyResponse,

    #[error("generation failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl GenerationError {
    /// Transport failures, rate limiting and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Transport(_) => true,
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::EmptyResponse | GenerationError::RetriesExhausted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |status| GenerationError::Status {
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!GenerationError::EmptyResponse.is_retryable());
    }
}
