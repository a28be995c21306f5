//! Client-side pieces used by apps talking to the HTTP API: a typed API
//! client, a retrying feed session and the session/identity provider.

pub mod feed_session;
pub mod http;
pub mod retry;
pub mod session;

use thiserror::Error;

pub use feed_session::{FeedQuery, FeedSession, FeedSource, FeedState, LocalFeedSource};
pub use http::ApiClient;
pub use retry::RetryPolicy;
pub use session::{AuthBackend, AuthEvent, SessionContext, SessionProvider};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("early access is closed")]
    EarlyAccessClosed,
    #[error("paused after repeated network errors")]
    CoolingDown,
    #[error("superseded by a newer request")]
    Superseded,
}

impl ClientError {
    /// Failures worth retrying: connectivity, timeouts and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ClientError::Network("reset".into()).is_transient());
        assert!(ClientError::Status {
            status: 503,
            message: "busy".into()
        }
        .is_transient());
        assert!(!ClientError::Status {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!ClientError::Unauthorized("expired".into()).is_transient());
    }
}
