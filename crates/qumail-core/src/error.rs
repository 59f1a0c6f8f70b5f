//! Error types for the core library.

use thiserror::Error;

use crate::credential::CredentialError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend rejected the supplied login credentials.
    ///
    /// Recoverable; the message is meant to be shown next to the login form.
    #[error("{0}")]
    AuthenticationFailed(String),

    /// The session credential was rejected mid-session.
    ///
    /// The credential has already been cleared and a forced logout published
    /// by the time a caller sees this.
    #[error("Session invalidated: {message}")]
    SessionInvalidated {
        /// Message reported by the backend.
        message: String,
    },

    /// Transport or backend failure.
    #[error("Request failed{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    RequestFailed {
        /// HTTP status, absent for network-level failures.
        status: Option<u16>,
        /// Human-readable description.
        message: String,
    },

    /// A bulk outbox retry delivered nothing.
    #[error("No queued emails could be sent ({total_queued} still queued)")]
    PartialRetryFailure {
        /// Number of records that were queued when the retry ran.
        total_queued: u32,
    },

    /// An outbox retry is already running.
    #[error("An outbox retry is already in progress")]
    RetryInFlight,

    /// A session phase change that the lifecycle does not allow.
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// Phase the session was in.
        from: &'static str,
        /// Phase that was requested.
        to: &'static str,
    },

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a request failure.
    #[must_use]
    pub fn request_failed(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// HTTP status attached to the failure, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => *status,
            Self::SessionInvalidated { .. } => Some(401),
            _ => None,
        }
    }

    /// Returns true if this error forced the session to end.
    #[must_use]
    pub const fn is_session_invalidated(&self) -> bool {
        matches!(self, Self::SessionInvalidated { .. })
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
