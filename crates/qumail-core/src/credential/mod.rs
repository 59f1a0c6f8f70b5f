//! Session credential storage.
//!
//! The [`CredentialStore`] is the single source of truth for whether a
//! session is active. It keeps the bearer token in memory and writes it
//! through to a [`CredentialBackend`] so it survives restarts within the
//! same device session.

mod platform;
mod store;

pub use platform::{DEFAULT_ACCOUNT, KeyringBackend};
pub use store::{CredentialBackend, CredentialStore, MemoryBackend, SessionToken};

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;
