//! Platform keyring persistence for the session token.
//!
//! Uses the platform's native credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use tracing::{debug, warn};

use super::CredentialResult;
use super::store::{CredentialBackend, SessionToken};

/// Keyring entry user name used when none is configured.
pub const DEFAULT_ACCOUNT: &str = "session";

/// Stores the session token as a single keyring entry.
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
    account: String,
}

impl KeyringBackend {
    /// Creates a backend for the given keyring service and entry name.
    #[must_use]
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> CredentialResult<Entry> {
        Ok(Entry::new(&self.service, &self.account)?)
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self) -> CredentialResult<Option<SessionToken>> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                debug!(service = %self.service, "Loaded session token from keyring");
                Ok(Some(SessionToken::new(secret)))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(service = %self.service, "No session token in keyring");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &SessionToken) -> CredentialResult<()> {
        self.entry()?.set_password(token.secret())?;
        debug!(service = %self.service, "Stored session token in keyring");
        Ok(())
    }

    fn delete(&self) -> CredentialResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                debug!(service = %self.service, "Deleted session token from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!("Failed to delete session token: {e}");
                Err(e.into())
            }
        }
    }
}
