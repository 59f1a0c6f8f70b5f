//! In-memory credential cache with write-through persistence.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::CredentialResult;

/// Opaque bearer token proving an authenticated session.
///
/// The token is never interpreted; `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw token value, for the `Authorization` header.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Persistence behind the [`CredentialStore`].
pub trait CredentialBackend: Send + Sync + fmt::Debug {
    /// Loads the persisted token, `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn load(&self) -> CredentialResult<Option<SessionToken>>;

    /// Persists the token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn save(&self, token: &SessionToken) -> CredentialResult<()>;

    /// Removes the persisted token. Removing a missing token succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn delete(&self) -> CredentialResult<()>;
}

/// Process-local backend. Clones share the same slot, which lets tests
/// simulate a restart by opening a second store over the same backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<SessionToken>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds a token from a previous session.
    #[must_use]
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(token))),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<SessionToken>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> CredentialResult<Option<SessionToken>> {
        Ok(self.slot().clone())
    }

    fn save(&self, token: &SessionToken) -> CredentialResult<()> {
        *self.slot() = Some(token.clone());
        Ok(())
    }

    fn delete(&self) -> CredentialResult<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// Holds the current session credential.
///
/// Reads are served from memory; writes go to memory first and then to the
/// backend. Only the session state owner mutates the store.
#[derive(Debug)]
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    current: Mutex<Option<SessionToken>>,
}

impl CredentialStore {
    /// Opens the store, loading any token left by a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn open(backend: impl CredentialBackend + 'static) -> CredentialResult<Self> {
        let current = backend.load()?;
        debug!(present = current.is_some(), "Opened credential store");
        Ok(Self {
            backend: Box::new(backend),
            current: Mutex::new(current),
        })
    }

    /// Creates an empty, non-persistent store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            current: Mutex::new(None),
        }
    }

    /// Current credential, if a session is active.
    #[must_use]
    pub fn get(&self) -> Option<SessionToken> {
        self.current().clone()
    }

    /// Returns true if a credential is present.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.current().is_some()
    }

    /// Replaces the credential.
    ///
    /// The in-memory value is updated even if persisting fails.
    pub(crate) fn set(&self, token: SessionToken) -> CredentialResult<()> {
        *self.current() = Some(token.clone());
        self.backend.save(&token)
    }

    /// Removes the credential. Idempotent.
    pub(crate) fn clear(&self) -> CredentialResult<()> {
        self.current().take();
        self.backend.delete()
    }

    /// Removes the credential only if it is still `token`.
    ///
    /// Returns whether anything was cleared.
    pub(crate) fn clear_if(&self, token: &SessionToken) -> CredentialResult<bool> {
        {
            let mut current = self.current();
            if current.as_ref() != Some(token) {
                return Ok(false);
            }
            current.take();
        }
        self.backend.delete()?;
        Ok(true)
    }

    fn current(&self) -> MutexGuard<'_, Option<SessionToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SessionToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[test]
    fn test_set_get_clear() {
        let store = CredentialStore::in_memory();
        assert!(store.get().is_none());

        store.set(SessionToken::new("abc")).unwrap();
        assert_eq!(store.get(), Some(SessionToken::new("abc")));
        assert!(store.is_present());

        store.clear().unwrap();
        assert!(store.get().is_none());
        store.clear().unwrap();
        assert!(!store.is_present());
    }

    #[test]
    fn test_survives_reopen() {
        let backend = MemoryBackend::new();
        let store = CredentialStore::open(backend.clone()).unwrap();
        store.set(SessionToken::new("persisted")).unwrap();
        drop(store);

        let reopened = CredentialStore::open(backend.clone()).unwrap();
        assert_eq!(reopened.get(), Some(SessionToken::new("persisted")));

        reopened.clear().unwrap();
        assert!(CredentialStore::open(backend).unwrap().get().is_none());
    }

    #[test]
    fn test_clear_if_only_matches_current_token() {
        let store = CredentialStore::in_memory();
        store.set(SessionToken::new("new")).unwrap();

        assert!(!store.clear_if(&SessionToken::new("old")).unwrap());
        assert_eq!(store.get(), Some(SessionToken::new("new")));

        assert!(store.clear_if(&SessionToken::new("new")).unwrap());
        assert!(store.get().is_none());
    }
}
