//! Process-wide session state.
//!
//! [`SessionState`] owns the credential store and the session phase. Only the
//! session controller and the gateway's unauthorized handler mutate it, via
//! crate-private methods; everything else observes it through a
//! [`SessionView`].

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::credential::{CredentialStore, SessionToken};
use crate::error::{Error, Result};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 16;

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Mailbox address.
    pub email: String,
    /// Key manager session bound to this login.
    #[serde(default)]
    pub km_session_id: Option<String>,
}

/// Lifecycle phase of the session.
///
/// ```text
/// Unknown -> Loading -> Authenticated | Unauthenticated
/// Authenticated -> Unauthenticated      (logout, forced invalidation)
/// Unauthenticated -> Authenticated      (login)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Startup, before hydration has begun.
    #[default]
    Unknown,
    /// Hydration in progress; routing decisions are deferred.
    Loading,
    /// A credential is held and the identity is known.
    Authenticated(Identity),
    /// No usable credential.
    Unauthenticated,
}

impl SessionPhase {
    /// Short name for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Loading => "loading",
            Self::Authenticated(_) => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        }
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Unknown, Self::Loading)
                | (Self::Loading, Self::Authenticated(_) | Self::Unauthenticated)
                | (Self::Authenticated(_), Self::Unauthenticated)
                | (Self::Unauthenticated, Self::Authenticated(_))
        )
    }

    /// Returns true while the outcome of hydration is not yet known.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Unknown | Self::Loading)
    }

    /// Identity of the active user, if authenticated.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login or hydration established a session.
    SignedIn {
        /// Address of the user.
        email: String,
    },
    /// The user logged out.
    SignedOut,
    /// The backend rejected the credential; the session was torn down.
    Invalidated,
}

/// Owner of the credential store and session phase.
#[derive(Debug)]
pub struct SessionState {
    credentials: CredentialStore,
    phase: watch::Sender<SessionPhase>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    /// Creates session state over the given credential store.
    #[must_use]
    pub fn new(credentials: CredentialStore) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Unknown);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            credentials,
            phase,
            events,
        }
    }

    /// Read-only view for components that observe the session.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase.subscribe(),
        }
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// Current credential, read by the gateway on every call.
    #[must_use]
    pub fn credential(&self) -> Option<SessionToken> {
        self.credentials.get()
    }

    /// Returns true if a credential is held.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.credentials.is_present()
    }

    /// Moves to `next` if the lifecycle allows it.
    pub(crate) fn transition(&self, next: SessionPhase) -> Result<()> {
        let mut rejected = None;
        self.phase.send_if_modified(|current| {
            if current.can_transition_to(&next) {
                *current = next.clone();
                true
            } else {
                rejected = Some(current.name());
                false
            }
        });
        match rejected {
            Some(from) => Err(Error::InvalidTransition {
                from,
                to: next.name(),
            }),
            None => Ok(()),
        }
    }

    /// Stores the credential and enters `Authenticated`.
    pub(crate) fn authenticate(&self, token: SessionToken, identity: Identity) -> Result<()> {
        let phase = self.phase();
        let next = SessionPhase::Authenticated(identity.clone());
        if !phase.can_transition_to(&next) {
            return Err(Error::InvalidTransition {
                from: phase.name(),
                to: next.name(),
            });
        }
        if let Err(e) = self.credentials.set(token) {
            warn!("Session token could not be persisted: {e}");
        }
        self.transition(next)?;
        info!(email = %identity.email, "Session established");
        self.publish(SessionEvent::SignedIn {
            email: identity.email,
        });
        Ok(())
    }

    /// Ends hydration with the identity of an already stored credential.
    pub(crate) fn restore(&self, identity: Identity) -> Result<()> {
        self.transition(SessionPhase::Authenticated(identity.clone()))?;
        info!(email = %identity.email, "Session restored");
        self.publish(SessionEvent::SignedIn {
            email: identity.email,
        });
        Ok(())
    }

    /// Clears the credential and leaves the session unauthenticated.
    ///
    /// Idempotent: signing out of an unauthenticated session is a no-op.
    pub(crate) fn sign_out(&self) -> Result<()> {
        let cleared = self.credentials.clear();
        let was_authenticated = self.settle_unauthenticated();
        if was_authenticated {
            self.publish(SessionEvent::SignedOut);
        }
        cleared.map_err(Into::into)
    }

    /// Unauthorized handler: tears the session down if `token` is still the
    /// current credential.
    ///
    /// Returns whether the session was invalidated.
    pub(crate) fn invalidate(&self, token: &SessionToken) -> bool {
        let cleared = match self.credentials.clear_if(token) {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!("Failed to remove rejected session token from storage: {e}");
                !self.credentials.is_present()
            }
        };
        if !cleared {
            return false;
        }
        self.settle_unauthenticated();
        warn!("Session credential rejected by backend; signed out");
        self.publish(SessionEvent::Invalidated);
        true
    }

    /// Drops a stored credential without a session change, used when
    /// hydration finds the credential unusable.
    pub(crate) fn discard_credential(&self) {
        if let Err(e) = self.credentials.clear() {
            warn!("Failed to remove session token from storage: {e}");
        }
    }

    /// Moves to `Unauthenticated` from any phase that may lead there.
    ///
    /// Returns whether the session had been authenticated.
    pub(crate) fn settle_unauthenticated(&self) -> bool {
        let mut was_authenticated = false;
        self.phase.send_if_modified(|current| match *current {
            SessionPhase::Authenticated(_) => {
                was_authenticated = true;
                *current = SessionPhase::Unauthenticated;
                true
            }
            SessionPhase::Loading => {
                *current = SessionPhase::Unauthenticated;
                true
            }
            SessionPhase::Unknown | SessionPhase::Unauthenticated => false,
        });
        was_authenticated
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Read-only view of the session phase.
#[derive(Debug, Clone)]
pub struct SessionView {
    phase: watch::Receiver<SessionPhase>,
}

impl SessionView {
    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// Returns true if the session is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(*self.phase.borrow(), SessionPhase::Authenticated(_))
    }

    /// Identity of the active user.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.phase.borrow().identity().cloned()
    }

    /// Waits until hydration has resolved and returns the settled phase.
    ///
    /// Returns the last known phase if the session state was dropped.
    pub async fn settled(&mut self) -> SessionPhase {
        loop {
            let phase = self.phase.borrow_and_update().clone();
            if !phase.is_pending() {
                return phase;
            }
            if self.phase.changed().await.is_err() {
                return self.phase.borrow().clone();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            email: "alice@example.com".into(),
            km_session_id: Some("km-1".into()),
        }
    }

    fn all_phases() -> Vec<SessionPhase> {
        vec![
            SessionPhase::Unknown,
            SessionPhase::Loading,
            SessionPhase::Authenticated(alice()),
            SessionPhase::Unauthenticated,
        ]
    }

    #[test]
    fn test_allowed_edges() {
        let allowed = [
            ("unknown", "loading"),
            ("loading", "authenticated"),
            ("loading", "unauthenticated"),
            ("authenticated", "unauthenticated"),
            ("unauthenticated", "authenticated"),
        ];
        for from in all_phases() {
            for to in all_phases() {
                let expected = allowed.contains(&(from.name(), to.name()));
                assert_eq!(
                    from.can_transition_to(&to),
                    expected,
                    "{} -> {}",
                    from.name(),
                    to.name()
                );
            }
        }
    }

    #[test]
    fn test_rejected_transition_keeps_phase() {
        let state = SessionState::new(CredentialStore::in_memory());
        let err = state.transition(SessionPhase::Unauthenticated).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: "unknown",
                to: "unauthenticated"
            }
        ));
        assert_eq!(state.phase(), SessionPhase::Unknown);
    }

    #[test]
    fn test_authenticate_requires_unauthenticated_or_loading() {
        let state = SessionState::new(CredentialStore::in_memory());
        let err = state
            .authenticate(SessionToken::new("t"), alice())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert!(!state.has_credential());
    }

    #[test]
    fn test_invalidate_clears_and_signs_out() {
        let state = SessionState::new(CredentialStore::in_memory());
        let mut events = state.events();
        state.transition(SessionPhase::Loading).unwrap();
        state.transition(SessionPhase::Unauthenticated).unwrap();
        state
            .authenticate(SessionToken::new("t"), alice())
            .unwrap();

        assert!(state.invalidate(&SessionToken::new("t")));
        assert!(!state.has_credential());
        assert_eq!(state.phase(), SessionPhase::Unauthenticated);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::SignedIn {
                email: "alice@example.com".into()
            }
        );
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Invalidated);
    }

    #[test]
    fn test_invalidate_with_stale_token_is_ignored() {
        let state = SessionState::new(CredentialStore::in_memory());
        state.transition(SessionPhase::Loading).unwrap();
        state.transition(SessionPhase::Unauthenticated).unwrap();
        state
            .authenticate(SessionToken::new("fresh"), alice())
            .unwrap();

        assert!(!state.invalidate(&SessionToken::new("stale")));
        assert!(state.has_credential());
        assert!(state.view().is_authenticated());
    }

    #[test]
    fn test_sign_out_is_idempotent() {
        let state = SessionState::new(CredentialStore::in_memory());
        state.transition(SessionPhase::Loading).unwrap();
        state.transition(SessionPhase::Unauthenticated).unwrap();
        state
            .authenticate(SessionToken::new("t"), alice())
            .unwrap();

        state.sign_out().unwrap();
        state.sign_out().unwrap();
        assert_eq!(state.phase(), SessionPhase::Unauthenticated);
        assert!(!state.has_credential());
    }

    #[tokio::test]
    async fn test_view_settles_after_loading() {
        let state = SessionState::new(CredentialStore::in_memory());
        let mut view = state.view();
        state.transition(SessionPhase::Loading).unwrap();

        let waiter = async { view.settled().await };
        let resolver = async {
            tokio::task::yield_now().await;
            state.transition(SessionPhase::Unauthenticated).unwrap();
        };
        let (phase, ()) = tokio::join!(waiter, resolver);
        assert_eq!(phase, SessionPhase::Unauthenticated);
    }
}
