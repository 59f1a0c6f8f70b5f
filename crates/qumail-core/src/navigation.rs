//! Client location tracking.
//!
//! The gateway never navigates. It publishes session events, and the
//! [`Navigator`] subscribed to them moves the client to the login route when
//! the session ends.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::guard::{AccessGuard, Admission, Route};
use crate::session::SessionEvent;

/// Current client location.
#[derive(Debug)]
pub struct Navigator {
    guard: AccessGuard,
    location: Mutex<Route>,
}

impl Navigator {
    /// Creates a navigator positioned at the login route.
    #[must_use]
    pub const fn new(guard: AccessGuard) -> Self {
        Self {
            guard,
            location: Mutex::new(Route::Login),
        }
    }

    /// Current location.
    #[must_use]
    pub fn location(&self) -> Route {
        *self.current()
    }

    /// Requests navigation to `route`.
    ///
    /// The location changes on [`Admission::Admit`] and
    /// [`Admission::Redirect`]; a deferred navigation leaves it unchanged.
    pub fn navigate(&self, route: Route) -> Admission {
        let admission = self.guard.evaluate(route);
        let mut location = self.current();
        match admission {
            Admission::Admit => *location = route,
            Admission::Redirect(target) => {
                debug!(requested = %route, %target, "Navigation redirected");
                *location = target;
            }
            Admission::Defer => {}
        }
        admission
    }

    /// Applies a session event. Returns the new location if it changed.
    pub fn handle(&self, event: &SessionEvent) -> Option<Route> {
        let mut location = self.current();
        let target = match event {
            SessionEvent::Invalidated | SessionEvent::SignedOut => Route::Login,
            SessionEvent::SignedIn { .. } if *location == Route::Login => Route::HOME,
            SessionEvent::SignedIn { .. } => return None,
        };
        if *location == target {
            return None;
        }
        info!(from = %*location, to = %target, ?event, "Session change moved client");
        *location = target;
        Some(target)
    }

    /// Follows session events until the channel closes.
    pub async fn run(&self, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.handle(&event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Navigator lagged; re-evaluating location");
                    self.navigate(self.location());
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn current(&self) -> MutexGuard<'_, Route> {
        self.location.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credential::{CredentialStore, SessionToken};
    use crate::session::{Identity, SessionPhase, SessionState};

    fn signed_in_state() -> SessionState {
        let state = SessionState::new(CredentialStore::in_memory());
        state.transition(SessionPhase::Loading).unwrap();
        state.transition(SessionPhase::Unauthenticated).unwrap();
        state
            .authenticate(
                SessionToken::new("t"),
                Identity {
                    email: "alice@example.com".into(),
                    km_session_id: None,
                },
            )
            .unwrap();
        state
    }

    #[test]
    fn test_navigate_follows_admission() {
        let state = signed_in_state();
        let navigator = Navigator::new(AccessGuard::new(state.view()));

        assert_eq!(navigator.navigate(Route::Outbox), Admission::Admit);
        assert_eq!(navigator.location(), Route::Outbox);

        state.sign_out().unwrap();
        assert_eq!(
            navigator.navigate(Route::Settings),
            Admission::Redirect(Route::Login)
        );
        assert_eq!(navigator.location(), Route::Login);
    }

    #[test]
    fn test_invalidation_moves_to_login() {
        let state = signed_in_state();
        let navigator = Navigator::new(AccessGuard::new(state.view()));
        navigator.navigate(Route::Sent);

        assert_eq!(
            navigator.handle(&SessionEvent::Invalidated),
            Some(Route::Login)
        );
        assert_eq!(navigator.handle(&SessionEvent::Invalidated), None);
    }

    #[test]
    fn test_sign_in_leaves_login_page() {
        let state = SessionState::new(CredentialStore::in_memory());
        let navigator = Navigator::new(AccessGuard::new(state.view()));
        let event = SessionEvent::SignedIn {
            email: "alice@example.com".into(),
        };
        assert_eq!(navigator.handle(&event), Some(Route::Inbox));
        assert_eq!(navigator.handle(&event), None);
    }

    #[tokio::test]
    async fn test_run_follows_channel() {
        let state = signed_in_state();
        let navigator = Navigator::new(AccessGuard::new(state.view()));
        navigator.navigate(Route::Compose);

        let events = state.events();
        assert!(state.invalidate(&SessionToken::new("t")));
        drop(state);

        navigator.run(events).await;
        assert_eq!(navigator.location(), Route::Login);
    }
}
