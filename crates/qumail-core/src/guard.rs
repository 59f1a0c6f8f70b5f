//! Route admission.

use std::fmt;
use std::str::FromStr;

use crate::session::{SessionPhase, SessionView};

/// Client views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Login form; the only public route.
    Login,
    /// Received mail.
    Inbox,
    /// Sent mail.
    Sent,
    /// Queued outgoing mail.
    Outbox,
    /// Compose form.
    Compose,
    /// Account settings.
    Settings,
}

impl Route {
    /// Route shown after login and for unknown locations.
    pub const HOME: Self = Self::Inbox;

    /// Returns true if the route needs an authenticated session.
    #[must_use]
    pub const fn is_protected(self) -> bool {
        !matches!(self, Self::Login)
    }

    /// Location path.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Inbox => "/inbox",
            Self::Sent => "/sent",
            Self::Outbox => "/outbox",
            Self::Compose => "/compose",
            Self::Settings => "/settings",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('/') {
            "login" => Ok(Self::Login),
            "" | "inbox" => Ok(Self::Inbox),
            "sent" => Ok(Self::Sent),
            "outbox" => Ok(Self::Outbox),
            "compose" => Ok(Self::Compose),
            "settings" => Ok(Self::Settings),
            other => Err(format!("unknown route '/{other}'")),
        }
    }
}

/// Outcome of evaluating a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Render the requested route.
    Admit,
    /// Session is still hydrating; render nothing conclusive yet.
    Defer,
    /// Go to this route instead. The requested location is not remembered.
    Redirect(Route),
}

/// Admission rule for `route` in `phase`.
#[must_use]
pub const fn decide(phase: &SessionPhase, route: Route) -> Admission {
    match (phase, route.is_protected()) {
        (SessionPhase::Unknown | SessionPhase::Loading, _) => Admission::Defer,
        (SessionPhase::Authenticated(_), true) | (SessionPhase::Unauthenticated, false) => {
            Admission::Admit
        }
        (SessionPhase::Authenticated(_), false) => Admission::Redirect(Route::HOME),
        (SessionPhase::Unauthenticated, true) => Admission::Redirect(Route::Login),
    }
}

/// Gates navigation on the session phase.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    session: SessionView,
}

impl AccessGuard {
    /// Creates a guard over a session view.
    #[must_use]
    pub const fn new(session: SessionView) -> Self {
        Self { session }
    }

    /// Evaluates `route` against the current phase.
    #[must_use]
    pub fn evaluate(&self, route: Route) -> Admission {
        decide(&self.session.phase(), route)
    }

    /// Waits for hydration to resolve, then evaluates `route`.
    ///
    /// Never returns [`Admission::Defer`] unless the session state is gone.
    pub async fn admit(&mut self, route: Route) -> Admission {
        let phase = self.session.settled().await;
        decide(&phase, route)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::Identity;

    const PROTECTED: [Route; 5] = [
        Route::Inbox,
        Route::Sent,
        Route::Outbox,
        Route::Compose,
        Route::Settings,
    ];

    fn authenticated() -> SessionPhase {
        SessionPhase::Authenticated(Identity {
            email: "alice@example.com".into(),
            km_session_id: None,
        })
    }

    #[test]
    fn test_authenticated_admits_protected_routes() {
        for route in PROTECTED {
            assert_eq!(decide(&authenticated(), route), Admission::Admit);
        }
        assert_eq!(
            decide(&authenticated(), Route::Login),
            Admission::Redirect(Route::Inbox)
        );
    }

    #[test]
    fn test_unauthenticated_redirects_to_login() {
        for route in PROTECTED {
            assert_eq!(
                decide(&SessionPhase::Unauthenticated, route),
                Admission::Redirect(Route::Login)
            );
        }
        assert_eq!(
            decide(&SessionPhase::Unauthenticated, Route::Login),
            Admission::Admit
        );
    }

    #[test]
    fn test_pending_phases_defer() {
        for route in PROTECTED.into_iter().chain([Route::Login]) {
            assert_eq!(decide(&SessionPhase::Unknown, route), Admission::Defer);
            assert_eq!(decide(&SessionPhase::Loading, route), Admission::Defer);
        }
    }

    #[test]
    fn test_route_parsing() {
        assert_eq!("/outbox".parse::<Route>().unwrap(), Route::Outbox);
        assert_eq!("/".parse::<Route>().unwrap(), Route::Inbox);
        assert_eq!("settings".parse::<Route>().unwrap(), Route::Settings);
        assert!("/admin".parse::<Route>().is_err());
        assert_eq!(Route::Compose.to_string(), "/compose");
    }
}
