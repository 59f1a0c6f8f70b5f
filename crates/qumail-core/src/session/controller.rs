//! Login, logout and startup hydration.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use super::state::{Identity, SessionPhase, SessionState};
use crate::api::MailApi;
use crate::credential::SessionToken;
use crate::error::{Error, Result};
use crate::gateway::Transport;

/// Default IMAP port (implicit TLS).
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Default SMTP port (submission with STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Message shown when a failed login carries no usable description.
pub const GENERIC_LOGIN_FAILURE: &str = "Login failed";

/// Mail-provider credentials exchanged once for a session.
///
/// Consumed by [`SessionController::login`] and never stored.
#[derive(Clone)]
pub struct LoginCredentials {
    /// Mailbox address.
    pub email: String,
    /// Mail-provider password or app password.
    pub password: String,
    /// IMAP server host.
    pub imap_server: String,
    /// SMTP server host.
    pub smtp_server: String,
    /// IMAP port.
    pub imap_port: u16,
    /// SMTP port.
    pub smtp_port: u16,
}

impl LoginCredentials {
    /// Creates credentials with the default ports.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        imap_server: impl Into<String>,
        smtp_server: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            imap_server: imap_server.into(),
            smtp_server: smtp_server.into(),
            imap_port: DEFAULT_IMAP_PORT,
            smtp_port: DEFAULT_SMTP_PORT,
        }
    }

    /// Form fields for the login call.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("email".to_string(), self.email.clone()),
            ("password".to_string(), self.password.clone()),
            ("imap_server".to_string(), self.imap_server.clone()),
            ("smtp_server".to_string(), self.smtp_server.clone()),
            ("imap_port".to_string(), self.imap_port.to_string()),
            ("smtp_port".to_string(), self.smtp_port.to_string()),
        ]
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("imap_server", &self.imap_server)
            .field("smtp_server", &self.smtp_server)
            .field("imap_port", &self.imap_port)
            .field("smtp_port", &self.smtp_port)
            .finish()
    }
}

/// Single user-facing message for a failed login.
///
/// The gateway has already picked the backend `detail`, then `message`, then
/// the transport description; an empty result falls back to
/// [`GENERIC_LOGIN_FAILURE`].
#[must_use]
pub fn login_error_message(error: &Error) -> String {
    let message = match error {
        Error::RequestFailed { message, .. } | Error::SessionInvalidated { message } => {
            message.clone()
        }
        Error::AuthenticationFailed(message) => message.clone(),
        other => other.to_string(),
    };
    if message.trim().is_empty() {
        GENERIC_LOGIN_FAILURE.to_string()
    } else {
        message
    }
}

/// Drives the session lifecycle.
#[derive(Debug)]
pub struct SessionController<T> {
    api: Arc<MailApi<T>>,
    logout_path: Option<String>,
}

impl<T: Transport> SessionController<T> {
    /// Creates a controller.
    ///
    /// `logout_path`, if set, names a backend endpoint that is called
    /// best-effort on logout.
    #[must_use]
    pub const fn new(api: Arc<MailApi<T>>, logout_path: Option<String>) -> Self {
        Self { api, logout_path }
    }

    fn state(&self) -> &Arc<SessionState> {
        self.api.gateway().session()
    }

    /// Restores a session left by a previous run.
    ///
    /// Resolves to `Authenticated` or `Unauthenticated`. A credential that
    /// cannot be confirmed is cleared, whether the backend rejected it or
    /// could not be reached, so no token outlives an unauthenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if hydration already ran.
    pub async fn hydrate(&self) -> Result<SessionPhase> {
        let state = self.state();
        state.transition(SessionPhase::Loading)?;

        if !state.has_credential() {
            info!("No stored session");
            state.transition(SessionPhase::Unauthenticated)?;
            return Ok(state.phase());
        }

        match self.api.current_user().await {
            Ok(identity) => state.restore(identity)?,
            Err(e) if e.is_session_invalidated() => {
                // The gateway already cleared the credential.
                info!("Stored session is no longer valid");
                state.settle_unauthenticated();
            }
            Err(e) => {
                warn!(status = ?e.status(), "Could not verify stored session: {e}");
                state.discard_credential();
                state.settle_unauthenticated();
            }
        }
        Ok(state.phase())
    }

    /// Exchanges `credentials` for a session.
    ///
    /// The credentials are dropped when this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailed`] with a user-facing message if
    /// the exchange fails; nothing is stored in that case. Returns
    /// [`Error::InvalidTransition`] unless the session is unauthenticated.
    pub async fn login(&self, credentials: LoginCredentials) -> Result<Identity> {
        let state = self.state();
        let phase = state.phase();
        if phase != SessionPhase::Unauthenticated {
            return Err(Error::InvalidTransition {
                from: phase.name(),
                to: "authenticated",
            });
        }

        info!(
            email = %credentials.email,
            imap_server = %credentials.imap_server,
            smtp_server = %credentials.smtp_server,
            "Login attempt"
        );
        let outcome = self.api.login(&credentials).await;
        drop(credentials);

        match outcome {
            Ok(response) => {
                let identity = response.user;
                state.authenticate(SessionToken::new(response.access_token), identity.clone())?;
                Ok(identity)
            }
            Err(e) => {
                let message = login_error_message(&e);
                warn!("Login failed: {message}");
                Err(Error::AuthenticationFailed(message))
            }
        }
    }

    /// Ends the session locally. Idempotent and never fails.
    ///
    /// A configured backend logout endpoint is called first; its failure is
    /// logged and ignored.
    pub async fn logout(&self) {
        let state = self.state();
        if let Some(path) = &self.logout_path {
            if state.has_credential() {
                if let Err(e) = self.api.end_session(path).await {
                    warn!("Backend logout failed, signing out locally: {e}");
                }
            }
        }
        if let Err(e) = state.sign_out() {
            warn!("Session token could not be removed from storage: {e}");
        }
        info!("Signed out");
    }

    /// Active identity, if signed in.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state().phase().identity().cloned()
    }
}
