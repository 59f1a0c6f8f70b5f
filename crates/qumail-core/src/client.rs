//! Wiring of the session, gateway and views into one client.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info};

use crate::api::MailApi;
use crate::config::ClientConfig;
use crate::credential::{CredentialStore, KeyringBackend};
use crate::error::{Error, Result};
use crate::gateway::{Gateway, HttpTransport, Transport};
use crate::guard::AccessGuard;
use crate::navigation::Navigator;
use crate::outbox::Outbox;
use crate::session::{SessionController, SessionEvent, SessionState};
use crate::view::Mailboxes;

/// A configured client.
#[derive(Debug)]
pub struct QuMail<T> {
    session: Arc<SessionState>,
    api: Arc<MailApi<T>>,
    controller: SessionController<T>,
    mailboxes: Arc<Mailboxes>,
    outbox: Outbox<T>,
    navigator: Navigator,
}

impl QuMail<HttpTransport> {
    /// Builds an HTTP client from `config`.
    ///
    /// The session token is kept in the platform keyring when
    /// `persist_credentials` is set, in memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid, the HTTP client cannot be
    /// built, or the keyring cannot be read.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let transport = HttpTransport::new(base_url, config.timeout())
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;

        let store = if config.persist_credentials {
            CredentialStore::open(KeyringBackend::new(
                config.keyring_service.clone(),
                config.keyring_account.clone(),
            ))?
        } else {
            CredentialStore::in_memory()
        };
        info!(
            api = %transport.base_url(),
            persist = config.persist_credentials,
            "Client configured"
        );
        Ok(Self::with_transport(
            transport,
            store,
            config.logout_path.clone(),
        ))
    }
}

impl<T: Transport> QuMail<T> {
    /// Builds a client over any transport.
    #[must_use]
    pub fn with_transport(transport: T, store: CredentialStore, logout_path: Option<String>) -> Self {
        let session = Arc::new(SessionState::new(store));
        let api = Arc::new(MailApi::new(Gateway::new(transport, Arc::clone(&session))));
        let mailboxes = Arc::new(Mailboxes::new());
        Self {
            controller: SessionController::new(Arc::clone(&api), logout_path),
            outbox: Outbox::new(Arc::clone(&api), Arc::clone(&mailboxes)),
            navigator: Navigator::new(AccessGuard::new(session.view())),
            session,
            api,
            mailboxes,
        }
    }

    /// Session state.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Backend API.
    #[must_use]
    pub const fn api(&self) -> &Arc<MailApi<T>> {
        &self.api
    }

    /// Login, logout and hydration.
    #[must_use]
    pub const fn controller(&self) -> &SessionController<T> {
        &self.controller
    }

    /// Cached mailbox views.
    #[must_use]
    pub const fn mailboxes(&self) -> &Arc<Mailboxes> {
        &self.mailboxes
    }

    /// Outbox retry and compose.
    #[must_use]
    pub const fn outbox(&self) -> &Outbox<T> {
        &self.outbox
    }

    /// Client location.
    #[must_use]
    pub const fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// A new access guard over this session.
    #[must_use]
    pub fn guard(&self) -> AccessGuard {
        AccessGuard::new(self.session.view())
    }

    /// Applies session events queued since the last call.
    ///
    /// Moves the navigator and drops cached listings once the session ends.
    pub fn process_events(&self, events: &mut broadcast::Receiver<SessionEvent>) {
        loop {
            let event = match events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "Session events lagged");
                    continue;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            };
            debug!(?event, "Session event");
            if matches!(event, SessionEvent::Invalidated | SessionEvent::SignedOut) {
                self.mailboxes.clear();
            }
            self.navigator.handle(&event);
        }
    }
}
