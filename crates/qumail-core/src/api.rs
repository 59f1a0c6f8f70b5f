//! Typed backend endpoints.
//!
//! Every call goes through the [`Gateway`], so credential attachment and
//! unauthorized handling apply uniformly.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::gateway::{ApiRequest, Gateway, Transport};
use crate::model::{ComposeReceipt, Draft, EmailRecord, Health, Settings};
use crate::session::{Identity, LoginCredentials};

const LOGIN: &str = "auth/login";
const CURRENT_USER: &str = "auth/me";
const COMPOSE: &str = "emails/compose";
const RETRY_OUTBOX: &str = "emails/retry-outbox";
const SETTINGS: &str = "settings";
const HEALTH: &str = "health";

/// Mail folder served by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Folder {
    /// Received mail, decrypted by the backend.
    Inbox,
    /// Sent mail.
    Sent,
    /// Queued outgoing mail.
    Outbox,
}

impl Folder {
    /// All folders.
    pub const ALL: [Self; 3] = [Self::Inbox, Self::Sent, Self::Outbox];

    /// Endpoint path.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Inbox => "emails/inbox",
            Self::Sent => "emails/sent",
            Self::Outbox => "emails/outbox",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::Sent => "Sent",
            Self::Outbox => "Outbox",
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Successful login exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    /// Session bearer token.
    pub access_token: String,
    /// Token scheme, `bearer`.
    #[serde(default = "bearer")]
    pub token_type: String,
    /// Identity the token belongs to.
    pub user: Identity,
}

fn bearer() -> String {
    "bearer".to_string()
}

/// Result of a bulk outbox retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOutcome {
    /// Records delivered by this retry.
    pub sent_count: u32,
    /// Records that were queued when the retry started.
    pub total_queued: u32,
}

#[derive(Debug, Deserialize)]
struct Mailbox {
    #[serde(default)]
    emails: Vec<EmailRecord>,
}

/// Backend API client.
#[derive(Debug)]
pub struct MailApi<T> {
    gateway: Gateway<T>,
}

impl<T: Transport> MailApi<T> {
    /// Creates an API client over a gateway.
    #[must_use]
    pub const fn new(gateway: Gateway<T>) -> Self {
        Self { gateway }
    }

    /// Gateway used for every call.
    #[must_use]
    pub const fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    /// Exchanges mail-provider credentials for a session token.
    ///
    /// The request is sent without a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the credentials or is unreachable.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse> {
        let request = ApiRequest::post(LOGIN)
            .public()
            .with_form(credentials.form_fields());
        self.gateway.send_json(request).await
    }

    /// Identity of the current credential.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SessionInvalidated`] if the credential is rejected.
    pub async fn current_user(&self) -> Result<Identity> {
        self.gateway.send_json(ApiRequest::get(CURRENT_USER)).await
    }

    /// Records in `folder`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn mailbox(&self, folder: Folder) -> Result<Vec<EmailRecord>> {
        let mailbox: Mailbox = self.gateway.send_json(ApiRequest::get(folder.path())).await?;
        debug!(%folder, count = mailbox.emails.len(), "Fetched mailbox");
        Ok(mailbox.emails)
    }

    /// Inbox records.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn inbox(&self) -> Result<Vec<EmailRecord>> {
        self.mailbox(Folder::Inbox).await
    }

    /// Sent records.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn sent(&self) -> Result<Vec<EmailRecord>> {
        self.mailbox(Folder::Sent).await
    }

    /// Queued outbox records.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn outbox(&self) -> Result<Vec<EmailRecord>> {
        self.mailbox(Folder::Outbox).await
    }

    /// Encrypts and sends a draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn compose(&self, draft: &Draft) -> Result<ComposeReceipt> {
        let request = ApiRequest::post(COMPOSE).with_multipart(draft.multipart_fields());
        self.gateway.send_json(request).await
    }

    /// Attempts delivery of every queued record.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn retry_outbox(&self) -> Result<RetryOutcome> {
        self.gateway.send_json(ApiRequest::post(RETRY_OUTBOX)).await
    }

    /// Account settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn settings(&self) -> Result<Settings> {
        self.gateway.send_json(ApiRequest::get(SETTINGS)).await
    }

    /// Replaces account settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_settings(&self, settings: &Settings) -> Result<()> {
        let request = ApiRequest::post(SETTINGS).with_form(settings.form_fields());
        self.gateway.send(request).await.map(drop)
    }

    /// Backend and key manager health. Does not need a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn health(&self) -> Result<Health> {
        self.gateway.send_json(ApiRequest::get(HEALTH).public()).await
    }

    /// Asks the backend to invalidate the current credential server-side.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn end_session(&self, path: &str) -> Result<()> {
        self.gateway.send(ApiRequest::post(path)).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_paths() {
        assert_eq!(Folder::Inbox.path(), "emails/inbox");
        assert_eq!(Folder::Sent.path(), "emails/sent");
        assert_eq!(Folder::Outbox.path(), "emails/outbox");
        assert_eq!(Folder::Outbox.to_string(), "Outbox");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_login_response_defaults_token_type() {
        let response: LoginResponse = serde_json::from_str(
            r#"{"access_token": "jwt", "user": {"email": "a@b.c", "km_session_id": "km"}}"#,
        )
        .unwrap();
        assert_eq!(response.token_type, "bearer");
        assert_eq!(response.user.km_session_id.as_deref(), Some("km"));
    }
}
