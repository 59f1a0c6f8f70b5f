//! # qumail-core
//!
//! Session lifecycle and message-state coordination for the `QuMail` client.
//!
//! This crate provides:
//! - Credential storage (platform keyring or memory)
//! - Session lifecycle: login, logout and startup hydration
//! - A request gateway that attaches the session token and tears the session
//!   down on unauthorized responses
//! - Route admission and navigation driven by session events
//! - Mailbox views with stale-response elision
//! - Security tiers and outbox retry with partial-success accounting

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod api;
pub mod client;
pub mod config;
pub mod credential;
mod error;
pub mod gateway;
pub mod guard;
pub mod model;
pub mod navigation;
pub mod outbox;
pub mod session;
pub mod tier;
pub mod view;

pub use api::{Folder, LoginResponse, MailApi, RetryOutcome};
pub use client::QuMail;
pub use config::ClientConfig;
pub use credential::{
    CredentialBackend, CredentialError, CredentialStore, KeyringBackend, MemoryBackend,
    SessionToken,
};
pub use error::{Error, Result};
pub use gateway::{ApiRequest, ApiResponse, Gateway, HttpTransport, Transport, TransportError};
pub use guard::{AccessGuard, Admission, Route, decide};
pub use model::{
    ComposeReceipt, ComposeStatus, DecryptionStatus, DeliveryStatus, Draft, DraftAttachment,
    EmailRecord, EncryptionMode, Health, MessageState, Settings,
};
pub use navigation::Navigator;
pub use outbox::{Outbox, OutboxSummary, RetryReport};
pub use session::{
    Identity, LoginCredentials, SessionController, SessionEvent, SessionPhase, SessionState,
    SessionView,
};
pub use tier::{SecurityTier, tier};
pub use view::{FetchTicket, MailboxView, Mailboxes};
