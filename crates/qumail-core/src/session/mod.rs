//! Session lifecycle.
//!
//! [`SessionState`] is the single owned session object. The
//! [`SessionController`] drives it through login, logout and startup
//! hydration; the request gateway tears it down on unauthorized responses.

mod controller;
mod state;

pub use controller::{
    DEFAULT_IMAP_PORT, DEFAULT_SMTP_PORT, GENERIC_LOGIN_FAILURE, LoginCredentials,
    SessionController, login_error_message,
};
pub use state::{Identity, SessionEvent, SessionPhase, SessionState, SessionView};
