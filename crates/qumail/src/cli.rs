//! Command-line arguments.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use qumail_core::session::{DEFAULT_IMAP_PORT, DEFAULT_SMTP_PORT};
use qumail_core::{EncryptionMode, Route};

/// Quantum-secure email client
#[derive(Parser, Debug)]
#[command(name = "qumail")]
#[command(about = "Command-line client for the QuMail secure email backend")]
#[command(version)]
pub struct Cli {
    /// Backend API root, e.g. `http://localhost:8000/api`
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Keep the session token in memory only
    #[arg(long, global = true)]
    pub no_persist: bool,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Print records as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with mail-provider credentials
    Login(LoginArgs),
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// List received mail
    Inbox(ListArgs),
    /// List sent mail
    Sent(ListArgs),
    /// List queued outgoing mail
    Outbox(ListArgs),
    /// Encrypt and send a message
    Compose(ComposeArgs),
    /// Retry delivery of every queued message
    Retry,
    /// Show or change account settings
    Settings(SettingsArgs),
    /// Check backend and key manager health
    Health,
}

impl Command {
    /// Client route the command renders, if it needs one.
    pub const fn route(&self) -> Option<Route> {
        match self {
            Self::Login(_) => Some(Route::Login),
            Self::Whoami | Self::Inbox(_) => Some(Route::Inbox),
            Self::Sent(_) => Some(Route::Sent),
            Self::Outbox(_) | Self::Retry => Some(Route::Outbox),
            Self::Compose(_) => Some(Route::Compose),
            Self::Settings(_) => Some(Route::Settings),
            Self::Logout | Self::Health => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Mailbox address
    #[arg(long)]
    pub email: String,

    /// Mail-provider password or app password
    #[arg(long, env = "QUMAIL_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// IMAP server host
    #[arg(long)]
    pub imap_server: String,

    /// SMTP server host
    #[arg(long)]
    pub smtp_server: String,

    /// IMAP port
    #[arg(long, default_value_t = DEFAULT_IMAP_PORT)]
    pub imap_port: u16,

    /// SMTP port
    #[arg(long, default_value_t = DEFAULT_SMTP_PORT)]
    pub smtp_port: u16,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show at most this many messages
    #[arg(short = 'n', long, default_value_t = 50)]
    pub limit: usize,

    /// Print message bodies
    #[arg(long)]
    pub full: bool,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Recipient (repeatable)
    #[arg(long, required = true)]
    pub to: Vec<String>,

    /// Carbon-copy recipient (repeatable)
    #[arg(long)]
    pub cc: Vec<String>,

    /// Blind carbon-copy recipient (repeatable)
    #[arg(long)]
    pub bcc: Vec<String>,

    /// Subject line
    #[arg(short, long, default_value = "")]
    pub subject: String,

    /// Message body; read from stdin when absent
    #[arg(short, long)]
    pub body: Option<String>,

    /// Encryption mode: OTP, AES, PQC or NONE (defaults to the account setting)
    #[arg(short, long, value_parser = EncryptionMode::from_str)]
    pub mode: Option<EncryptionMode>,

    /// File to attach (repeatable)
    #[arg(short, long)]
    pub attach: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// New default encryption mode
    #[arg(long, value_parser = EncryptionMode::from_str)]
    pub default_encryption: Option<EncryptionMode>,

    /// New key manager endpoint
    #[arg(long)]
    pub km_endpoint: Option<String>,

    /// Decrypt inbound mail on fetch
    #[arg(long)]
    pub auto_decrypt: Option<bool>,
}

impl SettingsArgs {
    /// Returns true if any setting is being changed.
    pub const fn has_changes(&self) -> bool {
        self.default_encryption.is_some() || self.km_endpoint.is_some() || self.auto_decrypt.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_compose_parses_mode() {
        let cli = Cli::try_parse_from([
            "qumail", "compose", "--to", "bob@example.com", "--mode", "otp", "-s", "Hi", "-b", "Body",
        ])
        .unwrap();
        assert_eq!(cli.command.route(), Some(Route::Compose));
        let Command::Compose(args) = cli.command else {
            panic!("expected compose");
        };
        assert_eq!(args.mode, Some(EncryptionMode::Otp));
        assert_eq!(args.to, vec!["bob@example.com".to_string()]);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let result = Cli::try_parse_from(["qumail", "compose", "--to", "b@c.d", "--mode", "rot13"]);
        assert!(result.is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_settings_default_encryption() {
        let cli = Cli::try_parse_from(["qumail", "settings", "--default-encryption", "pqc"]).unwrap();
        let Command::Settings(args) = cli.command else {
            panic!("expected settings");
        };
        assert_eq!(args.default_encryption, Some(EncryptionMode::Pqc));
        assert!(args.has_changes());

        let result = Cli::try_parse_from(["qumail", "settings", "--default-encryption", "rot13"]);
        assert!(result.is_err());
    }
}
