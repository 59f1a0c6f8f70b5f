//! `QuMail` - command-line client for the quantum-secure email backend.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the password may also come from QUMAIL_PASSWORD)
//! qumail login --email alice@example.com --imap-server imap.example.com \
//!     --smtp-server smtp.example.com
//!
//! # Read mail, send with one-time pad encryption, retry the outbox
//! qumail inbox --full
//! qumail compose --to bob@example.com --subject Hi --mode OTP --body "Hello"
//! qumail retry
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod render;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use qumail_core::{
    Admission, ClientConfig, ComposeStatus, Draft, DraftAttachment, Error, Folder, HttpTransport,
    LoginCredentials, QuMail, Route,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, ComposeArgs, ListArgs, LoginArgs, SettingsArgs};

type Client = QuMail<HttpTransport>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        cli.log_level.as_ref().map_or_else(
            || EnvFilter::new("qumail=info,qumail_core=info"),
            |level| EnvFilter::new(format!("qumail={level},qumail_core={level}")),
        )
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(&cli).await?;
    let client = QuMail::connect(&config).context("Could not set up the client")?;
    let mut events = client.session().events();

    let result = run(&client, cli.command, cli.json).await;
    client.process_events(&mut events);

    if let Err(e) = &result {
        if e.downcast_ref::<Error>().is_some_and(Error::is_session_invalidated) {
            eprintln!("Your session has expired. Run `qumail login` to sign in again.");
        }
    }
    result
}

/// Config file, then environment, then command-line flags.
async fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ClientConfig::load(path)
                .await
                .with_context(|| format!("Could not read config {}", path.display()))?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config
        }
        None => ClientConfig::load_default()
            .await
            .context("Could not read config")?,
    };
    if let Some(url) = &cli.api_url {
        config.api_base_url.clone_from(url);
    }
    if cli.no_persist {
        config.persist_credentials = false;
    }
    debug!(?config, "Effective config");
    Ok(config)
}

async fn run(client: &Client, command: Command, json: bool) -> Result<()> {
    if matches!(command, Command::Health) {
        return health(client, json).await;
    }

    let phase = client.controller().hydrate().await?;
    debug!(phase = phase.name(), "Session hydrated");

    if let Some(route) = command.route() {
        match client.navigator().navigate(route) {
            Admission::Admit => {}
            Admission::Redirect(Route::Login) => {
                bail!("Not signed in. Run `qumail login` first.")
            }
            Admission::Redirect(_) => {
                // Only the login route redirects an authenticated session.
                if let Some(identity) = client.controller().identity() {
                    println!("Already signed in as {}", render::identity(&identity));
                }
                return Ok(());
            }
            Admission::Defer => bail!("Session is still loading"),
        }
    }

    match command {
        Command::Login(args) => login(client, args).await,
        Command::Logout => {
            client.controller().logout().await;
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => {
            if let Some(identity) = client.controller().identity() {
                println!("{}", render::identity(&identity));
            }
            Ok(())
        }
        Command::Inbox(args) => list(client, Folder::Inbox, &args, json).await,
        Command::Sent(args) => list(client, Folder::Sent, &args, json).await,
        Command::Outbox(args) => list(client, Folder::Outbox, &args, json).await,
        Command::Compose(args) => compose(client, args).await,
        Command::Retry => {
            let report = client.outbox().retry().await?;
            println!("{}", render::retry(&report));
            Ok(())
        }
        Command::Settings(args) => settings(client, args, json).await,
        Command::Health => health(client, json).await,
    }
}

async fn login(client: &Client, args: LoginArgs) -> Result<()> {
    let credentials = LoginCredentials {
        email: args.email,
        password: args.password,
        imap_server: args.imap_server,
        smtp_server: args.smtp_server,
        imap_port: args.imap_port,
        smtp_port: args.smtp_port,
    };
    let identity = client.controller().login(credentials).await?;
    println!("Signed in as {}", render::identity(&identity));
    Ok(())
}

async fn list(client: &Client, folder: Folder, args: &ListArgs, json: bool) -> Result<()> {
    let view = client.mailboxes().get(folder);
    let records = view.refresh(client.api()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    print!("{}", render::mailbox(folder, &records, args.limit, args.full));
    if folder == Folder::Outbox {
        println!("{}", render::outbox_summary(client.outbox().summary()));
    }
    Ok(())
}

async fn compose(client: &Client, args: ComposeArgs) -> Result<()> {
    let body = match args.body {
        Some(body) => body,
        None => {
            let mut body = String::new();
            tokio::io::stdin()
                .read_to_string(&mut body)
                .await
                .context("Could not read message body from stdin")?;
            body
        }
    };

    let encryption_mode = match args.mode {
        Some(mode) => mode,
        None => match client.api().settings().await {
            Ok(settings) => settings.default_encryption,
            Err(e) if e.is_session_invalidated() => return Err(e.into()),
            Err(e) => {
                warn!("Could not load default encryption, using AES: {e}");
                qumail_core::EncryptionMode::default()
            }
        },
    };

    let mut attachments = Vec::with_capacity(args.attach.len());
    for path in &args.attach {
        attachments.push(read_attachment(path).await?);
    }

    let draft = Draft {
        to: args.to,
        cc: args.cc,
        bcc: args.bcc,
        subject: args.subject,
        body,
        encryption_mode,
        attachments,
    };
    info!(mode = %draft.encryption_mode, attachments = draft.attachments.len(), "Composing");

    let receipt = client.outbox().compose(&draft).await?;
    let detail = receipt.message.unwrap_or_default();
    match receipt.status {
        ComposeStatus::Sent => println!(
            "Sent with {} encryption. {detail}",
            draft.encryption_mode.display_name()
        ),
        ComposeStatus::Queued => {
            println!("Queued in the outbox; run `qumail retry` later. {detail}");
        }
    }
    Ok(())
}

async fn read_attachment(path: &Path) -> Result<DraftAttachment> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Could not read attachment {}", path.display()))?;
    let filename = path
        .file_name()
        .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(DraftAttachment {
        content_type: content_type(path).to_string(),
        filename,
        data,
    })
}

fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

async fn settings(client: &Client, args: SettingsArgs, json: bool) -> Result<()> {
    let mut settings = client.api().settings().await?;
    if args.has_changes() {
        if let Some(mode) = args.default_encryption {
            settings.default_encryption = mode;
        }
        if let Some(endpoint) = args.km_endpoint {
            settings.km_endpoint = endpoint;
        }
        if let Some(auto_decrypt) = args.auto_decrypt {
            settings.auto_decrypt = auto_decrypt;
        }
        client.api().update_settings(&settings).await?;
        info!("Settings updated");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        println!("{}", render::settings(&settings));
    }
    Ok(())
}

async fn health(client: &Client, json: bool) -> Result<()> {
    let health = client.api().health().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        println!("{}", render::health(&health));
    }
    if !health.is_healthy() {
        bail!("Backend reports degraded health");
    }
    Ok(())
}
