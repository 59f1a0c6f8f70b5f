//! Terminal output.

use std::fmt::Write as _;

use chrono::Local;
use qumail_core::{
    EmailRecord, Folder, Health, Identity, MessageState, OutboxSummary, RetryReport, Settings,
};

const SUBJECT_WIDTH: usize = 48;

/// One line per record, newest first, followed by bodies when `full` is set.
pub fn mailbox(folder: Folder, records: &[EmailRecord], limit: usize, full: bool) -> String {
    let mut sorted: Vec<&EmailRecord> = records.iter().collect();
    sorted.sort_by_key(|r| std::cmp::Reverse(r.timestamp()));

    let mut out = String::new();
    if sorted.is_empty() {
        let _ = writeln!(out, "{folder} is empty");
        return out;
    }
    let _ = writeln!(out, "{folder} ({} messages)", sorted.len());

    for record in sorted.into_iter().take(limit) {
        let when = record.timestamp().map_or_else(
            || "-".to_string(),
            |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        );
        let party = match folder {
            Folder::Inbox => record.sender.clone(),
            Folder::Sent | Folder::Outbox => format!("to {}", record.recipients.join(", ")),
        };
        let _ = writeln!(
            out,
            "{when:<16}  [{:<14}] {:<12} {:<16} {:<32} {}",
            record.tier().label(),
            record.encryption_mode.display_name(),
            state_label(&record.state()),
            truncate(&party, 32),
            truncate(&record.subject, SUBJECT_WIDTH),
        );
        if full {
            match (record.readable_body(), &record.decryption_error) {
                (Some(body), _) => {
                    for line in body.lines() {
                        let _ = writeln!(out, "    {line}");
                    }
                }
                (None, Some(reason)) => {
                    let _ = writeln!(out, "    [could not decrypt: {reason}]");
                }
                (None, None) => {
                    let _ = writeln!(out, "    [no readable body]");
                }
            }
        }
    }
    out
}

fn state_label(state: &MessageState) -> &str {
    match state {
        MessageState::Inbound(status) => status.as_str(),
        MessageState::Outbound(status) => status.as_str(),
        MessageState::Unspecified => "",
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn identity(identity: &Identity) -> String {
    match &identity.km_session_id {
        Some(km) => format!("{} (key manager session {km})", identity.email),
        None => identity.email.clone(),
    }
}

pub fn outbox_summary(summary: OutboxSummary) -> String {
    format!("{} queued, {} failed", summary.queued, summary.failed)
}

pub fn retry(report: &RetryReport) -> String {
    let mut out = report.to_string();
    if report.remaining() > 0 {
        let _ = write!(out, "; {} still queued", report.remaining());
    }
    if !report.refreshed {
        out.push_str(" (outbox listing could not be refreshed)");
    }
    out
}

pub fn settings(settings: &Settings) -> String {
    format!(
        "default encryption: {} ({})\nkey manager:        {}\nauto decrypt:       {}",
        settings.default_encryption,
        settings.default_encryption.display_name(),
        settings.km_endpoint,
        settings.auto_decrypt,
    )
}

pub fn health(health: &Health) -> String {
    let mut out = format!(
        "backend:     {} (version {})\nkey manager: {}",
        health.status, health.version, health.km_status.status
    );
    if let Some(keys) = health.km_status.total_keys {
        let _ = write!(out, ", {keys} keys");
    }
    if let Some(sessions) = health.km_status.active_sessions {
        let _ = write!(out, ", {sessions} sessions");
    }
    out
}
