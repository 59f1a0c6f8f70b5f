//! Email records as returned by the backend.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Per-message encryption selected at send time.
///
/// Unrecognized values are kept as [`EncryptionMode::Unknown`] so one odd
/// record does not fail a whole mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EncryptionMode {
    /// One-time pad keyed from the key manager.
    Otp,
    /// AES-256-GCM keyed from the key manager.
    #[default]
    Aes,
    /// Post-quantum key encapsulation.
    Pqc,
    /// No message-level encryption; transport TLS only.
    None,
    /// Value this client does not know.
    Unknown(String),
}

impl EncryptionMode {
    /// Modes a user can pick when composing.
    pub const SELECTABLE: [Self; 4] = [Self::Otp, Self::Aes, Self::Pqc, Self::None];

    /// Parses a wire value; never fails.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "OTP" => Self::Otp,
            "AES" => Self::Aes,
            "PQC" => Self::Pqc,
            "NONE" => Self::None,
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Otp => "OTP",
            Self::Aes => "AES",
            Self::Pqc => "PQC",
            Self::None => "NONE",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Otp => "One-Time Pad",
            Self::Aes => "AES-256-GCM",
            Self::Pqc => "Post-Quantum",
            Self::None => "None",
            Self::Unknown(s) => s.as_str(),
        }
    }
}

impl From<String> for EncryptionMode {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<EncryptionMode> for String {
    fn from(mode: EncryptionMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionMode {
    type Err = String;

    /// Strict parse for user input: only the four known modes are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::parse(s) {
            Self::Unknown(other) => Err(format!(
                "unknown encryption mode '{other}' (expected OTP, AES, PQC or NONE)"
            )),
            mode => Ok(mode),
        }
    }
}

/// Outcome of decrypting a received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DecryptionStatus {
    /// Decrypted and verified.
    Success,
    /// Decryption or MAC verification failed.
    Error,
    /// Not attempted yet.
    Pending,
    /// Value this client does not know.
    Unknown(String),
}

impl DecryptionStatus {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Pending => "pending",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Returns true if a record may move from `self` to `next`.
    ///
    /// Staying put is always allowed; `pending` is the only non-final state.
    #[must_use]
    pub fn can_advance_to(&self, next: &Self) -> bool {
        self == next || matches!((self, next), (Self::Pending, Self::Success | Self::Error))
    }
}

impl From<String> for DecryptionStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "error" => Self::Error,
            "pending" => Self::Pending,
            _ => Self::Unknown(s),
        }
    }
}

impl From<DecryptionStatus> for String {
    fn from(status: DecryptionStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Delivery state of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeliveryStatus {
    /// Handed to the mail server.
    Sent,
    /// Waiting in the outbox for a retry.
    Queued,
    /// Delivery given up.
    Failed,
    /// Inbound message stored by the backend.
    Received,
    /// Value this client does not know.
    Unknown(String),
}

impl DeliveryStatus {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sent => "sent",
            Self::Queued => "queued",
            Self::Failed => "failed",
            Self::Received => "received",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Returns true if a record may move from `self` to `next`.
    ///
    /// Staying put is always allowed; `queued` is the only non-final state.
    #[must_use]
    pub fn can_advance_to(&self, next: &Self) -> bool {
        self == next || matches!((self, next), (Self::Queued, Self::Sent | Self::Failed))
    }
}

impl From<String> for DeliveryStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "sent" => Self::Sent,
            "queued" => Self::Queued,
            "failed" => Self::Failed,
            "received" => Self::Received,
            _ => Self::Unknown(s),
        }
    }
}

impl From<DeliveryStatus> for String {
    fn from(status: DeliveryStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Which state machine a record is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageState {
    /// Received message with a decryption outcome.
    Inbound(DecryptionStatus),
    /// Outgoing message with a delivery status.
    Outbound(DeliveryStatus),
    /// Neither field was reported.
    Unspecified,
}

/// Attachment metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// File name.
    pub filename: String,
    /// MIME type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// An email as cached by a mailbox view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Backend row id (outbox records).
    #[serde(default)]
    pub id: Option<i64>,
    /// IMAP UID (inbox and sent records).
    #[serde(default)]
    pub uid: Option<String>,
    /// `Message-ID` header.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Sender address.
    #[serde(default)]
    pub sender: String,
    /// Recipients; the backend reports them as `to` or `recipients`.
    #[serde(default, alias = "to", deserialize_with = "addresses")]
    pub recipients: Vec<String>,
    /// Carbon-copy recipients.
    #[serde(default, deserialize_with = "addresses")]
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients.
    #[serde(default, deserialize_with = "addresses")]
    pub bcc: Vec<String>,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Plain-text body.
    #[serde(default)]
    pub body: Option<String>,
    /// `Date` header.
    #[serde(default)]
    pub date: Option<String>,
    /// Send time for outbox records.
    #[serde(default)]
    pub date_sent: Option<String>,
    /// Storage time for outbox records.
    #[serde(default)]
    pub date_received: Option<String>,
    /// Encryption applied at send time.
    #[serde(default = "unencrypted")]
    pub encryption_mode: EncryptionMode,
    /// Decryption outcome (inbound).
    #[serde(default)]
    pub decryption_status: Option<DecryptionStatus>,
    /// Reason decryption failed.
    #[serde(default)]
    pub decryption_error: Option<String>,
    /// Delivery status (outbound).
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    /// Key manager key used.
    #[serde(default)]
    pub km_key_id: Option<String>,
    /// Backend folder name.
    #[serde(default)]
    pub folder: Option<String>,
    /// Read flag.
    #[serde(default)]
    pub read: bool,
    /// Flagged/starred.
    #[serde(default)]
    pub flagged: bool,
    /// Attachment metadata.
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
}

impl EmailRecord {
    /// State machine position of this record.
    ///
    /// A decryption status marks the record as inbound even if the backend
    /// also reports a storage status.
    #[must_use]
    pub fn state(&self) -> MessageState {
        match (&self.decryption_status, &self.status) {
            (Some(decryption), _) => MessageState::Inbound(decryption.clone()),
            (None, Some(delivery)) => MessageState::Outbound(delivery.clone()),
            (None, None) => MessageState::Unspecified,
        }
    }

    /// Body, if it is readable plaintext.
    ///
    /// Only successfully decrypted inbound records and unencrypted records
    /// expose a body. Outbound listings carry the stored ciphertext, so an
    /// encrypted outbound record never does.
    #[must_use]
    pub fn readable_body(&self) -> Option<&str> {
        let readable = match self.state() {
            MessageState::Inbound(DecryptionStatus::Success) => true,
            MessageState::Inbound(_) | MessageState::Outbound(_) | MessageState::Unspecified => {
                self.encryption_mode == EncryptionMode::None
            }
        };
        if readable { self.body.as_deref() } else { None }
    }

    /// Stable key for matching the same record across refreshes.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.id
            .map(|id| format!("id:{id}"))
            .or_else(|| self.uid.as_ref().map(|uid| format!("uid:{uid}")))
            .or_else(|| {
                self.message_id
                    .as_ref()
                    .filter(|m| !m.is_empty())
                    .map(|m| format!("mid:{m}"))
            })
    }

    /// Best available timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        [&self.date, &self.date_sent, &self.date_received]
            .into_iter()
            .flatten()
            .find_map(|raw| parse_date(raw.as_str()))
    }
}

/// Records without a mode header were sent without message encryption.
const fn unencrypted() -> EncryptionMode {
    EncryptionMode::None
}

/// Parses RFC 2822 headers, RFC 3339, and the backend's naive ISO timestamps
/// (taken as UTC).
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Accepts a list of addresses, a comma separated string, or null.
fn addresses<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    let list = match raw {
        None => Vec::new(),
        Some(Raw::List(list)) => list,
        Some(Raw::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(list
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbox_record() {
        let record: EmailRecord = serde_json::from_value(json!({
            "uid": "42",
            "message_id": "<abc@example.com>",
            "sender": "bob@example.com",
            "to": "alice@example.com, carol@example.com",
            "cc": "",
            "subject": "[QuMail Encrypted - AES]",
            "date": "Tue, 14 Oct 2025 09:30:00 +0000",
            "encryption_mode": "AES",
            "body": "hello",
            "decryption_status": "success",
            "attachments": [{"filename": "a.pdf", "content_type": "application/pdf", "size": 10}]
        }))
        .unwrap();

        assert_eq!(record.recipients, vec!["alice@example.com", "carol@example.com"]);
        assert!(record.cc.is_empty());
        assert_eq!(record.encryption_mode, EncryptionMode::Aes);
        assert_eq!(record.state(), MessageState::Inbound(DecryptionStatus::Success));
        assert_eq!(record.readable_body(), Some("hello"));
        assert_eq!(record.key().as_deref(), Some("uid:42"));
        assert!(record.timestamp().is_some());
        assert_eq!(record.attachments[0].size, 10);
    }

    #[test]
    fn test_outbox_record() {
        let record: EmailRecord = serde_json::from_value(json!({
            "id": 7,
            "uid": null,
            "sender": "alice@example.com",
            "recipients": ["bob@example.com"],
            "cc": [],
            "bcc": [],
            "subject": "Draft",
            "body": "ciphertext",
            "encryption_mode": "OTP",
            "status": "queued",
            "folder": "INBOX",
            "read": false,
            "flagged": false,
            "date_sent": null,
            "date_received": "2025-10-14T09:30:00"
        }))
        .unwrap();

        assert_eq!(record.recipients, vec!["bob@example.com"]);
        assert_eq!(record.state(), MessageState::Outbound(DeliveryStatus::Queued));
        assert_eq!(record.key().as_deref(), Some("id:7"));
        assert_eq!(
            record.timestamp().unwrap().to_rfc3339(),
            "2025-10-14T09:30:00+00:00"
        );
        assert_eq!(record.readable_body(), None);
    }

    #[test]
    fn test_unencrypted_outbound_body_is_readable() {
        let record: EmailRecord = serde_json::from_value(json!({
            "id": 8,
            "body": "plain text",
            "encryption_mode": "NONE",
            "status": "sent"
        }))
        .unwrap();
        assert_eq!(record.readable_body(), Some("plain text"));
    }

    #[test]
    fn test_failed_decryption_hides_body() {
        let record: EmailRecord = serde_json::from_value(json!({
            "sender": "bob@example.com",
            "subject": "[QuMail Encrypted - PQC]",
            "body": "opaque",
            "encryption_mode": "PQC",
            "decryption_status": "error",
            "decryption_error": "PQC decryption requires recipient's secret key"
        }))
        .unwrap();
        assert_eq!(record.readable_body(), None);
    }

    #[test]
    fn test_unknown_values_are_preserved() {
        let record: EmailRecord = serde_json::from_value(json!({
            "encryption_mode": "ROT13",
            "decryption_status": "mangled"
        }))
        .unwrap();
        assert_eq!(record.encryption_mode, EncryptionMode::Unknown("ROT13".into()));
        assert_eq!(
            record.decryption_status,
            Some(DecryptionStatus::Unknown("mangled".into()))
        );
        assert_eq!(
            serde_json::to_value(&record.encryption_mode).unwrap(),
            json!("ROT13")
        );
    }

    #[test]
    fn test_missing_mode_defaults() {
        let record: EmailRecord = serde_json::from_value(json!({})).unwrap();
        assert_eq!(record.encryption_mode, EncryptionMode::None);
        assert_eq!(record.state(), MessageState::Unspecified);
        assert_eq!(record.key(), None);
    }

    #[test]
    fn test_mode_from_str_is_strict() {
        assert_eq!("otp".parse::<EncryptionMode>().unwrap(), EncryptionMode::Otp);
        assert_eq!("NONE".parse::<EncryptionMode>().unwrap(), EncryptionMode::None);
        assert!("ROT13".parse::<EncryptionMode>().is_err());
    }

    #[test]
    fn test_status_transitions_are_monotone() {
        use DecryptionStatus as D;
        use DeliveryStatus as S;

        assert!(D::Pending.can_advance_to(&D::Success));
        assert!(D::Pending.can_advance_to(&D::Error));
        assert!(D::Success.can_advance_to(&D::Success));
        assert!(!D::Success.can_advance_to(&D::Pending));
        assert!(!D::Error.can_advance_to(&D::Success));

        assert!(S::Queued.can_advance_to(&S::Sent));
        assert!(S::Queued.can_advance_to(&S::Failed));
        assert!(!S::Sent.can_advance_to(&S::Queued));
        assert!(!S::Failed.can_advance_to(&S::Sent));
    }
}
