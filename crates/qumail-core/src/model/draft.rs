//! Outgoing messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EncryptionMode;
use crate::gateway::MultipartField;

/// A file attached to a draft.
#[derive(Clone, PartialEq, Eq)]
pub struct DraftAttachment {
    /// File name.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Contents.
    pub data: Vec<u8>,
}

impl fmt::Debug for DraftAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DraftAttachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// A message to compose.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Encryption to apply.
    pub encryption_mode: EncryptionMode,
    /// Attached files.
    pub attachments: Vec<DraftAttachment>,
}

impl Draft {
    /// Multipart fields for the compose call.
    #[must_use]
    pub fn multipart_fields(&self) -> Vec<MultipartField> {
        let text = |name: &str, value: String| MultipartField::Text {
            name: name.to_string(),
            value,
        };
        let mut fields = vec![
            text("to", self.to.join(", ")),
            text("cc", self.cc.join(", ")),
            text("bcc", self.bcc.join(", ")),
            text("subject", self.subject.clone()),
            text("body", self.body.clone()),
            text("encryption_mode", self.encryption_mode.to_string()),
        ];
        fields.extend(self.attachments.iter().map(|a| MultipartField::File {
            name: "attachments".to_string(),
            filename: a.filename.clone(),
            content_type: a.content_type.clone(),
            data: a.data.clone(),
        }));
        fields
    }
}

/// Where a composed message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeStatus {
    /// Delivered to the mail server.
    Sent,
    /// Delivery failed; the message waits in the outbox.
    Queued,
}

/// Backend answer to a compose call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeReceipt {
    /// Delivery outcome.
    pub status: ComposeStatus,
    /// Backend message.
    #[serde(default)]
    pub message: Option<String>,
}
