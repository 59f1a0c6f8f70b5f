//! Derived security tier of a message.
//!
//! The tier is never stored. It is recomputed from the encryption mode and
//! the record's state machine position whenever a record is shown.

use std::fmt;

use crate::model::{DecryptionStatus, EmailRecord, EncryptionMode, MessageState};

/// Security badge shown for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityTier {
    /// Keyed from the quantum key manager (OTP or AES).
    QuantumSecure,
    /// Post-quantum key encapsulation.
    PqcProtected,
    /// Only transport TLS protects the message.
    TlsOnly,
    /// Received but could not be decrypted.
    Unreadable,
    /// Mode this client does not know.
    Unknown,
}

impl SecurityTier {
    /// Badge label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::QuantumSecure => "Quantum Secure",
            Self::PqcProtected => "PQC Protected",
            Self::TlsOnly => "TLS Only",
            Self::Unreadable => "Unreadable",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SecurityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tier for a mode and state.
///
/// A failed decryption wins over the mode.
#[must_use]
pub const fn tier(mode: &EncryptionMode, state: &MessageState) -> SecurityTier {
    if let MessageState::Inbound(DecryptionStatus::Error) = state {
        return SecurityTier::Unreadable;
    }
    match mode {
        EncryptionMode::Otp | EncryptionMode::Aes => SecurityTier::QuantumSecure,
        EncryptionMode::Pqc => SecurityTier::PqcProtected,
        EncryptionMode::None => SecurityTier::TlsOnly,
        EncryptionMode::Unknown(_) => SecurityTier::Unknown,
    }
}

/// Returns true if moving from `from` to `to` keeps status monotone.
///
/// A record never switches between the inbound and outbound machines.
#[must_use]
pub fn is_forward(from: &MessageState, to: &MessageState) -> bool {
    match (from, to) {
        (MessageState::Inbound(a), MessageState::Inbound(b)) => a.can_advance_to(b),
        (MessageState::Outbound(a), MessageState::Outbound(b)) => a.can_advance_to(b),
        (MessageState::Unspecified, _) => true,
        (MessageState::Inbound(_) | MessageState::Outbound(_), _) => false,
    }
}

impl EmailRecord {
    /// Security tier of this record.
    #[must_use]
    pub fn tier(&self) -> SecurityTier {
        tier(&self.encryption_mode, &self.state())
    }
}
