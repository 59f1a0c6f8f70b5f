//! Account settings and backend health.

use serde::{Deserialize, Serialize};

use super::EncryptionMode;

/// Default key manager endpoint reported by the backend.
pub const DEFAULT_KM_ENDPOINT: &str = "http://localhost:8001";

/// Per-account preferences stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Mode preselected when composing.
    #[serde(default)]
    pub default_encryption: EncryptionMode,
    /// Key manager endpoint.
    #[serde(default = "default_km_endpoint")]
    pub km_endpoint: String,
    /// Whether inbound mail is decrypted on fetch.
    #[serde(default = "default_auto_decrypt")]
    pub auto_decrypt: bool,
}

fn default_km_endpoint() -> String {
    DEFAULT_KM_ENDPOINT.to_string()
}

const fn default_auto_decrypt() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_encryption: EncryptionMode::Aes,
            km_endpoint: default_km_endpoint(),
            auto_decrypt: true,
        }
    }
}

impl Settings {
    /// Form fields for the settings update call.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            (
                "default_encryption".to_string(),
                self.default_encryption.to_string(),
            ),
            ("km_endpoint".to_string(), self.km_endpoint.clone()),
            ("auto_decrypt".to_string(), self.auto_decrypt.to_string()),
        ]
    }
}

/// Key manager health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmStatus {
    /// `healthy` or `stopped`.
    pub status: String,
    /// Open key manager sessions.
    #[serde(default)]
    pub active_sessions: Option<u64>,
    /// Keys held by the key manager.
    #[serde(default)]
    pub total_keys: Option<u64>,
}

/// Backend health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Backend status.
    pub status: String,
    /// Key manager status.
    pub km_status: KmStatus,
    /// Backend version.
    pub version: String,
}

impl Health {
    /// Returns true if both the backend and key manager report healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.km_status.status == "healthy"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let settings: Settings = serde_json::from_value(json!({"default_encryption": "OTP"})).unwrap();
        assert_eq!(settings.default_encryption, EncryptionMode::Otp);
        assert_eq!(settings.km_endpoint, DEFAULT_KM_ENDPOINT);
        assert!(settings.auto_decrypt);
    }

    #[test]
    fn test_settings_form_fields() {
        let settings = Settings {
            default_encryption: EncryptionMode::Pqc,
            km_endpoint: "http://km:9000".into(),
            auto_decrypt: false,
        };
        assert_eq!(
            settings.form_fields(),
            vec![
                ("default_encryption".to_string(), "PQC".to_string()),
                ("km_endpoint".to_string(), "http://km:9000".to_string()),
                ("auto_decrypt".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn test_health() {
        let health: Health = serde_json::from_value(json!({
            "status": "healthy",
            "km_status": {"status": "stopped", "active_sessions": 0, "total_keys": 0},
            "version": "1.0.0"
        }))
        .unwrap();
        assert!(!health.is_healthy());
        assert_eq!(health.km_status.active_sessions, Some(0));
    }
}
