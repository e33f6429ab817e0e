//! Key settings supplied by the settings store.
//!
//! The store keeps both halves of the signing key pair as base64 strings
//! under `pub_key` and `priv_key`. Either may be missing or empty:
//!
//! - no `priv_key`: tags are written unsigned
//! - no `pub_key`: tags are read without verification
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::config::KeySettings;
//!
//! let settings = KeySettings::from_json(r#"{ "pub_key": "", "device_id": "x" }"#).unwrap();
//! assert!(settings.public_key().unwrap().is_none());
//! assert!(settings.private_key().unwrap().is_none());
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::crypto::KeyPair;
use crate::error::Result;

/// Base64 key strings as stored by the settings store.
///
/// Unknown fields of the settings document are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySettings {
    /// Base64 public key used to verify tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_key: Option<String>,

    /// Base64 private key (`seed || public key`) used to sign tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priv_key: Option<String>,
}

impl KeySettings {
    /// Loads settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`](crate::Error::ConfigError) if the
    /// document is not valid JSON or the key fields are not strings.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the settings to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`](crate::Error::ConfigError) if
    /// serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Encodes a freshly generated key pair, replacing both keys.
    #[must_use]
    pub fn from_key_pair(pair: &KeyPair) -> Self {
        Self {
            pub_key: Some(STANDARD.encode(pair.public_key())),
            priv_key: Some(STANDARD.encode(pair.private_key())),
        }
    }

    /// Decodes the public key, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBase64`](crate::Error::InvalidBase64) if the
    /// string is not valid base64.
    pub fn public_key(&self) -> Result<Option<Vec<u8>>> {
        decode_key(self.pub_key.as_deref())
    }

    /// Decodes the private key, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBase64`](crate::Error::InvalidBase64) if the
    /// string is not valid base64.
    pub fn private_key(&self) -> Result<Option<Vec<u8>>> {
        decode_key(self.priv_key.as_deref())
    }
}

fn decode_key(value: Option<&str>) -> Result<Option<Vec<u8>>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let compact: String = value.split_whitespace().collect();
    Ok(Some(STANDARD.decode(compact)?))
}
