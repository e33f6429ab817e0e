//! Error types for the FlagCarrier core library.
//!
//! This module provides a single error type [`enum@Error`] covering every
//! failure the codec, the signature engine and the configuration layer can
//! report. All of them describe corrupt, adversarial or misconfigured input;
//! none are transient, so callers surface them instead of retrying.
//!
//! # Error Categories
//!
//! - **Signature errors**: key and signature size validation
//! - **Codec errors**: field serialization, compression and parsing
//! - **NDEF errors**: message framing and record lookup
//! - **Configuration errors**: key strings, form input and provisioning tags
//!
//! The card-emulation service does not use this type at its boundary: the
//! reader only ever sees status words.
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::Error;
//!
//! let err = Error::InvalidKeySize(16);
//! assert_eq!(err.to_string(), "invalid private key size for signing: 16 bytes");
//! ```

use base64::DecodeError;
use core::result::Result as CoreResult;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The main error type for the FlagCarrier core library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Signature Engine Errors
    // =========================================================================
    /// The private key is neither a bare seed nor a seed/public-key pair.
    #[error("invalid private key size for signing: {0} bytes")]
    InvalidKeySize(usize),

    /// The signature does not have the fixed Ed25519 signature size.
    #[error("signature size is invalid for verification: {0} bytes")]
    InvalidSignatureSize(usize),

    /// The public key does not have the fixed Ed25519 public key size.
    #[error("public key size is invalid for verification: {0} bytes")]
    InvalidPublicKeySize(usize),

    // =========================================================================
    // Record Codec Errors
    // =========================================================================
    /// A key or value could not be serialized (over the length-prefix limit).
    #[error("data generation failed: {0}")]
    SerializationError(String),

    /// The compressor reported an error while draining its output.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// The payload is not a valid zlib/deflate stream.
    #[error("malformed deflate data: {0}")]
    MalformedCompressedData(String),

    /// A field has an invalid encoding.
    #[error("malformed data on tag: {0}")]
    MalformedField(String),

    /// The field stream ended in the middle of a field.
    #[error("incomplete data on tag")]
    IncompleteData,

    // =========================================================================
    // NDEF Errors
    // =========================================================================
    /// The NDEF message bytes are malformed.
    #[error("malformed NDEF message: {0}")]
    MalformedNdef(String),

    /// The NDEF message carries no record of the application's MIME type.
    #[error("no supported record in NDEF message")]
    NoSupportedRecord,

    // =========================================================================
    // Emulated Tag Reader Errors
    // =========================================================================
    /// The emulated tag answered with a status word other than success.
    #[error("unexpected status word: {0:#06x}")]
    UnexpectedStatusWord(u16),

    /// The emulated tag's response was too short to carry a status word.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The record served by the emulated tag does not fit the address space.
    #[error("emulated tag data exceeds {0} bytes")]
    DataTooLong(usize),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A base64 key string could not be decoded.
    #[error("base64 decoding failed: {0}")]
    InvalidBase64(String),

    /// The free-text extra data of the write form is invalid.
    #[error("invalid extra data: {0}")]
    InvalidExtraData(String),

    /// A provisioning tag references settings it does not carry.
    #[error("malformed settings: {0}")]
    MalformedSettings(String),

    /// The settings document could not be loaded.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::InvalidBase64(err.to_string())
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Error::ConfigError(err.to_string())
    }
}

/// A specialized [`Result`] type for FlagCarrier operations.
pub type Result<T> = CoreResult<T, Error>;

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::{Value, from_str};

    use super::*;

    #[test]
    fn error_display() {
        let err = Error::IncompleteData;
        assert_eq!(err.to_string(), "incomplete data on tag");

        let err = Error::InvalidPublicKeySize(31);
        assert_eq!(
            err.to_string(),
            "public key size is invalid for verification: 31 bytes"
        );

        let err = Error::MalformedField("bad continuation byte".to_string());
        assert_eq!(err.to_string(), "malformed data on tag: bad continuation byte");
    }

    #[test]
    fn error_is_non_exhaustive() {
        let err = Error::NoSupportedRecord;
        match err {
            Error::NoSupportedRecord => {}
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn from_base64_error() {
        let b64_err = STANDARD.decode("not*base64").unwrap_err();
        let err: Error = b64_err.into();
        assert!(matches!(err, Error::InvalidBase64(_)));
    }

    #[test]
    fn from_json_error() {
        let json_err = from_str::<Value>("{ broken").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
