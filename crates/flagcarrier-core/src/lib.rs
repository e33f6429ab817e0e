//! FlagCarrier Core Library
//!
//! This crate provides the tag format and card-emulation service behind
//! FlagCarrier, a system for tapping NFC tags that carry player information
//! (display names, country codes, streaming handles) onto a reader.
//!
//! # Overview
//!
//! A tag holds a small key/value record. The record is serialized as a
//! stream of length-prefixed strings, optionally signed with Ed25519,
//! compressed with zlib and wrapped in an NDEF message. Signatures can be
//! bound to the tag they were written to by mixing the tag identifier into
//! the signed data, so a copied tag no longer verifies.
//!
//! This library provides:
//!
//! - **Records**: the [`TagRecord`] map and its well-known keys
//! - **Codec**: serialization, signing, compression and NDEF framing
//! - **Crypto**: Ed25519 key generation, signing and verification
//! - **Host Card Emulation**: an APDU service that lets a device act as a tag
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │   TagRecord   │  KeySettings  │  Challenge   │  Extra data  │
//! │               │               │  (tag UID)   │   parsing    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                        Tag Codec                             │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────────────┐ │
//! │  │  Field  │  │ Ed25519 │  │  zlib   │  │      NDEF       │ │
//! │  │ Stream  │  │  Sign   │  │ Deflate │  │    Framing      │ │
//! │  └─────────┘  └─────────┘  └─────────┘  └─────────────────┘ │
//! ├─────────────────────────────────────────────────────────────┤
//! │         Physical Tag  /  Host Card Emulation (APDU)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Writing and Reading a Signed Tag
//!
//! ```rust
//! use flagcarrier_core::challenge::{TagTechnology, extra_sign_data};
//! use flagcarrier_core::{KeyPair, SignatureStatus, TagCodec, TagRecord};
//!
//! let pair = KeyPair::from_seed(&[7u8; 32]);
//! let codec = TagCodec::new()
//!     .with_private_key(pair.private_key().to_vec())
//!     .with_public_key(pair.public_key().to_vec());
//!
//! let uid = [0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6];
//! let extra = extra_sign_data(&uid, Some(TagTechnology::MifareUltralight));
//!
//! let record: TagRecord = [("display_name", "runner"), ("country_code", "DE")]
//!     .into_iter()
//!     .collect();
//! let message = codec.generate_message(&record, Some(extra.as_slice())).unwrap();
//!
//! let decoded = codec.parse_message(&message, Some(extra.as_slice())).unwrap();
//! assert_eq!(decoded.get("display_name"), Some("runner"));
//! assert_eq!(decoded.signature_status(), SignatureStatus::Valid);
//! ```
//!
//! ## Loading Keys from Settings
//!
//! ```rust
//! use flagcarrier_core::TagCodec;
//! use flagcarrier_core::config::KeySettings;
//!
//! let settings = KeySettings::from_json("{}").unwrap();
//! let codec = TagCodec::from_settings(&settings).unwrap();
//! assert!(!codec.has_private_key());
//! ```
//!
//! # Host Card Emulation
//!
//! The [`hce`] module answers reader commands for a device emulating a
//! tag. The platform's NFC stack drives it through the
//! [`hce::ApduService`] trait; see the module documentation for the
//! protocol.
//!
//! # Security Considerations
//!
//! - Only a signature at the very start of the payload is honored
//! - A `sig_valid` entry stored on a tag is discarded on decode
//! - Decoding never trusts unsigned data: without a public key no
//!   signature status is reported at all

// Modules
pub mod challenge;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hce;
pub mod ndef;
pub mod record;

// Re-exports for convenience
pub use codec::TagCodec;
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use record::{SignatureStatus, TagRecord};
