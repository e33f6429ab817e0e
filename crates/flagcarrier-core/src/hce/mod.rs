//! Host card emulation of a FlagCarrier tag.
//!
//! This module lets a device act as a passive tag that an NFC reader can
//! read over APDUs. It supports:
//!
//! - Application selection by AID
//! - Per-session record generation signed against a reader challenge
//! - Chunked reads of the generated record
//! - One-time records that are consumed once fully read
//!
//! # Architecture
//!
//! The module is organized into several submodules:
//!
//! - [`apdu`]: APDU command/response types and status words
//! - [`publish`]: the shared persistent and one-time publish slots
//! - [`service`]: the session state machine answering reader commands
//! - [`reader`]: the reader side of the protocol
//!
//! # Service Abstraction
//!
//! The [`ApduService`] trait is the seam to the platform's card-emulation
//! stack: it delivers each command in order and signals when the reader
//! goes away. Readers talk through the [`Transport`] trait instead, which
//! every [`ApduService`] implements, so [`reader::EmulatedTagReader`] can
//! drive an in-process service.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use flagcarrier_core::codec::TagCodec;
//! use flagcarrier_core::hce::reader::EmulatedTagReader;
//! use flagcarrier_core::hce::{HceService, PublishedData};
//!
//! let published = Arc::new(PublishedData::new());
//! published.publish([("display_name", "runner")].into_iter().collect());
//!
//! let codec = Arc::new(TagCodec::new());
//! let mut service = HceService::new(Arc::clone(&codec), Arc::clone(&published));
//!
//! let mut reader = EmulatedTagReader::new(&mut service);
//! let message = reader.read_message(b"challenge").unwrap();
//! let record = codec.parse_message(&message, None).unwrap();
//! assert_eq!(record.get("display_name"), Some("runner"));
//! ```

pub mod apdu;
pub mod publish;
pub mod reader;
pub mod service;

pub use apdu::{Apdu, ApduResponse, StatusWord};
pub use publish::{PublishSource, Publication, PublishedData};
pub use service::{FLAGCARRIER_AID, HceService, SessionState};

use crate::error::{Error, Result};

/// Why the reader interaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeactivationReason {
    /// The NFC link to the reader was lost.
    LinkLoss,
    /// The reader selected a different application.
    Deselected,
}

impl DeactivationReason {
    /// Maps a platform deactivation code (`0` link loss, `1` deselected).
    ///
    /// Unknown codes are treated as link loss.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Deselected,
            _ => Self::LinkLoss,
        }
    }
}

/// A card-emulation service driven by the platform's NFC stack.
///
/// Commands of one interaction arrive strictly in order; the platform never
/// delivers two commands concurrently.
pub trait ApduService {
    /// Answers one raw command APDU with a raw response APDU.
    ///
    /// # Arguments
    ///
    /// * `command` - The raw command bytes
    ///
    /// # Returns
    ///
    /// The response data followed by a two-byte status word.
    fn process_command(&mut self, command: &[u8]) -> Vec<u8>;

    /// Ends the current interaction.
    fn on_deactivated(&mut self, reason: DeactivationReason);
}

impl<S: ApduService + ?Sized> ApduService for &mut S {
    fn process_command(&mut self, command: &[u8]) -> Vec<u8> {
        (**self).process_command(command)
    }

    fn on_deactivated(&mut self, reason: DeactivationReason) {
        (**self).on_deactivated(reason);
    }
}

/// Transport for exchanging APDUs with an emulated tag.
pub trait Transport {
    /// Sends an APDU command and receives a response.
    ///
    /// # Arguments
    ///
    /// * `apdu` - The APDU command to send
    ///
    /// # Returns
    ///
    /// A [`Result`] containing the APDU response.
    ///
    /// # Errors
    ///
    /// Returns an error if communication fails or the response is too short
    /// to hold a status word.
    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse>;
}

impl<S: ApduService + ?Sized> Transport for S {
    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        let raw = self.process_command(&apdu.to_bytes());
        ApduResponse::from_bytes(&raw)
            .ok_or_else(|| Error::MalformedResponse(format!("{} byte response", raw.len())))
    }
}
