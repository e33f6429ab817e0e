//! The reader side of the emulated tag protocol.
//!
//! [`EmulatedTagReader`] performs the exchange an NFC reader runs against a
//! device emulating a FlagCarrier tag:
//!
//! 1. `SELECT` the FlagCarrier AID
//! 2. `UPDATE BINARY` with a challenge, which makes the device generate and
//!    sign a record for this session
//! 3. `READ BINARY` in chunks until an empty chunk marks the end
//!
//! # Example
//!
//! ```ignore
//! use flagcarrier_core::hce::reader::EmulatedTagReader;
//!
//! let mut reader = EmulatedTagReader::new(transport);
//! let message = reader.read_message(&uid)?;
//! let record = codec.parse_message(&message, Some(&uid))?;
//! ```

use tracing::debug;

use super::Transport;
use super::apdu::{Apdu, CLA_DEFAULT, ins};
use super::service::{FLAGCARRIER_AID, MAX_READ_LEN, MAX_READ_OFFSET};
use crate::error::{Error, Result};
use crate::ndef::NdefMessage;

/// Reads records from a device emulating a FlagCarrier tag.
#[derive(Debug)]
pub struct EmulatedTagReader<T: Transport> {
    /// The underlying transport.
    transport: T,

    /// Whether the application has been selected.
    selected: bool,
}

impl<T: Transport> EmulatedTagReader<T> {
    /// Creates a reader over `transport`.
    ///
    /// # Arguments
    ///
    /// * `transport` - The transport layer for communication
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            selected: false,
        }
    }

    /// Returns `true` once [`select`](Self::select) succeeded.
    #[must_use]
    pub const fn is_selected(&self) -> bool {
        self.selected
    }

    /// Consumes the reader and returns the transport.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Selects the FlagCarrier application.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedStatusWord`] if the device does not host
    /// the application.
    pub fn select(&mut self) -> Result<()> {
        let apdu = Apdu::new(CLA_DEFAULT, ins::SELECT, 0x04, 0x00, FLAGCARRIER_AID.to_vec());
        self.send(&apdu)?;

        self.selected = true;
        Ok(())
    }

    /// Asks the device to generate a record signed against `challenge`.
    ///
    /// # Arguments
    ///
    /// * `challenge` - Extra data mixed into the signature, typically the
    ///   reader-chosen tag identifier (at most 255 bytes)
    ///
    /// # Errors
    ///
    /// - [`Error::SerializationError`] if the challenge does not fit one
    ///   command
    /// - [`Error::UnexpectedStatusWord`] if the device has nothing to publish
    ///   or failed to generate the record
    pub fn request(&mut self, challenge: &[u8]) -> Result<()> {
        if challenge.len() > usize::from(u8::MAX) {
            return Err(Error::SerializationError(format!(
                "challenge of {} bytes does not fit one command",
                challenge.len()
            )));
        }

        let apdu = Apdu::new(CLA_DEFAULT, ins::UPDATE_BINARY, 0x00, 0x00, challenge.to_vec());
        self.send(&apdu)?;
        Ok(())
    }

    /// Reads the generated buffer to its end.
    ///
    /// # Errors
    ///
    /// - [`Error::DataTooLong`] if the buffer extends past the highest
    ///   readable offset
    /// - [`Error::UnexpectedStatusWord`] if a read is rejected
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();

        loop {
            let offset = u16::try_from(buffer.len())
                .ok()
                .filter(|offset| *offset <= MAX_READ_OFFSET)
                .ok_or(Error::DataTooLong(usize::from(MAX_READ_OFFSET)))?;
            let [p1, p2] = offset.to_be_bytes();

            let apdu = Apdu::with_le(
                CLA_DEFAULT,
                ins::READ_BINARY,
                p1,
                p2,
                vec![],
                MAX_READ_LEN as u16,
            );
            let chunk = self.send(&apdu)?;
            if chunk.is_empty() {
                break;
            }
            buffer.extend_from_slice(&chunk);
        }

        debug!(len = buffer.len(), "read emulated tag");
        Ok(buffer)
    }

    /// Runs the full exchange and parses the served NDEF message.
    ///
    /// # Arguments
    ///
    /// * `challenge` - Extra data the device signs the record against
    ///
    /// # Errors
    ///
    /// Returns any error of [`select`](Self::select),
    /// [`request`](Self::request) or [`read_all`](Self::read_all), or
    /// [`Error::MalformedNdef`] if the buffer is not an NDEF message.
    pub fn read_message(&mut self, challenge: &[u8]) -> Result<NdefMessage> {
        self.select()?;
        self.request(challenge)?;
        let buffer = self.read_all()?;
        NdefMessage::from_bytes(&buffer)
    }

    fn send(&mut self, apdu: &Apdu) -> Result<Vec<u8>> {
        let response = self.transport.transmit(apdu)?;
        if !response.is_success() {
            return Err(Error::UnexpectedStatusWord(response.status_word()));
        }
        Ok(response.into_data())
    }
}
