//! Minimal NDEF (NFC Data Exchange Format) messages.
//!
//! Only what FlagCarrier tags need is built here: a MIME record carrying the
//! compressed tag payload and an Android application record naming the app.
//! Parsing is general enough to read any unchunked message.
//!
//! # Record Structure
//!
//! ```text
//! | flags|TNF | type len | payload len | [id len] | type | [id] | payload |
//! |-----------|----------|-------------|----------|------|------|---------|
//! | 1B        | 1B       | 1B (SR) /4B | 1B (IL)  | Var  | Var  | Var     |
//! ```
//!
//! - **MB/ME**: first/last record of the message
//! - **CF**: chunked record (not supported)
//! - **SR**: short record, 1-byte payload length
//! - **IL**: an ID length byte and ID field are present
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::ndef::{NdefMessage, NdefRecord};
//!
//! let msg = NdefMessage::new(vec![
//!     NdefRecord::mime("application/x-demo", vec![1, 2, 3]),
//!     NdefRecord::application("org.example.demo"),
//! ]).unwrap();
//!
//! let parsed = NdefMessage::from_bytes(&msg.to_bytes()).unwrap();
//! assert_eq!(parsed, msg);
//! ```

use crate::error::{Error, Result};

/// Record header flag bits.
mod flag {
    /// Message begin.
    pub(super) const MB: u8 = 0x80;

    /// Message end.
    pub(super) const ME: u8 = 0x40;

    /// Chunk flag.
    pub(super) const CF: u8 = 0x20;

    /// Short record.
    pub(super) const SR: u8 = 0x10;

    /// ID length present.
    pub(super) const IL: u8 = 0x08;

    /// Mask of the type name format bits.
    pub(super) const TNF_MASK: u8 = 0x07;
}

/// Record type of an Android application record.
pub const ANDROID_APP_RECORD_TYPE: &[u8] = b"android.com:pkg";

/// Type Name Format of an NDEF record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tnf {
    /// Empty record.
    Empty = 0x00,
    /// NFC Forum well-known type.
    WellKnown = 0x01,
    /// RFC 2046 media type.
    MimeMedia = 0x02,
    /// RFC 3986 absolute URI.
    AbsoluteUri = 0x03,
    /// NFC Forum external type.
    External = 0x04,
    /// Unknown type.
    Unknown = 0x05,
    /// Continuation of a chunked record.
    Unchanged = 0x06,
}

impl Tnf {
    const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Self::Empty),
            0x01 => Some(Self::WellKnown),
            0x02 => Some(Self::MimeMedia),
            0x03 => Some(Self::AbsoluteUri),
            0x04 => Some(Self::External),
            0x05 => Some(Self::Unknown),
            0x06 => Some(Self::Unchanged),
            _ => None,
        }
    }
}

/// A single NDEF record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    tnf: Tnf,
    record_type: Vec<u8>,
    id: Vec<u8>,
    payload: Vec<u8>,
}

impl NdefRecord {
    /// Creates a MIME media record.
    ///
    /// The media type is trimmed and lowercased, as NFC readers compare it
    /// case-insensitively.
    #[must_use]
    pub fn mime(mime_type: &str, payload: Vec<u8>) -> Self {
        Self {
            tnf: Tnf::MimeMedia,
            record_type: mime_type.trim().to_ascii_lowercase().into_bytes(),
            id: Vec::new(),
            payload,
        }
    }

    /// Creates an Android application record for `package`.
    #[must_use]
    pub fn application(package: &str) -> Self {
        Self {
            tnf: Tnf::External,
            record_type: ANDROID_APP_RECORD_TYPE.to_vec(),
            id: Vec::new(),
            payload: package.as_bytes().to_vec(),
        }
    }

    /// Returns the type name format.
    #[must_use]
    pub const fn tnf(&self) -> Tnf {
        self.tnf
    }

    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> &[u8] {
        &self.record_type
    }

    /// Returns the record ID (empty if absent).
    #[must_use]
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns `true` if this is a MIME record of `mime_type`.
    #[must_use]
    pub fn is_mime(&self, mime_type: &str) -> bool {
        self.tnf == Tnf::MimeMedia && self.record_type.eq_ignore_ascii_case(mime_type.as_bytes())
    }

    fn write(&self, out: &mut Vec<u8>, first: bool, last: bool) {
        let short = self.payload.len() < 256;

        let mut header = self.tnf as u8;
        if first {
            header |= flag::MB;
        }
        if last {
            header |= flag::ME;
        }
        if short {
            header |= flag::SR;
        }
        if !self.id.is_empty() {
            header |= flag::IL;
        }

        out.push(header);
        out.push(self.record_type.len() as u8);
        if short {
            out.push(self.payload.len() as u8);
        } else {
            out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        }
        if !self.id.is_empty() {
            out.push(self.id.len() as u8);
        }
        out.extend_from_slice(&self.record_type);
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&self.payload);
    }
}

/// An NDEF message: one or more records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefMessage {
    records: Vec<NdefRecord>,
}

impl NdefMessage {
    /// Creates a message from its records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedNdef`] if `records` is empty or a record's
    /// type or ID exceeds 255 bytes.
    pub fn new(records: Vec<NdefRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::MalformedNdef("message has no records".to_string()));
        }
        if let Some(rec) = records
            .iter()
            .find(|r| r.record_type.len() > 255 || r.id.len() > 255)
        {
            return Err(Error::MalformedNdef(format!(
                "type or id too long in record of type {}",
                String::from_utf8_lossy(&rec.record_type)
            )));
        }

        Ok(Self { records })
    }

    /// Returns the records in order.
    #[must_use]
    pub fn records(&self) -> &[NdefRecord] {
        &self.records
    }

    /// Serializes the message.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let last = self.records.len() - 1;

        for (i, record) in self.records.iter().enumerate() {
            record.write(&mut out, i == 0, i == last);
        }

        out
    }

    /// Parses a serialized message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedNdef`] if the framing is invalid, a record is
    /// chunked, or bytes follow the last record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut records = Vec::new();
        let mut pos = 0;

        loop {
            let header = *bytes
                .get(pos)
                .ok_or_else(|| Error::MalformedNdef("missing record header".to_string()))?;
            pos += 1;

            if records.is_empty() != (header & flag::MB != 0) {
                return Err(Error::MalformedNdef("misplaced message-begin flag".to_string()));
            }
            if header & flag::CF != 0 {
                return Err(Error::MalformedNdef("chunked records are not supported".to_string()));
            }

            let tnf = Tnf::from_bits(header & flag::TNF_MASK)
                .filter(|t| *t != Tnf::Unchanged)
                .ok_or_else(|| {
                    Error::MalformedNdef(format!("invalid TNF {:#04x}", header & flag::TNF_MASK))
                })?;

            let type_len = usize::from(take(bytes, &mut pos, 1)?[0]);
            let payload_len = if header & flag::SR != 0 {
                usize::from(take(bytes, &mut pos, 1)?[0])
            } else {
                let b = take(bytes, &mut pos, 4)?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
            };
            let id_len = if header & flag::IL != 0 {
                usize::from(take(bytes, &mut pos, 1)?[0])
            } else {
                0
            };

            let record_type = take(bytes, &mut pos, type_len)?.to_vec();
            let id = take(bytes, &mut pos, id_len)?.to_vec();
            let payload = take(bytes, &mut pos, payload_len)?.to_vec();

            records.push(NdefRecord {
                tnf,
                record_type,
                id,
                payload,
            });

            if header & flag::ME != 0 {
                break;
            }
        }

        if pos != bytes.len() {
            return Err(Error::MalformedNdef(format!(
                "{} bytes after the last record",
                bytes.len() - pos
            )));
        }

        Ok(Self { records })
    }
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| Error::MalformedNdef("record runs past end of message".to_string()))?;
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}
