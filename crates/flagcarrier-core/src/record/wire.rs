//! Length-prefixed string fields.
//!
//! Each field on the wire is a big-endian `u16` byte count followed by the
//! string in modified UTF-8, the encoding used by JVM `DataOutput.writeUTF`:
//!
//! ```text
//! | len (2B, BE) | modified UTF-8 bytes (len B) |
//! ```
//!
//! Modified UTF-8 encodes every UTF-16 code unit separately:
//!
//! | Code unit            | Bytes |
//! |----------------------|-------|
//! | `U+0001..=U+007F`    | 1     |
//! | `U+0000`, `U+0080..=U+07FF` | 2 |
//! | `U+0800..=U+FFFF` (incl. surrogates) | 3 |

use crate::error::{Error, Result};

/// Largest byte count a single field may encode to.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Appends `value` to `out` as one length-prefixed field.
///
/// # Errors
///
/// Returns [`Error::SerializationError`] if the encoded string exceeds
/// [`MAX_FIELD_LEN`] bytes. Nothing is written in that case.
pub fn write_field(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let encoded = encode_modified_utf8(value);
    let len = u16::try_from(encoded.len()).map_err(|_| {
        Error::SerializationError(format!(
            "field of {} bytes exceeds the {MAX_FIELD_LEN} byte limit",
            encoded.len()
        ))
    })?;

    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&encoded);
    Ok(())
}

fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());

    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }

    out
}

/// A cursor over a buffer of consecutive fields.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the current byte offset into the buffer.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the bytes that have not been read yet.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads the next field.
    ///
    /// # Errors
    ///
    /// - [`Error::IncompleteData`] if the prefix or the body runs past the buffer
    /// - [`Error::MalformedField`] if the body is not valid modified UTF-8
    pub fn read_field(&mut self) -> Result<String> {
        let rest = self.remaining();
        if rest.len() < 2 {
            return Err(Error::IncompleteData);
        }

        let len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
        let body = rest.get(2..2 + len).ok_or(Error::IncompleteData)?;
        let value = decode_modified_utf8(body)?;

        self.pos += 2 + len;
        Ok(value)
    }
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let lead = u16::from(bytes[i]);
        match lead >> 4 {
            0x0..=0x7 => {
                units.push(lead);
                i += 1;
            }
            0xC | 0xD => {
                let b2 = continuation(bytes, i + 1)?;
                units.push(((lead & 0x1F) << 6) | b2);
                i += 2;
            }
            0xE => {
                let b2 = continuation(bytes, i + 1)?;
                let b3 = continuation(bytes, i + 2)?;
                units.push(((lead & 0x0F) << 12) | (b2 << 6) | b3);
                i += 3;
            }
            _ => {
                return Err(Error::MalformedField(format!(
                    "invalid lead byte {lead:#04x} at offset {i}"
                )));
            }
        }
    }

    String::from_utf16(&units).map_err(|_| Error::MalformedField("unpaired surrogate".to_string()))
}

fn continuation(bytes: &[u8], index: usize) -> Result<u16> {
    match bytes.get(index) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        Some(&b) => Err(Error::MalformedField(format!(
            "invalid continuation byte {b:#04x} at offset {index}"
        ))),
        None => Err(Error::MalformedField(
            "partial character at end of field".to_string(),
        )),
    }
}
