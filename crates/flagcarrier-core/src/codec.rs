//! The tag record codec.
//!
//! Encoding turns a [`TagRecord`] into the compressed payload stored on a
//! tag; decoding reverses it and, when a public key is configured, verifies
//! the embedded signature.
//!
//! # Payload Layout
//!
//! Before compression the payload is a sequence of length-prefixed fields
//! (see [`record::wire`](crate::record::wire)), read as key/value pairs:
//!
//! ```text
//! unsigned: | key | value | key | value | ...
//! signed:   | "sig" | base64(signature) | key | value | ...
//!                                       └──── signed region ────┘
//! ```
//!
//! The signature covers exactly the bytes after the `sig` field, followed by
//! the extra sign data. Only a `sig` entry at offset zero is a signature
//! envelope: the verified region is defined by its position, so a `sig`
//! anywhere else is an ordinary entry and is never checked.
//!
//! The field stream is compressed as a zlib stream at level 9.
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::codec::{decode, encode};
//! use flagcarrier_core::crypto::KeyPair;
//! use flagcarrier_core::record::{SignatureStatus, TagRecord};
//!
//! let pair = KeyPair::from_seed(&[1u8; 32]);
//! let record: TagRecord = [("display_name", "runner")].into_iter().collect();
//! let uid = [0x04, 0x22, 0x31, 0xAA];
//!
//! let blob = encode(&record, Some(pair.private_key()), Some(&uid)).unwrap();
//! let decoded = decode(&blob, Some(pair.public_key()), Some(&uid)).unwrap();
//!
//! assert_eq!(decoded.get("display_name"), Some("runner"));
//! assert_eq!(decoded.signature_status(), SignatureStatus::Valid);
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::debug;

use crate::config::KeySettings;
use crate::crypto;
use crate::error::{Error, Result};
use crate::ndef::{NdefMessage, NdefRecord};
use crate::record::wire::{FieldReader, write_field};
use crate::record::{SIG_KEY, SIG_VALID_KEY, TagRecord};

/// MIME type of the record carrying the tag payload.
pub const MIME_TYPE: &str = "application/vnd.de.oromit.flagcarrier";

/// Package named by the application record.
pub const APP_PACKAGE: &str = "de.oromit.flagcarrier";

/// Output buffer growth step while draining the (de)compressor.
const CHUNK: usize = 256;

/// Serializes the non-empty entries of `record` as consecutive key/value
/// fields.
///
/// Keys and values are trimmed; entries whose trimmed value is empty are
/// skipped, as is any [`SIG_VALID_KEY`] annotation.
///
/// # Errors
///
/// Returns [`Error::SerializationError`] if a key or value does not fit a
/// field.
pub fn serialize(record: &TagRecord) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    for (key, value) in record {
        let (key, value) = (key.trim(), value.trim());
        if value.is_empty() || key == SIG_VALID_KEY {
            continue;
        }
        write_field(&mut out, key)?;
        write_field(&mut out, value)?;
    }

    Ok(out)
}

/// Encodes `record` into a compressed, optionally signed payload.
///
/// With a private key, the serialized entries followed by `extra_sign_data`
/// are signed and a `sig` field holding the base64 signature is prepended to
/// the serialized entries. Empty keys and empty sign data count as absent.
///
/// # Errors
///
/// - [`Error::SerializationError`] if a field is too long
/// - [`Error::InvalidKeySize`] if the private key has the wrong size
/// - [`Error::CompressionFailed`] if the compressor fails
pub fn encode(
    record: &TagRecord,
    private_key: Option<&[u8]>,
    extra_sign_data: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let raw = serialize(record)?;

    let payload = match non_empty(private_key) {
        None => raw,
        Some(key) => {
            let mut message = raw.clone();
            message.extend_from_slice(non_empty(extra_sign_data).unwrap_or_default());

            let signature = crypto::sign(&message, key)?;

            let mut signed = Vec::with_capacity(raw.len() + 96);
            write_field(&mut signed, SIG_KEY)?;
            write_field(&mut signed, &STANDARD.encode(signature))?;
            signed.extend_from_slice(&raw);
            signed
        }
    };

    compress(&payload)
}

/// Decodes a compressed payload into a [`TagRecord`].
///
/// With a public key, a leading `sig` field is verified and the result is
/// recorded under [`SIG_VALID_KEY`]. Without one, or without a leading
/// signature, no annotation is produced. Any `sig_valid` entry found in the
/// payload itself is dropped.
///
/// # Errors
///
/// - [`Error::MalformedCompressedData`] if decompression fails
/// - [`Error::MalformedField`] / [`Error::IncompleteData`] if the field
///   stream is corrupt
/// - [`Error::InvalidPublicKeySize`] if the public key has the wrong size
pub fn decode(
    compressed: &[u8],
    public_key: Option<&[u8]>,
    extra_sign_data: Option<&[u8]>,
) -> Result<TagRecord> {
    let payload = decompress(compressed)?;
    parse_payload(&payload, public_key, extra_sign_data)
}

/// Parses an uncompressed field stream. See [`decode`].
///
/// # Errors
///
/// Same as [`decode`], minus decompression.
pub fn parse_payload(
    payload: &[u8],
    public_key: Option<&[u8]>,
    extra_sign_data: Option<&[u8]>,
) -> Result<TagRecord> {
    let public_key = non_empty(public_key);
    let mut reader = FieldReader::new(payload);
    let mut record = TagRecord::new();

    while !reader.is_empty() {
        let start = reader.position();
        let key = reader.read_field()?;
        let value = reader.read_field()?;

        if key == SIG_VALID_KEY {
            continue;
        }

        if start == 0 && key == SIG_KEY {
            if let Some(public_key) = public_key {
                let mut message = reader.remaining().to_vec();
                message.extend_from_slice(non_empty(extra_sign_data).unwrap_or_default());

                let valid = verify_envelope(&value, &message, public_key)?;
                debug!(valid, signed_len = message.len(), "verified leading signature");
                record.insert(SIG_VALID_KEY, valid.to_string());
            }
        }

        record.insert(key, value);
    }

    Ok(record)
}

/// Checks a base64 signature envelope. An envelope that does not decode to
/// a signature of the right size is reported as invalid.
fn verify_envelope(envelope: &str, message: &[u8], public_key: &[u8]) -> Result<bool> {
    if public_key.len() != crypto::PUBLIC_KEY_SIZE {
        return Err(Error::InvalidPublicKeySize(public_key.len()));
    }

    match STANDARD.decode(envelope) {
        Ok(signature) if signature.len() == crypto::SIGNATURE_SIZE => {
            crypto::verify(&signature, message, public_key)
        }
        _ => Ok(false),
    }
}

/// Compresses `data` into a zlib stream at maximum compression.
///
/// # Errors
///
/// Returns [`Error::CompressionFailed`] if the compressor reports an error.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut deflater = Compress::new(Compression::best(), true);
    let mut out = Vec::with_capacity(data.len() / 2 + CHUNK);

    loop {
        let consumed = deflater.total_in() as usize;
        out.reserve(CHUNK);

        let status = deflater
            .compress_vec(&data[consumed..], &mut out, FlushCompress::Finish)
            .map_err(|e| Error::CompressionFailed(e.to_string()))?;

        if status == Status::StreamEnd {
            return Ok(out);
        }
    }
}

/// Decompresses a complete zlib stream.
///
/// # Errors
///
/// Returns [`Error::MalformedCompressedData`] if the stream is corrupt or
/// ends before its end marker.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().saturating_mul(3).max(CHUNK));

    loop {
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();
        out.reserve(CHUNK);

        let status = inflater
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| Error::MalformedCompressedData(e.to_string()))?;

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                let stalled = inflater.total_in() as usize == consumed
                    && inflater.total_out() == produced;
                if stalled {
                    return Err(Error::MalformedCompressedData(
                        "stream ends before its end marker".to_string(),
                    ));
                }
            }
        }
    }
}

fn non_empty(bytes: Option<&[u8]>) -> Option<&[u8]> {
    bytes.filter(|b| !b.is_empty())
}

/// Keys and tag framing for reading and writing FlagCarrier tags.
///
/// A `TagCodec` is the explicit signing context: it owns the optional keys
/// and is handed to every call site that encodes or decodes tags.
#[derive(Clone, Default)]
pub struct TagCodec {
    private_key: Option<Vec<u8>>,
    public_key: Option<Vec<u8>>,
}

impl core::fmt::Debug for TagCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TagCodec")
            .field("signing", &self.has_private_key())
            .field("verifying", &self.has_public_key())
            .finish()
    }
}

impl TagCodec {
    /// Creates a codec that neither signs nor verifies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a codec from the settings store's key strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBase64`] if a key string cannot be decoded.
    pub fn from_settings(settings: &KeySettings) -> Result<Self> {
        Ok(Self {
            private_key: settings.private_key()?,
            public_key: settings.public_key()?,
        })
    }

    /// Sets the key used to sign encoded tags.
    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.private_key = Some(key.into()).filter(|k: &Vec<u8>| !k.is_empty());
        self
    }

    /// Sets the key used to verify decoded tags.
    #[must_use]
    pub fn with_public_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.public_key = Some(key.into()).filter(|k: &Vec<u8>| !k.is_empty());
        self
    }

    /// Returns `true` if encoded tags will be signed.
    #[must_use]
    pub const fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Returns `true` if decoded tags will be verified.
    #[must_use]
    pub const fn has_public_key(&self) -> bool {
        self.public_key.is_some()
    }

    /// Encodes `record` with this codec's private key. See [`encode`].
    ///
    /// # Errors
    ///
    /// Same as [`encode`].
    pub fn encode(&self, record: &TagRecord, extra_sign_data: Option<&[u8]>) -> Result<Vec<u8>> {
        encode(record, self.private_key.as_deref(), extra_sign_data)
    }

    /// Decodes a payload with this codec's public key. See [`decode`].
    ///
    /// # Errors
    ///
    /// Same as [`decode`].
    pub fn decode(&self, compressed: &[u8], extra_sign_data: Option<&[u8]>) -> Result<TagRecord> {
        decode(compressed, self.public_key.as_deref(), extra_sign_data)
    }

    /// Encodes `record` and wraps it in the NDEF message written to tags:
    /// a [`MIME_TYPE`] record with the payload and an application record.
    ///
    /// # Errors
    ///
    /// Same as [`encode`].
    pub fn generate_message(
        &self,
        record: &TagRecord,
        extra_sign_data: Option<&[u8]>,
    ) -> Result<NdefMessage> {
        let payload = self.encode(record, extra_sign_data)?;

        NdefMessage::new(vec![
            NdefRecord::mime(MIME_TYPE, payload),
            NdefRecord::application(APP_PACKAGE),
        ])
    }

    /// Decodes the first [`MIME_TYPE`] record of `message`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSupportedRecord`] if there is no such record, or
    /// any error of [`decode`].
    pub fn parse_message(
        &self,
        message: &NdefMessage,
        extra_sign_data: Option<&[u8]>,
    ) -> Result<TagRecord> {
        let record = message
            .records()
            .iter()
            .find(|r| r.is_mime(MIME_TYPE))
            .ok_or(Error::NoSupportedRecord)?;

        self.decode(record.payload(), extra_sign_data)
    }
}
