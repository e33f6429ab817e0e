//! The card-emulation session state machine.
//!
//! [`HceService`] answers the commands of one reader interaction at a time:
//!
//! ```text
//!        SELECT (AID)          UPDATE BINARY (challenge)
//! Idle ───────────────► Selected ───────────────────► Serving ──┐
//!   ▲                                                    ▲       │ READ BINARY
//!   │                  deactivation                      └───────┘
//!   └──────────────────────────────────────────────────────────────
//! ```
//!
//! `UPDATE BINARY` resolves the published record, signs it against the
//! challenge carried in the command and stores the resulting NDEF message as
//! the session buffer. `READ BINARY` serves that buffer in chunks of at most
//! [`MAX_READ_LEN`] bytes while the service tracks how far the reader got.
//! On deactivation a completely read one-time record is consumed.
//!
//! Failures never leave the service as errors: every command is answered
//! with a status word.

use std::sync::Arc;

use tracing::{debug, warn};

use super::apdu::{ApduResponse, CLA_DEFAULT, CommandHeader, StatusWord, ins};
use super::publish::{PublishSource, PublishedData};
use super::{ApduService, DeactivationReason};
use crate::codec::TagCodec;

/// The FlagCarrier application identifier.
pub const FLAGCARRIER_AID: [u8; 12] = [
    0xF0, 0x5A, 0x25, 0x58, 0x83, 0x6E, 0x09, 0x66, 0xAE, 0xD5, 0x27, 0xCE,
];

/// Largest chunk returned by one `READ BINARY`, leaving room for the status
/// word in a 255-byte response.
pub const MAX_READ_LEN: usize = 253;

/// Highest offset a `READ BINARY` may address.
pub const MAX_READ_OFFSET: u16 = 0x7FFF;

/// Diagnostic payload sent when there is nothing to publish.
const NO_DATA_MESSAGE: &[u8] = b"no data";

/// Coarse protocol phase of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No application selected yet.
    Idle,
    /// The application was selected but no record was generated.
    Selected,
    /// A record buffer exists and may be read.
    Serving,
}

/// The buffer generated for the current session.
#[derive(Debug)]
struct Session {
    buffer: Vec<u8>,
    highest_read_end: usize,
    source: PublishSource,
}

impl Session {
    fn fully_read(&self) -> bool {
        self.highest_read_end >= self.buffer.len()
    }
}

/// Host card-emulation service for FlagCarrier tags.
#[derive(Debug)]
pub struct HceService {
    /// Signing context used to generate records.
    codec: Arc<TagCodec>,

    /// The shared publish slots.
    published: Arc<PublishedData>,

    /// Whether the application has been selected.
    selected: bool,

    /// The buffer served to the reader, once generated.
    session: Option<Session>,
}

impl HceService {
    /// Creates an idle service.
    ///
    /// # Arguments
    ///
    /// * `codec` - Keys used to sign generated records
    /// * `published` - The publish slots shared with the UI
    #[must_use]
    pub const fn new(codec: Arc<TagCodec>, published: Arc<PublishedData>) -> Self {
        Self {
            codec,
            published,
            selected: false,
            session: None,
        }
    }

    /// Returns the current protocol phase.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.session.is_some() {
            SessionState::Serving
        } else if self.selected {
            SessionState::Selected
        } else {
            SessionState::Idle
        }
    }

    /// Returns the session buffer, if one was generated.
    #[must_use]
    pub fn buffer(&self) -> Option<&[u8]> {
        self.session.as_ref().map(|s| s.buffer.as_slice())
    }

    /// Returns the end of the furthest chunk read so far.
    #[must_use]
    pub fn highest_read_end(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.highest_read_end)
    }

    fn handle(&mut self, command: &[u8]) -> ApduResponse {
        let Some(header) = CommandHeader::parse(command) else {
            return ApduResponse::status(StatusWord::Failed);
        };

        debug!(ins = %format_args!("{:02x}", header.ins()), "handling APDU");

        if header.cla() != CLA_DEFAULT {
            return ApduResponse::status(StatusWord::ClaNotSupported);
        }

        match header.ins() {
            ins::SELECT => self.select(&header),
            ins::UPDATE_BINARY => self.update(&header),
            ins::READ_BINARY => self.read(&header),
            _ => ApduResponse::status(StatusWord::InsNotSupported),
        }
    }

    fn select(&mut self, header: &CommandHeader<'_>) -> ApduResponse {
        if header.p1() != 0x04 || header.p2() != 0x00 {
            return ApduResponse::status(StatusWord::Failed);
        }

        if usize::from(header.length_byte()) != FLAGCARRIER_AID.len()
            || header.data() != Some(&FLAGCARRIER_AID[..])
        {
            return ApduResponse::status(StatusWord::FileNotFound);
        }

        self.selected = true;
        ApduResponse::status(StatusWord::Success)
    }

    fn update(&mut self, header: &CommandHeader<'_>) -> ApduResponse {
        // Only whole-file writes at address zero.
        if header.address() != 0 {
            return ApduResponse::status(StatusWord::WrongParameters);
        }

        let Some(challenge) = header.data() else {
            return ApduResponse::status(StatusWord::Failed);
        };

        let Some(publication) = self.published.resolve() else {
            return ApduResponse::new(NO_DATA_MESSAGE.to_vec(), StatusWord::FileNotFound);
        };

        let message = match self
            .codec
            .generate_message(&publication.record, Some(challenge))
        {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "record generation failed");
                return ApduResponse::status(StatusWord::Failed);
            }
        };

        let buffer = message.to_bytes();
        debug!(
            len = buffer.len(),
            challenge = %hex::encode(challenge),
            source = ?publication.source,
            "generated data"
        );

        self.session = Some(Session {
            buffer,
            highest_read_end: 0,
            source: publication.source,
        });

        ApduResponse::status(StatusWord::Success)
    }

    fn read(&mut self, header: &CommandHeader<'_>) -> ApduResponse {
        let offset = header.address();
        if offset > MAX_READ_OFFSET {
            return ApduResponse::status(StatusWord::WrongParameters);
        }
        let offset = usize::from(offset);

        let mut length = usize::from(header.length_byte());
        if length == 0 || length > MAX_READ_LEN {
            length = MAX_READ_LEN;
        }

        debug!(offset, length, "read request");

        let Some(session) = self.session.as_mut() else {
            return ApduResponse::status(StatusWord::FileNotFound);
        };

        if offset >= session.buffer.len() {
            return ApduResponse::status(StatusWord::Success);
        }

        let end = (offset + length).min(session.buffer.len());
        session.highest_read_end = session.highest_read_end.max(end);

        ApduResponse::new(session.buffer[offset..end].to_vec(), StatusWord::Success)
    }

    fn deactivate(&mut self, reason: DeactivationReason) {
        debug!(?reason, "deactivated");

        if let Some(session) = self.session.take() {
            if let PublishSource::OneTime { generation } = session.source {
                if session.fully_read() && self.published.consume_once(generation) {
                    debug!("cleared one-time data");
                }
            }
        }

        self.selected = false;
    }
}

impl ApduService for HceService {
    fn process_command(&mut self, command: &[u8]) -> Vec<u8> {
        self.handle(command).to_bytes()
    }

    fn on_deactivated(&mut self, reason: DeactivationReason) {
        self.deactivate(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::hce::apdu::Apdu;
    use crate::record::TagRecord;

    fn select_command() -> Vec<u8> {
        Apdu::new(0x00, ins::SELECT, 0x04, 0x00, FLAGCARRIER_AID.to_vec()).to_bytes()
    }

    fn update_command(challenge: &[u8]) -> Vec<u8> {
        let mut cmd = vec![0x00, ins::UPDATE_BINARY, 0x00, 0x00, challenge.len() as u8];
        cmd.extend_from_slice(challenge);
        cmd
    }

    fn read_command(offset: u16, len: u8) -> Vec<u8> {
        let [p1, p2] = offset.to_be_bytes();
        vec![0x00, ins::READ_BINARY, p1, p2, len]
    }

    fn service() -> (HceService, Arc<PublishedData>) {
        let published = Arc::new(PublishedData::new());
        let service = HceService::new(Arc::new(TagCodec::new()), Arc::clone(&published));
        (service, published)
    }

    fn record() -> TagRecord {
        [("display_name", "runner")].into_iter().collect()
    }

    fn status(response: &[u8]) -> u16 {
        ApduResponse::from_bytes(response).unwrap().status_word()
    }

    #[test]
    fn short_command_fails() {
        let (mut svc, _) = service();
        assert_eq!(svc.process_command(&[0x00, 0xA4, 0x04, 0x00]), vec![0x6F, 0x00]);
        assert_eq!(svc.process_command(&[]), vec![0x6F, 0x00]);
    }

    #[test]
    fn unsupported_class_and_instruction() {
        let (mut svc, _) = service();
        assert_eq!(status(&svc.process_command(&[0x80, 0xA4, 0x04, 0x00, 0x00])), 0x6E00);
        assert_eq!(status(&svc.process_command(&[0x00, 0xCA, 0x00, 0x00, 0x00])), 0x6D00);
        assert_eq!(svc.state(), SessionState::Idle);
    }

    #[test]
    fn select_exact_aid() {
        let (mut svc, _) = service();
        assert_eq!(svc.process_command(&select_command()), vec![0x90, 0x00]);
        assert_eq!(svc.state(), SessionState::Selected);
    }

    #[test]
    fn select_with_trailing_le() {
        let (mut svc, _) = service();
        let mut cmd = select_command();
        cmd.push(0x00);
        assert_eq!(status(&svc.process_command(&cmd)), 0x9000);
    }

    #[test]
    fn select_wrong_aid() {
        let (mut svc, _) = service();

        let short = Apdu::new(0x00, ins::SELECT, 0x04, 0x00, FLAGCARRIER_AID[..11].to_vec());
        assert_eq!(status(&svc.process_command(&short.to_bytes())), 0x6A82);

        let mut other = FLAGCARRIER_AID;
        other[11] ^= 0xFF;
        let mismatched = Apdu::new(0x00, ins::SELECT, 0x04, 0x00, other.to_vec());
        assert_eq!(status(&svc.process_command(&mismatched.to_bytes())), 0x6A82);

        // declared length matches but the AID bytes are cut off
        let mut truncated = select_command();
        truncated.truncate(10);
        assert_eq!(status(&svc.process_command(&truncated)), 0x6A82);

        assert_eq!(svc.state(), SessionState::Idle);
    }

    #[test]
    fn select_wrong_parameters() {
        let (mut svc, _) = service();
        let cmd = Apdu::new(0x00, ins::SELECT, 0x00, 0x0C, FLAGCARRIER_AID.to_vec());
        assert_eq!(status(&svc.process_command(&cmd.to_bytes())), 0x6F00);
    }

    #[test]
    fn update_without_data_is_not_found() {
        let (mut svc, _) = service();
        let response = svc.process_command(&update_command(b"uid"));
        let mut expected = b"no data".to_vec();
        expected.extend_from_slice(&[0x6A, 0x82]);
        assert_eq!(response, expected);
        assert!(svc.buffer().is_none());
    }

    #[test]
    fn update_nonzero_address() {
        let (mut svc, published) = service();
        published.publish(record());

        let cmd = [0x00, ins::UPDATE_BINARY, 0x00, 0x01, 0x00];
        assert_eq!(status(&svc.process_command(&cmd)), 0x6B00);
        let cmd = [0x00, ins::UPDATE_BINARY, 0x04, 0x00, 0x00];
        assert_eq!(status(&svc.process_command(&cmd)), 0x6B00);
    }

    #[test]
    fn update_declared_length_too_long() {
        let (mut svc, published) = service();
        published.publish(record());

        let cmd = [0x00, ins::UPDATE_BINARY, 0x00, 0x00, 0x04, 0x01, 0x02];
        assert_eq!(status(&svc.process_command(&cmd)), 0x6F00);
        assert!(svc.buffer().is_none());
    }

    #[test]
    fn update_generates_buffer() {
        let (mut svc, published) = service();
        published.publish(record());

        svc.process_command(&select_command());
        assert_eq!(svc.process_command(&update_command(&[1, 2, 3])), vec![0x90, 0x00]);
        assert_eq!(svc.state(), SessionState::Serving);

        let expected = TagCodec::new()
            .generate_message(&record(), Some(&[1, 2, 3]))
            .unwrap()
            .to_bytes();
        assert_eq!(svc.buffer(), Some(expected.as_slice()));
        assert_eq!(svc.highest_read_end(), 0);
    }

    #[test]
    fn update_with_bad_signing_key_fails() {
        let published = Arc::new(PublishedData::new());
        published.publish(record());
        let codec = TagCodec::new().with_private_key(vec![0u8; 10]);
        let mut svc = HceService::new(Arc::new(codec), Arc::clone(&published));

        assert_eq!(status(&svc.process_command(&update_command(b"x"))), 0x6F00);
        assert_eq!(svc.state(), SessionState::Idle);
    }

    #[test]
    fn read_without_buffer() {
        let (mut svc, _) = service();
        assert_eq!(status(&svc.process_command(&read_command(0, 16))), 0x6A82);
    }

    #[test]
    fn read_offset_out_of_range() {
        let (mut svc, published) = service();
        published.publish(record());
        svc.process_command(&update_command(&[]));

        assert_eq!(status(&svc.process_command(&read_command(0x8000, 16))), 0x6B00);
        assert_eq!(status(&svc.process_command(&read_command(0x7FFF, 16))), 0x9000);
    }

    #[test]
    fn read_chunks_and_end_of_data() {
        let (mut svc, published) = service();
        published.publish(record());
        svc.process_command(&update_command(&[]));
        let buffer = svc.buffer().unwrap().to_vec();

        let first = svc.process_command(&read_command(0, 4));
        assert_eq!(&first[..4], &buffer[..4]);
        assert_eq!(&first[4..], &[0x90, 0x00]);
        assert_eq!(svc.highest_read_end(), 4);

        // re-reading earlier data does not lower the mark
        svc.process_command(&read_command(1, 1));
        assert_eq!(svc.highest_read_end(), 4);

        let len = u16::try_from(buffer.len()).unwrap();
        assert_eq!(svc.process_command(&read_command(len, 10)), vec![0x90, 0x00]);
    }

    #[test]
    fn read_length_is_clamped() {
        let (mut svc, published) = service();
        let big: TagRecord = (0..40u8)
            .map(|i| {
                let noise = KeyPair::from_seed(&[i; 32]);
                (format!("key{i:02}"), hex::encode(noise.public_key()))
            })
            .collect();
        published.publish(big);
        svc.process_command(&update_command(&[]));
        assert!(svc.buffer().unwrap().len() > MAX_READ_LEN);

        for le in [0u8, 254, 255] {
            let response = svc.process_command(&read_command(0, le));
            assert_eq!(response.len(), MAX_READ_LEN + 2);
        }
    }

    #[test]
    fn deactivation_clears_session() {
        let (mut svc, published) = service();
        published.publish(record());
        svc.process_command(&select_command());
        svc.process_command(&update_command(&[]));

        svc.on_deactivated(DeactivationReason::LinkLoss);
        assert_eq!(svc.state(), SessionState::Idle);
        assert!(svc.buffer().is_none());
        assert_eq!(svc.highest_read_end(), 0);
        assert!(published.has_persistent());
    }

    #[test]
    fn partially_read_one_time_data_survives() {
        let (mut svc, published) = service();
        published.publish_once(record());
        svc.process_command(&update_command(&[]));
        svc.process_command(&read_command(0, 2));

        svc.on_deactivated(DeactivationReason::Deselected);
        assert!(published.has_one_time());
    }

    #[test]
    fn fully_read_persistent_data_is_kept() {
        let (mut svc, published) = service();
        published.publish(record());
        svc.process_command(&update_command(&[]));
        svc.process_command(&read_command(0, 0));

        svc.on_deactivated(DeactivationReason::Deselected);
        assert!(published.has_persistent());
    }
}
