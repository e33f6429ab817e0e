//! End-to-end reader sessions against the card-emulation service.

// Silence unused crate dependency warnings for test binary
use base64 as _;
use ed25519_dalek as _;
use flate2 as _;
use proptest as _;
use rand as _;
use serde as _;
use serde_json as _;
use thiserror as _;
use tracing as _;

use std::sync::{Arc, Once};

use flagcarrier_core::codec::TagCodec;
use flagcarrier_core::crypto::KeyPair;
use flagcarrier_core::hce::reader::EmulatedTagReader;
use flagcarrier_core::hce::{
    ApduService, DeactivationReason, FLAGCARRIER_AID, HceService, PublishedData, SessionState,
};
use flagcarrier_core::record::{SignatureStatus, TagRecord};
use flagcarrier_core::{Error, ndef::NdefMessage};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("warn")
            .with_test_writer()
            .init();
    });
}

fn signing_codec() -> (Arc<TagCodec>, KeyPair) {
    let pair = KeyPair::from_seed(&[0x5A; 32]);
    let codec = TagCodec::new()
        .with_private_key(pair.private_key().to_vec())
        .with_public_key(pair.public_key().to_vec());
    (Arc::new(codec), pair)
}

fn large_record() -> TagRecord {
    (0..24u8)
        .map(|i| {
            let noise = KeyPair::from_seed(&[i.wrapping_mul(7); 32]);
            (format!("entry_{i:02}"), hex::encode(noise.public_key()))
        })
        .collect()
}

fn command(ins: u8, p1p2: u16, body: &[u8], le: Option<u8>) -> Vec<u8> {
    let [p1, p2] = p1p2.to_be_bytes();
    let mut cmd = vec![0x00, ins, p1, p2];
    match le {
        Some(le) => cmd.push(le),
        None => {
            cmd.push(body.len() as u8);
            cmd.extend_from_slice(body);
        }
    }
    cmd
}

fn split(response: &[u8]) -> (&[u8], u16) {
    let (data, sw) = response.split_at(response.len() - 2);
    (data, u16::from_be_bytes([sw[0], sw[1]]))
}

#[test]
fn chunked_read_of_large_record() {
    init_tracing();
    let (codec, _) = signing_codec();
    let published = Arc::new(PublishedData::new());
    published.publish(large_record());

    let mut service = HceService::new(Arc::clone(&codec), Arc::clone(&published));

    let (_, sw) = split(&service.process_command(&command(0xA4, 0x0400, &FLAGCARRIER_AID, None)));
    assert_eq!(sw, 0x9000);

    let challenge = [0x04, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60];
    let (_, sw) = split(&service.process_command(&command(0xD6, 0, &challenge, None)));
    assert_eq!(sw, 0x9000);

    let total = service.buffer().unwrap().len();
    assert!(total > 600, "record too small: {total} bytes");

    let mut buffer = Vec::new();
    for offset in [0u16, 253, 506] {
        let response = service.process_command(&command(0xB0, offset, &[], Some(253)));
        let (chunk, sw) = split(&response);
        assert_eq!(sw, 0x9000);
        assert_eq!(chunk.len(), (total - usize::from(offset)).min(253));
        buffer.extend_from_slice(chunk);
    }
    while buffer.len() < total {
        let offset = u16::try_from(buffer.len()).unwrap();
        let response = service.process_command(&command(0xB0, offset, &[], Some(253)));
        buffer.extend_from_slice(split(&response).0);
    }

    let end = u16::try_from(total).unwrap();
    assert_eq!(
        service.process_command(&command(0xB0, end, &[], Some(253))),
        vec![0x90, 0x00]
    );
    assert_eq!(service.highest_read_end(), total);

    let message = NdefMessage::from_bytes(&buffer).unwrap();
    let record = codec.parse_message(&message, Some(&challenge)).unwrap();
    assert_eq!(record.signature_status(), SignatureStatus::Valid);
    assert_eq!(record.user_entries().count(), 24);
}

#[test]
fn signature_is_bound_to_challenge() {
    init_tracing();
    let (codec, _) = signing_codec();
    let published = Arc::new(PublishedData::new());
    published.publish([("display_name", "runner")].into_iter().collect());

    let mut service = HceService::new(Arc::clone(&codec), published);
    let message = EmulatedTagReader::new(&mut service)
        .read_message(b"reader-one")
        .unwrap();

    let replayed = codec.parse_message(&message, Some(b"reader-two")).unwrap();
    assert_eq!(replayed.signature_status(), SignatureStatus::Invalid);
}

#[test]
fn repeated_update_is_byte_identical() {
    let (codec, _) = signing_codec();
    let published = Arc::new(PublishedData::new());
    published.publish(large_record());

    let mut service = HceService::new(codec, published);
    service.process_command(&command(0xD6, 0, b"uid", None));
    let first = service.buffer().unwrap().to_vec();

    service.process_command(&command(0xB0, 0, &[], Some(10)));
    service.process_command(&command(0xD6, 0, b"uid", None));

    assert_eq!(service.buffer(), Some(first.as_slice()));
    assert_eq!(service.highest_read_end(), 0);
}

#[test]
fn one_time_record_is_served_once() {
    init_tracing();
    let codec = Arc::new(TagCodec::new());
    let published = Arc::new(PublishedData::new());
    published.publish([("display_name", "always")].into_iter().collect());
    published.publish_once([("display_name", "once")].into_iter().collect());

    let mut service = HceService::new(Arc::clone(&codec), Arc::clone(&published));

    // an interrupted read leaves the one-time record in place
    let mut reader = EmulatedTagReader::new(&mut service);
    reader.select().unwrap();
    reader.request(b"uid").unwrap();
    service.process_command(&command(0xB0, 0, &[], Some(3)));
    service.on_deactivated(DeactivationReason::LinkLoss);
    assert_eq!(service.state(), SessionState::Idle);
    assert!(published.has_one_time());

    let read = |service: &mut HceService| {
        let message = EmulatedTagReader::new(&mut *service)
            .read_message(b"uid")
            .unwrap();
        service.on_deactivated(DeactivationReason::Deselected);
        let record = codec.parse_message(&message, None).unwrap();
        record.get("display_name").map(str::to_string)
    };

    assert_eq!(read(&mut service).as_deref(), Some("once"));
    assert!(!published.has_one_time());
    assert_eq!(read(&mut service).as_deref(), Some("always"));
    assert_eq!(read(&mut service).as_deref(), Some("always"));
}

#[test]
fn one_time_record_published_mid_session_survives() {
    let codec = Arc::new(TagCodec::new());
    let published = Arc::new(PublishedData::new());
    published.publish_once([("display_name", "first")].into_iter().collect());

    let mut service = HceService::new(Arc::clone(&codec), Arc::clone(&published));
    EmulatedTagReader::new(&mut service)
        .read_message(b"uid")
        .unwrap();

    published.publish_once([("display_name", "second")].into_iter().collect());
    service.on_deactivated(DeactivationReason::LinkLoss);

    let next = published.resolve().unwrap();
    assert_eq!(next.record.get("display_name"), Some("second"));
}

#[test]
fn reader_reports_missing_application() {
    let codec = Arc::new(TagCodec::new());
    let published = Arc::new(PublishedData::new());
    let mut service = HceService::new(codec, published);

    let err = EmulatedTagReader::new(&mut service)
        .read_message(b"uid")
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedStatusWord(0x6A82)));
}
