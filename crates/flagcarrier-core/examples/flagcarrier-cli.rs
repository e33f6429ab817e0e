//! FlagCarrier CLI Example
//!
//! This example demonstrates how to use the FlagCarrier core library to
//! provision keys, write and read tag payloads, and simulate a reader tapping
//! a device that emulates a tag.
//!
//! # Quick Start
//!
//! ```bash
//! # Generate a key pair and store it as settings
//! cargo run --example flagcarrier-cli -- keygen > settings.json
//!
//! # Encode a signed record bound to a tag UID
//! cargo run --example flagcarrier-cli -- encode --settings settings.json \
//!     --uid 04a1b2c3d4e5f6 --tech ultralight display_name=runner country_code=DE
//!
//! # Decode it again
//! cargo run --example flagcarrier-cli -- decode --settings settings.json \
//!     --uid 04a1b2c3d4e5f6 --tech ultralight <hex>
//!
//! # Simulate a phone serving the record over host card emulation
//! RUST_LOG=debug cargo run --example flagcarrier-cli -- emulate \
//!     --settings settings.json --uid 0102030405 display_name=runner
//! ```
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `keygen` | Generate an Ed25519 key pair as settings JSON |
//! | `encode <key=value>...` | Print the NDEF message for a record as hex |
//! | `decode <hex>` | Decode an NDEF message and print the record |
//! | `emulate <key=value>...` | Read a record from an in-process emulated tag |
//!
//! # Options
//!
//! - `--settings <file>`: settings JSON with `pub_key` / `priv_key`
//! - `--uid <hex>`: tag identifier mixed into the signature
//! - `--tech <ultralight|classic>`: tag technology of the UID

#![expect(unused_crate_dependencies, reason = "needed for CLI example")]

use std::env;
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use flagcarrier_core::challenge::{TagTechnology, extra_sign_data};
use flagcarrier_core::config::KeySettings;
use flagcarrier_core::crypto::generate_keypair;
use flagcarrier_core::hce::reader::EmulatedTagReader;
use flagcarrier_core::hce::{ApduService, DeactivationReason, HceService, PublishedData};
use flagcarrier_core::ndef::NdefMessage;
use flagcarrier_core::record::{parse_extra_data, settings_update};
use flagcarrier_core::{Error, SignatureStatus, TagCodec, TagRecord};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Options shared by every command.
#[derive(Debug, Default)]
struct Options {
    settings: Option<String>,
    uid: Option<Vec<u8>>,
    tech: Option<TagTechnology>,
    rest: Vec<String>,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return ExitCode::SUCCESS;
    }

    let result = match args[1].as_str() {
        "keygen" => cmd_keygen(),
        "encode" => parse_options(&args[2..]).and_then(|opts| cmd_encode(&opts)),
        "decode" => parse_options(&args[2..]).and_then(|opts| cmd_decode(&opts)),
        "emulate" => parse_options(&args[2..]).and_then(|opts| cmd_emulate(&opts)),
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_help();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!(
        r"FlagCarrier CLI

USAGE:
    flagcarrier-cli <COMMAND> [OPTIONS] [ARGS]

COMMANDS:
    keygen                  Generate a key pair as settings JSON
    encode <key=value>...   Print the NDEF message for a record as hex
    decode <hex>            Decode an NDEF message and print the record
    emulate <key=value>...  Read a record from an in-process emulated tag
    help                    Show this help message

OPTIONS:
    --settings <file>       Settings JSON holding pub_key / priv_key
    --uid <hex>             Tag identifier mixed into the signature
    --tech <name>           Tag technology: ultralight or classic

ENVIRONMENT:
    RUST_LOG                Log filter, e.g. RUST_LOG=flagcarrier_core=debug
"
    );
}

fn parse_options(args: &[String]) -> Result<Options, Error> {
    let mut opts = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--settings" => opts.settings = Some(required(iter.next(), arg)?.clone()),
            "--uid" => {
                let value = required(iter.next(), arg)?;
                let uid = hex::decode(value.trim_start_matches("0x"))
                    .map_err(|e| Error::ConfigError(format!("invalid --uid: {e}")))?;
                opts.uid = Some(uid);
            }
            "--tech" => {
                let tech = match required(iter.next(), arg)?.as_str() {
                    "ultralight" => TagTechnology::MifareUltralight,
                    "classic" => TagTechnology::MifareClassic,
                    other => return Err(Error::ConfigError(format!("unknown --tech: {other}"))),
                };
                opts.tech = Some(tech);
            }
            _ => opts.rest.push(arg.clone()),
        }
    }

    Ok(opts)
}

fn required<'a>(value: Option<&'a String>, flag: &str) -> Result<&'a String, Error> {
    value.ok_or_else(|| Error::ConfigError(format!("{flag} requires a value")))
}

impl Options {
    fn codec(&self) -> Result<TagCodec, Error> {
        let Some(path) = &self.settings else {
            return Ok(TagCodec::new());
        };

        let json = fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read {path}: {e}")))?;
        TagCodec::from_settings(&KeySettings::from_json(&json)?)
    }

    fn extra(&self) -> Option<Vec<u8>> {
        self.uid
            .as_deref()
            .map(|uid| extra_sign_data(uid, self.tech))
    }

    fn record(&self) -> Result<TagRecord, Error> {
        Ok(parse_extra_data(&self.rest.join("\n"))?.into_iter().collect())
    }
}

fn cmd_keygen() -> Result<(), Error> {
    let pair = generate_keypair();
    info!(public_key = %hex::encode(pair.public_key()), "generated key pair");

    println!("{}", KeySettings::from_key_pair(&pair).to_json()?);
    Ok(())
}

fn cmd_encode(opts: &Options) -> Result<(), Error> {
    let codec = opts.codec()?;
    let record = opts.record()?;
    let extra = opts.extra();

    let message = codec.generate_message(&record, extra.as_deref())?;
    let bytes = message.to_bytes();
    info!(
        len = bytes.len(),
        signed = codec.has_private_key(),
        "encoded record"
    );

    println!("{}", hex::encode(bytes));
    Ok(())
}

fn cmd_decode(opts: &Options) -> Result<(), Error> {
    let input = opts
        .rest
        .first()
        .ok_or_else(|| Error::ConfigError("decode requires a hex message".to_string()))?;
    let bytes = hex::decode(input.trim_start_matches("0x"))
        .map_err(|e| Error::ConfigError(format!("invalid hex message: {e}")))?;

    let codec = opts.codec()?;
    let message = NdefMessage::from_bytes(&bytes)?;
    let record = codec.parse_message(&message, opts.extra().as_deref())?;

    print_record(&record)
}

fn cmd_emulate(opts: &Options) -> Result<(), Error> {
    let codec = Arc::new(opts.codec()?);
    let published = Arc::new(PublishedData::new());
    published.publish_once(opts.record()?);

    let mut service = HceService::new(Arc::clone(&codec), Arc::clone(&published));
    let challenge = opts.uid.clone().unwrap_or_default();

    println!("Tapping emulated tag...\n");
    let message = EmulatedTagReader::new(&mut service).read_message(&challenge)?;
    service.on_deactivated(DeactivationReason::LinkLoss);

    let record = codec.parse_message(&message, Some(challenge.as_slice()))?;
    print_record(&record)?;

    println!(
        "\nOne-time data {}",
        if published.has_one_time() {
            "still pending"
        } else {
            "consumed"
        }
    );
    Ok(())
}

fn print_record(record: &TagRecord) -> Result<(), Error> {
    println!("Record:");
    for (key, value) in record.user_entries() {
        println!("  {key} = {value}");
    }

    let status = match record.signature_status() {
        SignatureStatus::Valid => "valid",
        SignatureStatus::Invalid => "INVALID",
        SignatureStatus::Absent => "not checked",
    };
    println!("\nSignature: {status}");

    if let Some(update) = settings_update(record) {
        println!("\nProvisioning tag, settings:");
        for (name, value) in update? {
            println!("  {name} = {value}");
        }
    }

    Ok(())
}
