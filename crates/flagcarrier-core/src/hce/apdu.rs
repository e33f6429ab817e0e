//! APDU framing for the emulated tag.
//!
//! This module provides the command and response types exchanged between an
//! NFC reader and the card-emulation service, plus the status words the
//! service answers with.
//!
//! # APDU Command Structure
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc/Le | Data |
//! |-----|-----|----|----|-------|------|
//! | 1B  | 1B  | 1B | 1B | 1B    | Var  |
//! ```
//!
//! Every command the service accepts carries the fifth byte: `SELECT` and
//! `UPDATE BINARY` use it as the data length, `READ BINARY` as the requested
//! response length.
//!
//! # APDU Response Structure
//!
//! ```text
//! | Data | SW1 | SW2 |
//! |------|-----|-----|
//! | Var  | 1B  | 1B  |
//! ```
//!
//! # Example
//!
//! ```
//! use flagcarrier_core::hce::apdu::{Apdu, CommandHeader, ins};
//!
//! let apdu = Apdu::with_le(0x00, ins::READ_BINARY, 0x00, 0xFD, vec![], 253);
//! let bytes = apdu.to_bytes();
//! assert_eq!(bytes, vec![0x00, 0xB0, 0x00, 0xFD, 0xFD]);
//!
//! let header = CommandHeader::parse(&bytes).unwrap();
//! assert_eq!(header.address(), 0x00FD);
//! assert_eq!(header.length_byte(), 253);
//! ```

use core::fmt;

/// The only class byte the service supports.
pub const CLA_DEFAULT: u8 = 0x00;

/// Length of the fixed command header, including the length byte.
pub const HEADER_LEN: usize = 5;

/// Instruction codes.
pub mod ins {
    /// `SELECT` instruction.
    pub const SELECT: u8 = 0xA4;

    /// `UPDATE BINARY` instruction, used as "generate a record to serve".
    pub const UPDATE_BINARY: u8 = 0xD6;

    /// `READ BINARY` instruction.
    pub const READ_BINARY: u8 = 0xB0;
}

/// Status words returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusWord {
    /// Command completed.
    Success = 0x9000,
    /// Generic failure without further information.
    Failed = 0x6F00,
    /// Class byte not supported.
    ClaNotSupported = 0x6E00,
    /// Instruction byte not supported.
    InsNotSupported = 0x6D00,
    /// Application or data not found.
    FileNotFound = 0x6A82,
    /// Wrong `P1`/`P2` parameters.
    WrongParameters = 0x6B00,
}

impl StatusWord {
    /// Returns the status word as a [`u16`].
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Returns the `SW1 SW2` bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.code().to_be_bytes()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.code())
    }
}

/// A borrowed view of a received command's fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader<'a> {
    raw: &'a [u8],
}

impl<'a> CommandHeader<'a> {
    /// Parses the header of a raw command.
    ///
    /// Returns `None` if the command is shorter than [`HEADER_LEN`] bytes.
    #[must_use]
    pub const fn parse(raw: &'a [u8]) -> Option<Self> {
        if raw.len() < HEADER_LEN {
            None
        } else {
            Some(Self { raw })
        }
    }

    /// Returns the class byte.
    #[must_use]
    pub const fn cla(&self) -> u8 {
        self.raw[0]
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.raw[1]
    }

    /// Returns parameter 1.
    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.raw[2]
    }

    /// Returns parameter 2.
    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.raw[3]
    }

    /// Returns `P1 P2` as a big-endian address or offset.
    #[must_use]
    pub const fn address(&self) -> u16 {
        u16::from_be_bytes([self.raw[2], self.raw[3]])
    }

    /// Returns the fifth header byte (`Lc` or `Le`).
    #[must_use]
    pub const fn length_byte(&self) -> u8 {
        self.raw[4]
    }

    /// Returns every byte after the header.
    #[must_use]
    pub fn trailing(&self) -> &'a [u8] {
        &self.raw[HEADER_LEN..]
    }

    /// Returns the `Lc` data bytes, or `None` if the command is shorter than
    /// its declared length.
    #[must_use]
    pub fn data(&self) -> Option<&'a [u8]> {
        self.trailing().get(..usize::from(self.length_byte()))
    }
}

/// An APDU command as sent by a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Class byte.
    cla: u8,

    /// Instruction byte.
    ins: u8,

    /// Parameter 1.
    p1: u8,

    /// Parameter 2.
    p2: u8,

    /// Command data.
    data: Vec<u8>,

    /// Expected response length (0 = none).
    le: u16,
}

impl Apdu {
    /// Creates a command without an expected response length.
    #[must_use]
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: 0,
        }
    }

    /// Creates a command with an expected response length.
    #[must_use]
    pub const fn with_le(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>, le: u16) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        }
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    /// Returns the command data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes the command in short form.
    ///
    /// Data beyond 255 bytes is truncated by the one-byte `Lc`; an `Le` of
    /// 256 is encoded as `0x00`. A command with neither data nor `Le` is sent
    /// with `Lc = 0` so the header is always [`HEADER_LEN`] bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() + 1);

        bytes.push(self.cla);
        bytes.push(self.ins);
        bytes.push(self.p1);
        bytes.push(self.p2);

        if !self.data.is_empty() {
            let len = self.data.len().min(255);
            bytes.push(len as u8);
            bytes.extend_from_slice(&self.data[..len]);
        }
        if self.le > 0 {
            bytes.push(if self.le >= 256 { 0x00 } else { self.le as u8 });
        } else if self.data.is_empty() {
            bytes.push(0x00);
        }

        bytes
    }
}

/// An APDU response: optional data followed by a status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data.
    data: Vec<u8>,

    /// Status word.
    sw: u16,
}

impl ApduResponse {
    /// Creates a response carrying `data`.
    #[must_use]
    pub const fn new(data: Vec<u8>, status: StatusWord) -> Self {
        Self {
            data,
            sw: status.code(),
        }
    }

    /// Creates a response with only a status word.
    #[must_use]
    pub const fn status(status: StatusWord) -> Self {
        Self::new(Vec::new(), status)
    }

    /// Parses raw response bytes.
    ///
    /// Returns `None` if there are fewer than two bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let split = bytes.len().checked_sub(2)?;
        let (data, sw) = bytes.split_at(split);

        Some(Self {
            data: data.to_vec(),
            sw: u16::from_be_bytes([sw[0], sw[1]]),
        })
    }

    /// Serializes the response as `data || SW1 SW2`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 2);
        bytes.extend_from_slice(&self.data);
        bytes.extend_from_slice(&self.sw.to_be_bytes());
        bytes
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the response and returns the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the full status word.
    #[must_use]
    pub const fn status_word(&self) -> u16 {
        self.sw
    }

    /// Checks if the response indicates success (`SW = 0x9000`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.sw == StatusWord::Success.code()
    }
}
