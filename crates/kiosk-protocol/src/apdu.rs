//! APDU command and response framing.
//!
//! Commands follow the ISO 7816-4 short form:
//!
//! ```text
//! CLA INS P1 P2 [Lc DATA...] [Le]
//! ```
//!
//! Every response ends in a two-byte status word; only `90 00` means success.
//!
//! Two command families are used:
//!
//! | Family | CLA | Purpose |
//! |--------|-----|---------|
//! | ISO 7816-4 | `00` | SELECT, READ BINARY, UPDATE BINARY on NDEF Type 4 tags |
//! | Reader pseudo-APDU | `FF` | GET UID, LOAD KEY, AUTHENTICATE, block read/update on MIFARE Classic |
//!
//! # Examples
//!
//! ```
//! use kiosk_protocol::apdu::{ApduCommand, ApduResponse};
//!
//! let cmd = ApduCommand::read_binary(0x0102, 0x20);
//! assert_eq!(cmd.to_bytes(), vec![0x00, 0xB0, 0x01, 0x02, 0x20]);
//!
//! let resp = ApduResponse::parse(&[0xDE, 0xAD, 0x90, 0x00]).unwrap();
//! assert!(resp.status().is_success());
//! assert_eq!(resp.data(), &[0xDE, 0xAD]);
//! ```

use crate::error::{CodecError, Result};
use std::fmt;

/// Largest chunk moved by a single READ/UPDATE BINARY (one-byte length field).
pub const MAX_TRANSFER_SIZE: usize = 0xF6;

/// NDEF Tag Application AID (NFC Forum Type 4 Tag).
pub const NDEF_APPLICATION_ID: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];

/// File identifier of the reservation NDEF file.
pub const NDEF_FILE_ID: [u8; 2] = [0x00, 0x01];

/// Factory default MIFARE Classic key.
pub const DEFAULT_CLASSIC_KEY: [u8; 6] = [0xFF; 6];

/// MIFARE Classic block size in bytes.
pub const CLASSIC_BLOCK_SIZE: usize = 16;

/// Reader key slot used for the Classic key.
pub const CLASSIC_KEY_SLOT: u8 = 0x00;

const CLA_ISO: u8 = 0x00;
const CLA_READER: u8 = 0xFF;

/// Instruction byte values used by the kiosk.
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const READ_BINARY: u8 = 0xB0;
    pub const UPDATE_BINARY: u8 = 0xD6;
    pub const GET_DATA: u8 = 0xCA;
    pub const LOAD_KEY: u8 = 0x82;
    pub const GENERAL_AUTHENTICATE: u8 = 0x86;
}

/// MIFARE Classic key selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyType {
    A = 0x60,
    B = 0x61,
}

impl KeyType {
    /// Parse a key type byte from an AUTHENTICATE command.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x60 => Some(KeyType::A),
            0x61 => Some(KeyType::B),
            _ => None,
        }
    }
}

/// Two-byte status word returned after every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    pub sw1: u8,
    pub sw2: u8,
}

impl StatusWord {
    /// `90 00`: command completed.
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    /// `63 00`: authentication or verification failed.
    pub const AUTH_FAILED: StatusWord = StatusWord::new(0x63, 0x00);

    /// `69 82`: security status not satisfied (block not authenticated).
    pub const SECURITY_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x82);

    /// `6A 82`: file or application not found.
    pub const FILE_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x82);

    /// `6B 00`: offset outside the file.
    pub const WRONG_PARAMETERS: StatusWord = StatusWord::new(0x6B, 0x00);

    /// `6D 00`: instruction not supported.
    pub const INS_NOT_SUPPORTED: StatusWord = StatusWord::new(0x6D, 0x00);

    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Returns `true` only for `90 00`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// A short-form command APDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    pub le: Option<u8>,
}

impl ApduCommand {
    /// Build a command, rejecting data that does not fit a one-byte Lc.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ApduTooLong`] if `data` exceeds 255 bytes.
    pub fn new(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: Vec<u8>,
        le: Option<u8>,
    ) -> Result<Self> {
        if data.len() > usize::from(u8::MAX) {
            return Err(CodecError::ApduTooLong { len: data.len() });
        }
        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        })
    }

    /// `FF CA 00 00 00`: ask the reader for the card UID.
    #[must_use]
    pub fn get_uid() -> Self {
        Self::header_only(CLA_READER, ins::GET_DATA, 0x00, 0x00, Some(0x00))
    }

    /// `00 A4 04 00 Lc AID`: select an application by AID.
    #[must_use]
    pub fn select_application(aid: &[u8; 7]) -> Self {
        Self::with_data(CLA_ISO, ins::SELECT, 0x04, 0x00, aid.to_vec())
    }

    /// `00 A4 00 0C 02 FID`: select an elementary file, no response data.
    #[must_use]
    pub fn select_file(file_id: &[u8; 2]) -> Self {
        Self::with_data(CLA_ISO, ins::SELECT, 0x00, 0x0C, file_id.to_vec())
    }

    /// `00 B0 P1 P2 Le`: read `len` bytes at file `offset`.
    ///
    /// The offset is split big-endian across P1 (high) and P2 (low).
    #[must_use]
    pub fn read_binary(offset: u16, len: u8) -> Self {
        let [p1, p2] = offset.to_be_bytes();
        Self::header_only(CLA_ISO, ins::READ_BINARY, p1, p2, Some(len))
    }

    /// `00 D6 P1 P2 Lc DATA`: write `data` at file `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ApduTooLong`] if `data` exceeds 255 bytes.
    pub fn update_binary(offset: u16, data: &[u8]) -> Result<Self> {
        let [p1, p2] = offset.to_be_bytes();
        Self::new(CLA_ISO, ins::UPDATE_BINARY, p1, p2, data.to_vec(), None)
    }

    /// `FF 82 00 slot 06 KEY`: load a Classic key into the reader.
    #[must_use]
    pub fn load_key(slot: u8, key: &[u8; 6]) -> Self {
        Self::with_data(CLA_READER, ins::LOAD_KEY, 0x00, slot, key.to_vec())
    }

    /// `FF 86 00 00 05 01 00 block type slot`: authenticate a Classic block.
    #[must_use]
    pub fn authenticate(block: u8, key_type: KeyType, slot: u8) -> Self {
        Self::with_data(
            CLA_READER,
            ins::GENERAL_AUTHENTICATE,
            0x00,
            0x00,
            vec![0x01, 0x00, block, key_type as u8, slot],
        )
    }

    /// `FF B0 00 block 10`: read one Classic block.
    #[must_use]
    pub fn read_block(block: u8) -> Self {
        Self::header_only(
            CLA_READER,
            ins::READ_BINARY,
            0x00,
            block,
            Some(CLASSIC_BLOCK_SIZE as u8),
        )
    }

    /// `FF D6 00 block 10 DATA`: write one Classic block.
    #[must_use]
    pub fn update_block(block: u8, data: &[u8; CLASSIC_BLOCK_SIZE]) -> Self {
        Self::with_data(CLA_READER, ins::UPDATE_BINARY, 0x00, block, data.to_vec())
    }

    /// Parse a short-form command from raw bytes.
    ///
    /// Used by simulated cards to interpret what the reader transmits.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the bytes do not hold a full
    /// header or the declared data.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 4 {
            return Err(CodecError::truncated(4, raw.len()));
        }
        let (cla, ins, p1, p2) = (raw[0], raw[1], raw[2], raw[3]);
        let body = &raw[4..];

        let (data, le) = match body.len() {
            0 => (Vec::new(), None),
            1 => (Vec::new(), Some(body[0])),
            _ => {
                let lc = usize::from(body[0]);
                let end = 1 + lc;
                if body.len() < end {
                    return Err(CodecError::truncated(4 + end, raw.len()));
                }
                let le = body.get(end).copied();
                (body[1..end].to_vec(), le)
            }
        };

        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        })
    }

    /// P1/P2 read as a big-endian offset.
    #[must_use]
    pub fn offset(&self) -> u16 {
        u16::from_be_bytes([self.p1, self.p2])
    }

    /// Serialize to the bytes transmitted to the reader.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.data.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            out.push(le);
        }
        out
    }

    fn header_only(cla: u8, ins: u8, p1: u8, p2: u8, le: Option<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le,
        }
    }

    // Callers pass fixed-size arrays well under 255 bytes.
    fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= usize::from(u8::MAX));
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: None,
        }
    }
}

/// A response APDU: optional data followed by the status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    data: Vec<u8>,
    status: StatusWord,
}

impl ApduResponse {
    pub fn new(data: Vec<u8>, status: StatusWord) -> Self {
        Self { data, status }
    }

    /// Split raw reader output into data and status word.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidResponse`] when fewer than two bytes
    /// were received.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 {
            return Err(CodecError::InvalidResponse(format!(
                "expected at least 2 bytes, got {}",
                raw.len()
            )));
        }
        let split = raw.len() - 2;
        Ok(Self {
            data: raw[..split].to_vec(),
            status: StatusWord::new(raw[split], raw[split + 1]),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn status(&self) -> StatusWord {
        self.status
    }

    /// Serialize back to raw form (data followed by SW1 SW2).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        out.push(self.status.sw1);
        out.push(self.status.sw2);
        out
    }
}
