//! In-memory cards that answer APDUs like the real ones.

use crate::transport::is_sector_trailer;
use kiosk_core::TagUid;
use kiosk_protocol::{
    ApduCommand, ApduResponse, CardFormat, KeyType, StatusWord, WritePlan,
    apdu::{CLASSIC_BLOCK_SIZE, DEFAULT_CLASSIC_KEY, NDEF_APPLICATION_ID, NDEF_FILE_ID, ins},
};

/// Size of the simulated NDEF file.
pub const NDEF_FILE_SIZE: usize = 0x800;

/// Size of a simulated MIFARE Classic 1K card.
pub const CLASSIC_1K_SIZE: usize = 1024;

const BLOCKS: usize = CLASSIC_1K_SIZE / CLASSIC_BLOCK_SIZE;

/// Factory sector trailer: key A, access bits, key B.
const FACTORY_TRAILER: [u8; CLASSIC_BLOCK_SIZE] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x07, 0x80, 0x69, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF,
];

const STATUS_WRONG_LENGTH: StatusWord = StatusWord::new(0x67, 0x00);
const STATUS_NOT_ALLOWED: StatusWord = StatusWord::new(0x69, 0x86);
const STATUS_CONDITIONS: StatusWord = StatusWord::new(0x69, 0x85);

/// A card held by the simulated reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedCard {
    uid: TagUid,
    format: CardFormat,
    memory: Vec<u8>,
}

impl SimulatedCard {
    /// A Type 4 tag with an unwritten NDEF file (all `0xAA`).
    pub fn blank_ndef(uid: TagUid) -> Self {
        Self {
            uid,
            format: CardFormat::Ndef,
            memory: vec![0xAA; NDEF_FILE_SIZE],
        }
    }

    /// A factory-fresh MIFARE Classic 1K card.
    pub fn blank_classic(uid: TagUid) -> Self {
        let mut memory = vec![0u8; CLASSIC_1K_SIZE];
        let uid_len = uid.as_bytes().len().min(CLASSIC_BLOCK_SIZE);
        memory[..uid_len].copy_from_slice(&uid.as_bytes()[..uid_len]);
        for block in 0..BLOCKS {
            if is_sector_trailer(block as u8) {
                let start = block * CLASSIC_BLOCK_SIZE;
                memory[start..start + CLASSIC_BLOCK_SIZE].copy_from_slice(&FACTORY_TRAILER);
            }
        }
        Self {
            uid,
            format: CardFormat::Classic,
            memory,
        }
    }

    /// A blank card of the given format.
    pub fn blank(format: CardFormat, uid: TagUid) -> Self {
        match format {
            CardFormat::Ndef => Self::blank_ndef(uid),
            CardFormat::Classic => Self::blank_classic(uid),
        }
    }

    /// Apply a write plan directly to memory, as if it had been written.
    #[must_use]
    pub fn with_plan(mut self, plan: &WritePlan) -> Self {
        for step in plan.steps() {
            self.poke(usize::from(step.offset), &step.bytes);
        }
        self
    }

    /// Overwrite memory at `offset`. Bytes past the end are dropped.
    pub fn poke(&mut self, offset: usize, bytes: &[u8]) {
        let end = (offset + bytes.len()).min(self.memory.len());
        if offset < end {
            self.memory[offset..end].copy_from_slice(&bytes[..end - offset]);
        }
    }

    pub fn uid(&self) -> &TagUid {
        &self.uid
    }

    pub fn format(&self) -> CardFormat {
        self.format
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn sector_key_a(&self, block: usize) -> &[u8] {
        let trailer = (block / 4) * 4 + 3;
        let start = trailer * CLASSIC_BLOCK_SIZE;
        &self.memory[start..start + 6]
    }

    /// Execute one command against the card.
    pub(crate) fn execute(&mut self, session: &mut CardSession, command: &ApduCommand) -> ApduResponse {
        let status = |s: StatusWord| ApduResponse::new(Vec::new(), s);

        match (command.cla, command.ins) {
            (0xFF, ins::GET_DATA) if command.p1 == 0x00 => {
                ApduResponse::new(self.uid.as_bytes().to_vec(), StatusWord::SUCCESS)
            }
            (0xFF, ins::LOAD_KEY) => match <[u8; 6]>::try_from(command.data.as_slice()) {
                Ok(key) => {
                    session.loaded_key = Some(key);
                    status(StatusWord::SUCCESS)
                }
                Err(_) => status(STATUS_WRONG_LENGTH),
            },
            _ => match self.format {
                CardFormat::Ndef => self.execute_ndef(session, command),
                CardFormat::Classic => self.execute_classic(session, command),
            },
        }
    }

    fn execute_ndef(&mut self, session: &mut CardSession, command: &ApduCommand) -> ApduResponse {
        let status = |s: StatusWord| ApduResponse::new(Vec::new(), s);

        if command.cla != 0x00 {
            return status(StatusWord::INS_NOT_SUPPORTED);
        }

        match command.ins {
            ins::SELECT if command.p1 == 0x04 => {
                if command.data == NDEF_APPLICATION_ID {
                    session.application_selected = true;
                    session.file_selected = false;
                    status(StatusWord::SUCCESS)
                } else {
                    status(StatusWord::FILE_NOT_FOUND)
                }
            }
            ins::SELECT => {
                if session.application_selected && command.data == NDEF_FILE_ID {
                    session.file_selected = true;
                    status(StatusWord::SUCCESS)
                } else {
                    status(StatusWord::FILE_NOT_FOUND)
                }
            }
            ins::READ_BINARY | ins::UPDATE_BINARY if !session.file_selected => {
                status(STATUS_CONDITIONS)
            }
            ins::READ_BINARY => {
                let start = usize::from(command.offset());
                let len = usize::from(command.le.unwrap_or(0));
                match self.memory.get(start..start + len) {
                    Some(data) => ApduResponse::new(data.to_vec(), StatusWord::SUCCESS),
                    None => status(StatusWord::WRONG_PARAMETERS),
                }
            }
            ins::UPDATE_BINARY => {
                let start = usize::from(command.offset());
                let end = start + command.data.len();
                if end > self.memory.len() {
                    return status(StatusWord::WRONG_PARAMETERS);
                }
                self.memory[start..end].copy_from_slice(&command.data);
                status(StatusWord::SUCCESS)
            }
            _ => status(StatusWord::INS_NOT_SUPPORTED),
        }
    }

    fn execute_classic(&mut self, session: &mut CardSession, command: &ApduCommand) -> ApduResponse {
        let status = |s: StatusWord| ApduResponse::new(Vec::new(), s);

        if command.cla != 0xFF {
            return status(StatusWord::FILE_NOT_FOUND);
        }

        match command.ins {
            ins::GENERAL_AUTHENTICATE => {
                let (block, key_type) = match command.data.as_slice() {
                    [0x01, 0x00, block, key_type, _slot] => (usize::from(*block), *key_type),
                    _ => return status(STATUS_WRONG_LENGTH),
                };
                let key_ok = KeyType::from_u8(key_type) == Some(KeyType::A)
                    && session.loaded_key.as_ref().map(|k| k.as_slice())
                        == Some(self.sector_key_a(block.min(BLOCKS - 1)));
                if block < BLOCKS && key_ok {
                    session.authenticated_sector = Some(block / 4);
                    status(StatusWord::SUCCESS)
                } else {
                    session.authenticated_sector = None;
                    status(StatusWord::AUTH_FAILED)
                }
            }
            ins::READ_BINARY | ins::UPDATE_BINARY => {
                let block = usize::from(command.p2);
                if block >= BLOCKS {
                    return status(StatusWord::WRONG_PARAMETERS);
                }
                if session.authenticated_sector != Some(block / 4) {
                    return status(StatusWord::SECURITY_NOT_SATISFIED);
                }
                let start = block * CLASSIC_BLOCK_SIZE;
                let range = start..start + CLASSIC_BLOCK_SIZE;

                if command.ins == ins::READ_BINARY {
                    return ApduResponse::new(self.memory[range].to_vec(), StatusWord::SUCCESS);
                }
                if block == 0 {
                    return status(STATUS_NOT_ALLOWED);
                }
                if command.data.len() != CLASSIC_BLOCK_SIZE {
                    return status(STATUS_WRONG_LENGTH);
                }
                self.memory[range].copy_from_slice(&command.data);
                status(StatusWord::SUCCESS)
            }
            _ => status(StatusWord::INS_NOT_SUPPORTED),
        }
    }
}

/// Per-connection card state.
#[derive(Debug, Clone, Default)]
pub(crate) struct CardSession {
    pub loaded_key: Option<[u8; 6]>,
    pub application_selected: bool,
    pub file_selected: bool,
    pub authenticated_sector: Option<usize>,
}
