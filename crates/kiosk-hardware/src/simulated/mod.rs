//! Simulated reader and cards for development and testing.
//!
//! [`SimulatedReader`] implements [`CardReader`](crate::traits::CardReader)
//! and answers the same APDUs a PC/SC reader would, so the real transports
//! run unchanged on top of it.

mod card;
mod reader;

pub use card::{CLASSIC_1K_SIZE, NDEF_FILE_SIZE, SimulatedCard};
pub use reader::{SimulatedChannel, SimulatedReader, SimulatedReaderHandle};
