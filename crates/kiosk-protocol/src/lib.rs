//! Wire formats for the ride kiosk's smartcards.
//!
//! - [`apdu`]: command/response framing for PC/SC readers (ISO 7816-4 plus
//!   the reader's pseudo-APDUs for MIFARE Classic).
//! - [`ndef`]: the NDEF record container used on Type 4 tags.
//! - [`layout`]: the reservation codec, mapping a [`Reservation`] and the
//!   guest email onto each card format's byte layout.
//! - [`image`]: sparse snapshots of card memory that layouts decode from.
//!
//! [`Reservation`]: kiosk_core::Reservation

pub mod apdu;
pub mod error;
pub mod image;
pub mod layout;
pub mod ndef;

pub use apdu::{ApduCommand, ApduResponse, KeyType, StatusWord};
pub use error::{CodecError, Result};
pub use image::{CardImage, Region};
pub use layout::{
    AnyRecordLayout, CardFormat, ClassicLayout, NdefLayout, RecordLayout, WritePlan, WriteStep,
};
pub use ndef::{NdefMessage, NdefRecord};
