//! Reservation codec: on-card byte layouts for each card format.
//!
//! Every format implements [`RecordLayout`]. Reading is region driven: the
//! caller reads [`RecordLayout::header_region`], then whatever
//! [`RecordLayout::reservation_regions`] and [`RecordLayout::email_regions`]
//! ask for given what is already in the [`CardImage`], and finally decodes.
//! Writing goes through a [`WritePlan`] whose steps must be applied in
//! order: clear the header, write the body, commit the header.
//!
//! Decoding never fails. Blank, cleared, truncated or otherwise
//! unreadable data all decode to `None`.

mod classic;
mod ndef;

pub use classic::ClassicLayout;
pub use ndef::NdefLayout;

use crate::{
    error::{CodecError, Result},
    image::{CardImage, Region},
};
use kiosk_core::{GuestEmail, Reservation, constants::BLANK_SENTINEL};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Card technology the kiosk is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardFormat {
    /// NFC Forum Type 4 tag with an NDEF file, accessed over ISO 7816-4 APDUs.
    #[default]
    Ndef,

    /// MIFARE Classic 1K, accessed block by block with key A.
    Classic,
}

impl fmt::Display for CardFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CardFormat::Ndef => write!(f, "ndef"),
            CardFormat::Classic => write!(f, "classic"),
        }
    }
}

impl FromStr for CardFormat {
    type Err = kiosk_core::Error;

    fn from_str(s: &str) -> kiosk_core::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ndef" | "apdu" => Ok(CardFormat::Ndef),
            "classic" | "mifare" | "block" => Ok(CardFormat::Classic),
            other => Err(kiosk_core::Error::Config(format!(
                "Unknown card technology '{other}' (expected 'ndef' or 'classic')"
            ))),
        }
    }
}

/// A single write at an absolute card offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStep {
    pub offset: u16,
    pub bytes: Vec<u8>,
}

impl WriteStep {
    pub fn new(offset: u16, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            bytes: bytes.into(),
        }
    }

    pub fn region(&self) -> Region {
        Region::new(self.offset, self.bytes.len())
    }
}

/// Ordered writes that store one reservation.
///
/// `clear` invalidates the header, `body` carries the record, and `commit`
/// writes the final header. A card interrupted anywhere before `commit`
/// reads back as having no reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub clear: WriteStep,
    pub body: Vec<WriteStep>,
    pub commit: WriteStep,
}

impl WritePlan {
    /// All steps in the order they must be applied.
    pub fn steps(&self) -> impl Iterator<Item = &WriteStep> {
        std::iter::once(&self.clear)
            .chain(self.body.iter())
            .chain(std::iter::once(&self.commit))
    }

    /// Total bytes written by the plan.
    pub fn total_bytes(&self) -> usize {
        self.steps().map(|s| s.bytes.len()).sum()
    }
}

/// Mapping between a [`Reservation`] plus guest email and card bytes.
pub trait RecordLayout {
    fn format(&self) -> CardFormat;

    /// Longest ride name the layout stores.
    fn max_ride_name_len(&self) -> usize;

    /// Longest guest email the layout stores.
    fn max_email_len(&self) -> usize;

    /// Region read first on every poll.
    fn header_region(&self) -> Region;

    /// Further regions needed to decode the reservation, given the header.
    ///
    /// Empty when the header already says there is nothing to read.
    fn reservation_regions(&self, image: &CardImage) -> Vec<Region>;

    /// Regions needed to decode the guest email.
    fn email_regions(&self, image: &CardImage) -> Vec<Region>;

    fn decode_reservation(&self, image: &CardImage) -> Option<Reservation>;

    fn decode_email(&self, image: &CardImage) -> Option<GuestEmail>;

    /// Build the writes that store `reservation` and, if given, `email`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when a field does not fit the layout.
    fn encode(&self, reservation: &Reservation, email: Option<&GuestEmail>) -> Result<WritePlan>;
}

/// Runtime-selected layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyRecordLayout {
    Ndef(NdefLayout),
    Classic(ClassicLayout),
}

impl AnyRecordLayout {
    pub fn for_format(format: CardFormat) -> Self {
        match format {
            CardFormat::Ndef => AnyRecordLayout::Ndef(NdefLayout),
            CardFormat::Classic => AnyRecordLayout::Classic(ClassicLayout),
        }
    }
}

impl From<CardFormat> for AnyRecordLayout {
    fn from(format: CardFormat) -> Self {
        AnyRecordLayout::for_format(format)
    }
}

macro_rules! dispatch {
    ($self:ident, $layout:ident => $body:expr) => {
        match $self {
            AnyRecordLayout::Ndef($layout) => $body,
            AnyRecordLayout::Classic($layout) => $body,
        }
    };
}

impl RecordLayout for AnyRecordLayout {
    fn format(&self) -> CardFormat {
        dispatch!(self, l => l.format())
    }

    fn max_ride_name_len(&self) -> usize {
        dispatch!(self, l => l.max_ride_name_len())
    }

    fn max_email_len(&self) -> usize {
        dispatch!(self, l => l.max_email_len())
    }

    fn header_region(&self) -> Region {
        dispatch!(self, l => l.header_region())
    }

    fn reservation_regions(&self, image: &CardImage) -> Vec<Region> {
        dispatch!(self, l => l.reservation_regions(image))
    }

    fn email_regions(&self, image: &CardImage) -> Vec<Region> {
        dispatch!(self, l => l.email_regions(image))
    }

    fn decode_reservation(&self, image: &CardImage) -> Option<Reservation> {
        dispatch!(self, l => l.decode_reservation(image))
    }

    fn decode_email(&self, image: &CardImage) -> Option<GuestEmail> {
        dispatch!(self, l => l.decode_email(image))
    }

    fn encode(&self, reservation: &Reservation, email: Option<&GuestEmail>) -> Result<WritePlan> {
        dispatch!(self, l => l.encode(reservation, email))
    }
}

/// Returns `true` if `bytes` is non-empty and entirely `value`.
pub(crate) fn is_filled_with(bytes: &[u8], value: u8) -> bool {
    !bytes.is_empty() && bytes.iter().all(|&b| b == value)
}

/// Blank-card check shared by both layouts.
pub(crate) fn is_blank(bytes: &[u8]) -> bool {
    is_filled_with(bytes, BLANK_SENTINEL) || is_filled_with(bytes, 0x00)
}

/// ASCII bytes of the ride name after length checks.
///
/// NUL is dropped along with non-ASCII so the stored length matches what
/// [`decode_ascii`] returns.
pub(crate) fn ride_name_bytes(reservation: &Reservation, max: usize) -> Result<Vec<u8>> {
    let mut name = kiosk_core::ascii_only(&reservation.ride_name).into_bytes();
    name.retain(|&b| b != 0);
    if name.len() > max {
        return Err(CodecError::RideNameTooLong {
            len: name.len(),
            max,
        });
    }
    Ok(name)
}

/// Refuse an encoded record that `decode_reservation` would read as cleared.
pub(crate) fn reject_blank(record: &[u8]) -> Result<()> {
    if is_blank(record) {
        return Err(CodecError::BlankRecord);
    }
    Ok(())
}

/// Wire seconds for the reservation's wait time.
pub(crate) fn wait_seconds(reservation: &Reservation) -> Result<u16> {
    reservation
        .wait_time_seconds()
        .map_err(|_| CodecError::WaitTimeOutOfRange {
            minutes: reservation.wait_time_minutes,
        })
}

pub(crate) fn email_bytes(email: &GuestEmail, max: usize) -> Result<Vec<u8>> {
    if email.len() > max {
        return Err(CodecError::EmailTooLong {
            len: email.len(),
            max,
        });
    }
    Ok(email.as_str().as_bytes().to_vec())
}

/// Decode an ASCII name field; non-ASCII bytes are dropped.
pub(crate) fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii() && **b != 0)
        .map(|&b| b as char)
        .collect()
}
