use super::{
    CardFormat, RecordLayout, WritePlan, WriteStep, decode_ascii, email_bytes, is_blank,
    reject_blank, ride_name_bytes, wait_seconds,
};
use crate::{
    error::Result,
    image::{CardImage, Region},
    ndef::{NdefMessage, NdefRecord, RESERVATION_RECORD_ID, RESERVATION_RECORD_TYPE, TNF_EXTERNAL},
};
use bytes::Bytes;
use kiosk_core::{CommandFlags, GuestEmail, Reservation, constants::MAX_GUEST_EMAIL_LENGTH};

/// NLEN: big-endian length of the NDEF message, at the start of the file.
pub const NLEN_REGION: Region = Region::new(0x0000, 2);

/// File offset of the NDEF message.
pub const MESSAGE_OFFSET: u16 = 0x0002;

/// Size of the reservation record payload.
pub const PAYLOAD_LEN: usize = 384;

/// Largest NLEN accepted when reading. Anything above is treated as garbage.
pub const MAX_MESSAGE_LEN: usize = 1024;

// Payload-relative field offsets.
const SEQUENCE: usize = 0x40;
const FLAGS: usize = 0x43;
const ATTRACTION: usize = 0x44;
const NAME_LEN: usize = 0x45;
const WAIT: usize = 0x46;
const FIXED_END: usize = 0x48;
const NAME: usize = 0x80;
const EMAIL_LEN: usize = 0x100;
const EMAIL: usize = 0x101;

const MAX_NAME_LEN: usize = EMAIL_LEN - NAME - 1;

/// Reservation stored as an external-type NDEF record on a Type 4 tag.
///
/// ```text
/// file 0x0000  NLEN (u16 BE)
/// file 0x0002  record header (18 bytes, type "qb3:memory", id "1")
/// file 0x0014  payload (384 bytes)
///   +0x40 sequence  +0x43 flags  +0x44 attraction  +0x45 name len
///   +0x46 wait seconds (u16 BE)  +0x80 name  +0x100 email len  +0x101 email
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NdefLayout;

impl NdefLayout {
    fn message_region(image: &CardImage) -> Option<Region> {
        let nlen = image.get(NLEN_REGION)?;
        let len = usize::from(u16::from_be_bytes([nlen[0], nlen[1]]));
        if len == 0 || len > MAX_MESSAGE_LEN {
            return None;
        }
        Some(Region::new(MESSAGE_OFFSET, len))
    }

    fn payload(image: &CardImage) -> Option<Bytes> {
        let message = image.get(Self::message_region(image)?)?;
        let message = NdefMessage::decode(message).ok()?;
        let record = message.find(TNF_EXTERNAL, RESERVATION_RECORD_TYPE)?;
        Some(record.payload.clone())
    }
}

impl RecordLayout for NdefLayout {
    fn format(&self) -> CardFormat {
        CardFormat::Ndef
    }

    fn max_ride_name_len(&self) -> usize {
        MAX_NAME_LEN
    }

    fn max_email_len(&self) -> usize {
        MAX_GUEST_EMAIL_LENGTH
    }

    fn header_region(&self) -> Region {
        NLEN_REGION
    }

    fn reservation_regions(&self, image: &CardImage) -> Vec<Region> {
        Self::message_region(image).into_iter().collect()
    }

    // The email lives in the same payload as the reservation.
    fn email_regions(&self, image: &CardImage) -> Vec<Region> {
        self.reservation_regions(image)
    }

    fn decode_reservation(&self, image: &CardImage) -> Option<Reservation> {
        let payload = Self::payload(image)?;
        if payload.len() < FIXED_END || is_blank(&payload) {
            return None;
        }

        let name_len = usize::from(payload[NAME_LEN]);
        if name_len > MAX_NAME_LEN {
            return None;
        }
        let name = payload.get(NAME..NAME + name_len)?;
        let seconds = u16::from_be_bytes([payload[WAIT], payload[WAIT + 1]]);

        Some(Reservation {
            command_sequence: payload[SEQUENCE],
            command_flags: CommandFlags::from_bits(payload[FLAGS]),
            attraction_id: payload[ATTRACTION],
            ride_name: decode_ascii(name),
            wait_time_minutes: Reservation::minutes_from_seconds(seconds),
        })
    }

    fn decode_email(&self, image: &CardImage) -> Option<GuestEmail> {
        let payload = Self::payload(image)?;
        let len = usize::from(*payload.get(EMAIL_LEN)?);
        if len == 0 || len > MAX_GUEST_EMAIL_LENGTH {
            return None;
        }
        GuestEmail::from_card_bytes(payload.get(EMAIL..EMAIL + len)?)
    }

    fn encode(&self, reservation: &Reservation, email: Option<&GuestEmail>) -> Result<WritePlan> {
        let name = ride_name_bytes(reservation, MAX_NAME_LEN)?;
        let seconds = wait_seconds(reservation)?;

        let mut payload = vec![0u8; PAYLOAD_LEN];
        payload[SEQUENCE] = reservation.command_sequence;
        payload[FLAGS] = reservation.command_flags.bits();
        payload[ATTRACTION] = reservation.attraction_id;
        payload[NAME_LEN] = name.len() as u8;
        payload[WAIT..FIXED_END].copy_from_slice(&seconds.to_be_bytes());
        payload[NAME..NAME + name.len()].copy_from_slice(&name);

        if let Some(email) = email {
            let bytes = email_bytes(email, MAX_GUEST_EMAIL_LENGTH)?;
            payload[EMAIL_LEN] = bytes.len() as u8;
            payload[EMAIL..EMAIL + bytes.len()].copy_from_slice(&bytes);
        }
        reject_blank(&payload)?;

        let record = NdefRecord::external(RESERVATION_RECORD_TYPE, RESERVATION_RECORD_ID, payload);
        let message = NdefMessage::new(vec![record]).encode()?;
        let nlen = message.len() as u16;

        Ok(WritePlan {
            clear: WriteStep::new(NLEN_REGION.offset, vec![0x00, 0x00]),
            body: vec![WriteStep::new(MESSAGE_OFFSET, message.to_vec())],
            commit: WriteStep::new(NLEN_REGION.offset, nlen.to_be_bytes().to_vec()),
        })
    }
}
