use super::{
    CardFormat, RecordLayout, WritePlan, WriteStep, decode_ascii, email_bytes, is_blank,
    reject_blank, ride_name_bytes, wait_seconds,
};
use crate::{
    apdu::CLASSIC_BLOCK_SIZE,
    error::Result,
    image::{CardImage, Region},
};
use kiosk_core::{CommandFlags, GuestEmail, Reservation};

/// Block 4: `[seq, flags, attraction, name_len, wait_hi, wait_lo, 0...]`.
pub const HEADER_REGION: Region = Region::new(4 * CLASSIC_BLOCK_SIZE as u16, CLASSIC_BLOCK_SIZE);

/// Blocks 8-9: ride name, zero padded.
pub const NAME_OFFSET: u16 = 8 * CLASSIC_BLOCK_SIZE as u16;

/// Number of blocks reserved for the ride name.
pub const NAME_BLOCKS: usize = 2;

/// Blocks 12-14: email length byte followed by the email.
pub const EMAIL_REGION: Region = Region::new(12 * CLASSIC_BLOCK_SIZE as u16, 3 * CLASSIC_BLOCK_SIZE);

const MAX_NAME_LEN: usize = NAME_BLOCKS * CLASSIC_BLOCK_SIZE;
const MAX_EMAIL_LEN: usize = EMAIL_REGION.len - 1;

/// Reservation stored directly in MIFARE Classic 1K data blocks.
///
/// Only data blocks of sectors 1-3 are used; block 0 and sector trailers
/// are never addressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassicLayout;

impl ClassicLayout {
    fn header(image: &CardImage) -> Option<&[u8]> {
        image.get(HEADER_REGION).filter(|h| !is_blank(h))
    }

    fn name_len(header: &[u8]) -> Option<usize> {
        let len = usize::from(header[3]);
        (len <= MAX_NAME_LEN).then_some(len)
    }
}

impl RecordLayout for ClassicLayout {
    fn format(&self) -> CardFormat {
        CardFormat::Classic
    }

    fn max_ride_name_len(&self) -> usize {
        MAX_NAME_LEN
    }

    fn max_email_len(&self) -> usize {
        MAX_EMAIL_LEN
    }

    fn header_region(&self) -> Region {
        HEADER_REGION
    }

    fn reservation_regions(&self, image: &CardImage) -> Vec<Region> {
        match Self::header(image).and_then(Self::name_len) {
            Some(len) if len > 0 => {
                let blocks = len.div_ceil(CLASSIC_BLOCK_SIZE);
                vec![Region::new(NAME_OFFSET, blocks * CLASSIC_BLOCK_SIZE)]
            }
            _ => Vec::new(),
        }
    }

    fn email_regions(&self, _image: &CardImage) -> Vec<Region> {
        vec![EMAIL_REGION]
    }

    fn decode_reservation(&self, image: &CardImage) -> Option<Reservation> {
        let header = Self::header(image)?;
        let name_len = Self::name_len(header)?;
        let ride_name = match name_len {
            0 => String::new(),
            len => decode_ascii(image.get(Region::new(NAME_OFFSET, len))?),
        };
        let seconds = u16::from_be_bytes([header[4], header[5]]);

        Some(Reservation {
            command_sequence: header[0],
            command_flags: CommandFlags::from_bits(header[1]),
            attraction_id: header[2],
            ride_name,
            wait_time_minutes: Reservation::minutes_from_seconds(seconds),
        })
    }

    fn decode_email(&self, image: &CardImage) -> Option<GuestEmail> {
        let region = image.get(EMAIL_REGION)?;
        let len = usize::from(region[0]);
        if len == 0 || len > MAX_EMAIL_LEN {
            return None;
        }
        GuestEmail::from_card_bytes(&region[1..=len])
    }

    fn encode(&self, reservation: &Reservation, email: Option<&GuestEmail>) -> Result<WritePlan> {
        let name = ride_name_bytes(reservation, MAX_NAME_LEN)?;
        let seconds = wait_seconds(reservation)?.to_be_bytes();

        let mut header = vec![0u8; CLASSIC_BLOCK_SIZE];
        header[..6].copy_from_slice(&[
            reservation.command_sequence,
            reservation.command_flags.bits(),
            reservation.attraction_id,
            name.len() as u8,
            seconds[0],
            seconds[1],
        ]);
        reject_blank(&header)?;

        let mut name_blocks = vec![0u8; MAX_NAME_LEN];
        name_blocks[..name.len()].copy_from_slice(&name);

        let mut body = vec![WriteStep::new(NAME_OFFSET, name_blocks)];
        if let Some(email) = email {
            let bytes = email_bytes(email, MAX_EMAIL_LEN)?;
            let mut field = vec![0u8; EMAIL_REGION.len];
            field[0] = bytes.len() as u8;
            field[1..=bytes.len()].copy_from_slice(&bytes);
            body.push(WriteStep::new(EMAIL_REGION.offset, field));
        }

        Ok(WritePlan {
            clear: WriteStep::new(HEADER_REGION.offset, vec![0u8; CLASSIC_BLOCK_SIZE]),
            body,
            commit: WriteStep::new(HEADER_REGION.offset, header),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodecError;

    fn apply(plan: &WritePlan, memory: &mut [u8]) {
        for step in plan.steps() {
            let start = usize::from(step.offset);
            memory[start..start + step.bytes.len()].copy_from_slice(&step.bytes);
        }
    }

    #[test]
    fn test_plan_never_touches_trailers() {
        let reservation = Reservation::new(7, "Log Flume", 12);
        let email = GuestEmail::new("guest@example.com").unwrap();
        let plan = ClassicLayout.encode(&reservation, Some(&email)).unwrap();

        for step in plan.steps() {
            let first = usize::from(step.offset) / CLASSIC_BLOCK_SIZE;
            let last = (step.region().end() - 1) / CLASSIC_BLOCK_SIZE;
            for block in first..=last {
                assert_ne!(block, 0);
                assert_ne!((block + 1) % 4, 0, "block {block} is a sector trailer");
            }
        }
    }

    #[test]
    fn test_header_block_contents() {
        let reservation = Reservation::new(7, "Log Flume", 12).with_command_sequence(3);
        let plan = ClassicLayout.encode(&reservation, None).unwrap();

        assert_eq!(plan.clear.bytes, vec![0u8; 16]);
        assert_eq!(&plan.commit.bytes[..6], &[3, 0x40, 7, 9, 0x02, 0xD0]);
        assert_eq!(plan.body.len(), 1);
        assert_eq!(&plan.body[0].bytes[..9], b"Log Flume");
        assert_eq!(plan.body[0].bytes.len(), 32);
    }

    #[test]
    fn test_round_trip_through_memory() {
        let reservation = Reservation::new(7, "Log Flume", 12);
        let email = GuestEmail::new("guest@example.com").unwrap();
        let plan = ClassicLayout.encode(&reservation, Some(&email)).unwrap();

        let mut memory = vec![0xAAu8; 1024];
        apply(&plan, &mut memory);
        let image = CardImage::new().with(0, memory);

        let decoded = ClassicLayout.decode_reservation(&image).unwrap();
        assert_eq!(decoded.ride_name, "Log Flume");
        assert_eq!(decoded.attraction_id, 7);
        assert_eq!(decoded.wait_time_minutes, 12);
        assert_eq!(ClassicLayout.decode_email(&image), Some(email));
    }

    #[test]
    fn test_regions_from_header() {
        let mut header = vec![0u8; 16];
        header[..4].copy_from_slice(&[1, 0x40, 7, 20]);
        let image = CardImage::new().with(HEADER_REGION.offset, header);

        assert_eq!(
            ClassicLayout.reservation_regions(&image),
            vec![Region::new(0x80, 32)]
        );
        assert_eq!(ClassicLayout.email_regions(&image), vec![EMAIL_REGION]);
    }

    #[test]
    fn test_blank_and_cleared_headers() {
        for fill in [0xAAu8, 0x00] {
            let image = CardImage::new()
                .with(0, vec![fill; 1024]);
            assert!(ClassicLayout.reservation_regions(&image).is_empty());
            assert!(ClassicLayout.decode_reservation(&image).is_none());
            assert!(ClassicLayout.decode_email(&image).is_none());
        }
    }

    #[test]
    fn test_declared_name_too_long_decodes_to_none() {
        let mut memory = vec![0u8; 1024];
        memory[0x40..0x44].copy_from_slice(&[1, 0x40, 7, 33]);
        let image = CardImage::new().with(0, memory);
        assert!(ClassicLayout.decode_reservation(&image).is_none());
    }

    #[test]
    fn test_email_limit() {
        let reservation = Reservation::new(1, "Coaster", 5);
        let long = GuestEmail::new(&format!("{}@x.io", "a".repeat(45))).unwrap();
        assert!(matches!(
            ClassicLayout.encode(&reservation, Some(&long)),
            Err(CodecError::EmailTooLong { len: 50, max: 47 })
        ));
    }
}
