use crate::error::{CodecError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Type name Format for NFC Forum external types (`urn:nfc:ext:`).
pub const TNF_EXTERNAL: u8 = 0x04;

/// External type of the reservation record (`urn:nfc:ext:qb3:memory`).
pub const RESERVATION_RECORD_TYPE: &[u8] = b"qb3:memory";

/// Record id carried by the reservation record.
pub const RESERVATION_RECORD_ID: &[u8] = b"1";

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

/// A single NDEF record.
///
/// Records are always encoded in long form (4-byte payload length) so the
/// header size does not depend on the payload. Decoding accepts both forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: u8,
    pub record_type: Bytes,
    pub id: Bytes,
    pub payload: Bytes,
}

impl NdefRecord {
    /// Create an NFC Forum external-type record.
    pub fn external(
        record_type: impl Into<Bytes>,
        id: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            tnf: TNF_EXTERNAL,
            record_type: record_type.into(),
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// Header length of this record when encoded.
    ///
    /// For the reservation record this is 18 bytes: flags, type length,
    /// 4-byte payload length, id length, 10 type bytes and 1 id byte.
    #[must_use]
    pub fn header_len(&self) -> usize {
        let id_len_field = usize::from(!self.id.is_empty());
        1 + 1 + 4 + id_len_field + self.record_type.len() + self.id.len()
    }

    /// Encode the record, setting MB/ME from its position in a message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedRecord`] if the type or id does not
    /// fit a one-byte length.
    pub fn encode_into(&self, buf: &mut BytesMut, first: bool, last: bool) -> Result<()> {
        let type_len = u8::try_from(self.record_type.len())
            .map_err(|_| CodecError::unsupported("record type longer than 255 bytes"))?;
        let id_len = u8::try_from(self.id.len())
            .map_err(|_| CodecError::unsupported("record id longer than 255 bytes"))?;
        let payload_len = u32::try_from(self.payload.len())
            .map_err(|_| CodecError::unsupported("payload longer than 4 GiB"))?;

        let mut header = self.tnf & TNF_MASK;
        if first {
            header |= FLAG_MB;
        }
        if last {
            header |= FLAG_ME;
        }
        if id_len > 0 {
            header |= FLAG_IL;
        }

        buf.reserve(self.header_len() + self.payload.len());
        buf.put_u8(header);
        buf.put_u8(type_len);
        buf.put_u32(payload_len);
        if id_len > 0 {
            buf.put_u8(id_len);
        }
        buf.put_slice(&self.record_type);
        buf.put_slice(&self.id);
        buf.put_slice(&self.payload);
        Ok(())
    }
}

/// An NDEF message: an ordered list of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NdefMessage {
    records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[NdefRecord] {
        &self.records
    }

    /// First record with the given TNF and type.
    pub fn find(&self, tnf: u8, record_type: &[u8]) -> Option<&NdefRecord> {
        self.records
            .iter()
            .find(|r| r.tnf == tnf && r.record_type.as_ref() == record_type)
    }

    /// Encode all records.
    ///
    /// # Errors
    ///
    /// Propagates record-level encoding errors.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        let last_index = self.records.len().saturating_sub(1);
        for (i, record) in self.records.iter().enumerate() {
            record.encode_into(&mut buf, i == 0, i == last_index)?;
        }
        Ok(buf.freeze())
    }

    /// Decode a message from its raw bytes.
    ///
    /// Decoding stops after the record flagged ME; trailing bytes are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if a header or body runs past the
    /// input, or [`CodecError::UnsupportedRecord`] for chunked records.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut records = Vec::new();
        let mut pos = 0usize;

        loop {
            let header = *data.get(pos).ok_or_else(|| CodecError::truncated(pos + 1, data.len()))?;
            if header & FLAG_CF != 0 {
                return Err(CodecError::unsupported("chunked records"));
            }
            pos += 1;

            let type_len = usize::from(take(data, &mut pos, 1)?[0]);
            let payload_len = if header & FLAG_SR != 0 {
                usize::from(take(data, &mut pos, 1)?[0])
            } else {
                let raw = take(data, &mut pos, 4)?;
                u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
            };
            let id_len = if header & FLAG_IL != 0 {
                usize::from(take(data, &mut pos, 1)?[0])
            } else {
                0
            };

            let record_type = Bytes::copy_from_slice(take(data, &mut pos, type_len)?);
            let id = Bytes::copy_from_slice(take(data, &mut pos, id_len)?);
            let payload = Bytes::copy_from_slice(take(data, &mut pos, payload_len)?);

            records.push(NdefRecord {
                tnf: header & TNF_MASK,
                record_type,
                id,
                payload,
            });

            if header & FLAG_ME != 0 {
                break;
            }
        }

        Ok(Self { records })
    }
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.saturating_add(len);
    let slice = data
        .get(*pos..end)
        .ok_or_else(|| CodecError::truncated(end, data.len()))?;
    *pos = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation_record(payload_len: usize) -> NdefRecord {
        NdefRecord::external(
            RESERVATION_RECORD_TYPE,
            RESERVATION_RECORD_ID,
            vec![0x11u8; payload_len],
        )
    }

    #[test]
    fn test_reservation_header_is_18_bytes() {
        let record = reservation_record(384);
        assert_eq!(record.header_len(), 18);

        let encoded = NdefMessage::new(vec![record]).encode().unwrap();
        assert_eq!(encoded.len(), 18 + 384);
        // MB | ME | IL | TNF external
        assert_eq!(encoded[0], 0xCC);
        assert_eq!(encoded[1], 10);
        assert_eq!(&encoded[2..6], &[0x00, 0x00, 0x01, 0x80]);
        assert_eq!(encoded[6], 1);
        assert_eq!(&encoded[7..17], b"qb3:memory");
        assert_eq!(encoded[17], b'1');
    }

    #[test]
    fn test_decode_finds_reservation_record() {
        let other = NdefRecord::external(&b"example.com:x"[..], Bytes::new(), vec![1u8, 2, 3]);
        let msg = NdefMessage::new(vec![other, reservation_record(8)]);
        let decoded = NdefMessage::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.records().len(), 2);
        let found = decoded.find(TNF_EXTERNAL, RESERVATION_RECORD_TYPE).unwrap();
        assert_eq!(found.id.as_ref(), RESERVATION_RECORD_ID);
        assert_eq!(found.payload.len(), 8);
    }

    #[test]
    fn test_decode_short_record() {
        // MB | ME | SR, TNF well-known, type "T", 3-byte payload
        let raw = [0xD1, 0x01, 0x03, b'T', 0x01, 0x02, 0x03];
        let msg = NdefMessage::decode(&raw).unwrap();
        assert_eq!(msg.records()[0].tnf, 0x01);
        assert_eq!(msg.records()[0].payload.as_ref(), &[1, 2, 3]);
        assert!(msg.find(TNF_EXTERNAL, RESERVATION_RECORD_TYPE).is_none());
    }

    #[test]
    fn test_decode_truncated_payload() {
        let encoded = NdefMessage::new(vec![reservation_record(384)]).encode().unwrap();
        let result = NdefMessage::decode(&encoded[..100]);
        assert!(matches!(result, Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn test_decode_rejects_chunked() {
        let raw = [0xB4, 0x01, 0x01, b'x', 0x00];
        assert!(matches!(
            NdefMessage::decode(&raw),
            Err(CodecError::UnsupportedRecord(_))
        ));
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(NdefMessage::decode(&[]).is_err());
    }
}
