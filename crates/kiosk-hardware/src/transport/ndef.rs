use super::{open_channel, transmit_checked};
use crate::{
    error::{HardwareError, Result},
    traits::{ApduChannel, CardConnection, CardReader, CardTransport},
    types::TransportConfig,
};
use kiosk_core::TagUid;
use kiosk_protocol::{
    ApduCommand, CardFormat,
    apdu::{MAX_TRANSFER_SIZE, NDEF_APPLICATION_ID, NDEF_FILE_ID},
};
use tracing::{debug, warn};

/// NDEF file access over ISO 7816-4 APDUs.
#[derive(Debug)]
pub struct NdefTransport<R> {
    reader: R,
    config: TransportConfig,
}

impl<R: CardReader> NdefTransport<R> {
    pub fn new(reader: R, config: TransportConfig) -> Self {
        Self { reader, config }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

impl<R: CardReader> CardTransport for NdefTransport<R> {
    type Connection = NdefConnection<R::Channel>;

    fn format(&self) -> CardFormat {
        CardFormat::Ndef
    }

    async fn connect(&mut self) -> Result<Self::Connection> {
        let (mut channel, uid) = open_channel(&mut self.reader, &self.config).await?;

        let selected = async {
            transmit_checked(&mut channel, &ApduCommand::select_application(&NDEF_APPLICATION_ID))
                .await?;
            transmit_checked(&mut channel, &ApduCommand::select_file(&NDEF_FILE_ID)).await
        }
        .await;

        if let Err(e) = selected {
            warn!(uid = %uid, error = %e, "NDEF file selection failed");
            if let Err(close) = channel.disconnect().await {
                warn!(error = %close, "Failed to disconnect after selection failure");
            }
            return Err(e);
        }

        debug!(uid = %uid, "NDEF card connected");
        Ok(NdefConnection { channel, uid })
    }
}

/// A Type 4 tag with the NDEF file selected.
#[derive(Debug)]
pub struct NdefConnection<C> {
    channel: C,
    uid: TagUid,
}

/// Split `[offset, offset + len)` into transfer-sized chunks.
fn chunks(offset: u16, len: usize) -> Result<Vec<(u16, usize)>> {
    let end = usize::from(offset) + len;
    if end > usize::from(u16::MAX) + 1 {
        return Err(HardwareError::invalid_address(format!(
            "range {offset:#06X}+{len} exceeds the 16-bit file space"
        )));
    }

    let mut out = Vec::with_capacity(len.div_ceil(MAX_TRANSFER_SIZE));
    let mut pos = 0usize;
    while pos < len {
        let size = MAX_TRANSFER_SIZE.min(len - pos);
        out.push(((usize::from(offset) + pos) as u16, size));
        pos += size;
    }
    Ok(out)
}

impl<C: ApduChannel> CardConnection for NdefConnection<C> {
    fn uid(&self) -> &TagUid {
        &self.uid
    }

    async fn read(&mut self, offset: u16, len: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len);
        for (chunk_offset, size) in chunks(offset, len)? {
            let command = ApduCommand::read_binary(chunk_offset, size as u8);
            let chunk = transmit_checked(&mut self.channel, &command).await?;
            if chunk.len() != size {
                return Err(HardwareError::protocol(format!(
                    "READ BINARY at {chunk_offset:#06X} returned {} bytes, expected {size}",
                    chunk.len()
                )));
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    async fn write(&mut self, offset: u16, bytes: &[u8]) -> Result<()> {
        let mut pos = 0usize;
        for (chunk_offset, size) in chunks(offset, bytes.len())? {
            let command = ApduCommand::update_binary(chunk_offset, &bytes[pos..pos + size])?;
            transmit_checked(&mut self.channel, &command).await?;
            pos += size;
        }
        Ok(())
    }

    async fn release(self) -> Result<()> {
        self.channel.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0)]
    #[case(2, 1, 1)]
    #[case(2, 246, 1)]
    #[case(2, 247, 2)]
    #[case(2, 402, 2)]
    #[case(0x100, 1000, 5)]
    fn test_chunk_count(#[case] offset: u16, #[case] len: usize, #[case] expected: usize) {
        let chunks = chunks(offset, len).unwrap();
        assert_eq!(chunks.len(), expected);
        assert_eq!(chunks.len(), len.div_ceil(MAX_TRANSFER_SIZE));

        // Contiguous, non-overlapping, covering exactly `len` bytes.
        let mut next = usize::from(offset);
        for (chunk_offset, size) in &chunks {
            assert_eq!(usize::from(*chunk_offset), next);
            assert!(*size <= MAX_TRANSFER_SIZE);
            next += size;
        }
        assert_eq!(next, usize::from(offset) + len);
    }

    #[test]
    fn test_chunks_reject_overflow() {
        assert!(chunks(0xFFFF, 2).is_err());
        assert!(chunks(0xFFFF, 1).is_ok());
    }
}
