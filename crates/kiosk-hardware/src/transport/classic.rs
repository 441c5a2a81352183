use super::{open_channel, transmit_checked};
use crate::{
    error::{HardwareError, Result},
    traits::{ApduChannel, CardConnection, CardReader, CardTransport},
    types::TransportConfig,
};
use kiosk_core::TagUid;
use kiosk_protocol::{
    ApduCommand, CardFormat, KeyType,
    apdu::{CLASSIC_BLOCK_SIZE, CLASSIC_KEY_SLOT},
};
use tracing::{debug, warn};

/// Number of blocks on a MIFARE Classic 1K card.
pub const CLASSIC_1K_BLOCKS: u8 = 64;

/// Returns `true` for the last block of each 4-block sector.
pub fn is_sector_trailer(block: u8) -> bool {
    block % 4 == 3
}

/// MIFARE Classic block access through the reader's pseudo-APDUs.
#[derive(Debug)]
pub struct ClassicTransport<R> {
    reader: R,
    config: TransportConfig,
}

impl<R: CardReader> ClassicTransport<R> {
    pub fn new(reader: R, config: TransportConfig) -> Self {
        Self { reader, config }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }
}

impl<R: CardReader> CardTransport for ClassicTransport<R> {
    type Connection = ClassicConnection<R::Channel>;

    fn format(&self) -> CardFormat {
        CardFormat::Classic
    }

    async fn connect(&mut self) -> Result<Self::Connection> {
        let (mut channel, uid) = open_channel(&mut self.reader, &self.config).await?;

        let load = ApduCommand::load_key(CLASSIC_KEY_SLOT, &self.config.classic_key);
        if let Err(e) = transmit_checked(&mut channel, &load).await {
            warn!(uid = %uid, error = %e, "Loading Classic key failed");
            if let Err(close) = channel.disconnect().await {
                warn!(error = %close, "Failed to disconnect after key load failure");
            }
            return Err(e);
        }

        debug!(uid = %uid, "Classic card connected");
        Ok(ClassicConnection {
            channel,
            uid,
            key_type: self.config.key_type,
        })
    }
}

/// One block read by [`ClassicConnection::dump_blocks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDump {
    pub block: u8,
    pub data: Vec<u8>,
}

/// A Classic card with its key loaded into the reader.
#[derive(Debug)]
pub struct ClassicConnection<C> {
    channel: C,
    uid: TagUid,
    key_type: KeyType,
}

impl<C: ApduChannel> ClassicConnection<C> {
    async fn authenticate(&mut self, block: u8) -> Result<()> {
        let command = ApduCommand::authenticate(block, self.key_type, CLASSIC_KEY_SLOT);
        transmit_checked(&mut self.channel, &command).await?;
        Ok(())
    }

    /// Authenticate and read one block.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for blocks past the end of a 1K card, `Status` if
    /// authentication or the read is rejected.
    pub async fn read_block(&mut self, block: u8) -> Result<[u8; CLASSIC_BLOCK_SIZE]> {
        if block >= CLASSIC_1K_BLOCKS {
            return Err(HardwareError::invalid_address(format!(
                "block {block} is outside a 1K card"
            )));
        }
        self.authenticate(block).await?;
        let data = transmit_checked(&mut self.channel, &ApduCommand::read_block(block)).await?;
        <[u8; CLASSIC_BLOCK_SIZE]>::try_from(data.as_slice()).map_err(|_| {
            HardwareError::protocol(format!(
                "block {block} read returned {} bytes",
                data.len()
            ))
        })
    }

    /// Authenticate and write one data block.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` for block 0, sector trailers, and blocks past the end
    /// of a 1K card. `Status` if the card rejects the write.
    pub async fn write_block(&mut self, block: u8, data: &[u8; CLASSIC_BLOCK_SIZE]) -> Result<()> {
        if block == 0 || block >= CLASSIC_1K_BLOCKS || is_sector_trailer(block) {
            return Err(HardwareError::invalid_address(format!(
                "block {block} is not a writable data block"
            )));
        }
        self.authenticate(block).await?;
        transmit_checked(&mut self.channel, &ApduCommand::update_block(block, data)).await?;
        Ok(())
    }

    /// Read every block the key opens.
    ///
    /// Blocks the card refuses are skipped; reader failures abort the dump.
    ///
    /// # Errors
    ///
    /// Returns any error other than a card status word.
    pub async fn dump_blocks(&mut self) -> Result<Vec<BlockDump>> {
        let mut blocks = Vec::with_capacity(usize::from(CLASSIC_1K_BLOCKS));
        for block in 0..CLASSIC_1K_BLOCKS {
            match self.read_block(block).await {
                Ok(data) => blocks.push(BlockDump {
                    block,
                    data: data.to_vec(),
                }),
                Err(HardwareError::Status { sw1, sw2 }) => {
                    debug!(block, sw1, sw2, "Block not readable, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(blocks)
    }
}

/// Blocks covering `[offset, offset + len)`.
fn block_span(offset: u16, len: usize) -> Result<std::ops::RangeInclusive<u8>> {
    let start = usize::from(offset);
    let end = start + len;
    if len == 0 || end > usize::from(CLASSIC_1K_BLOCKS) * CLASSIC_BLOCK_SIZE {
        return Err(HardwareError::invalid_address(format!(
            "range {offset:#06X}+{len} is outside a 1K card"
        )));
    }
    let first = (start / CLASSIC_BLOCK_SIZE) as u8;
    let last = ((end - 1) / CLASSIC_BLOCK_SIZE) as u8;
    Ok(first..=last)
}

impl<C: ApduChannel> CardConnection for ClassicConnection<C> {
    fn uid(&self) -> &TagUid {
        &self.uid
    }

    async fn read(&mut self, offset: u16, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let span = block_span(offset, len)?;
        let base = usize::from(*span.start()) * CLASSIC_BLOCK_SIZE;

        let mut data = Vec::with_capacity(span.len() * CLASSIC_BLOCK_SIZE);
        for block in span {
            data.extend_from_slice(&self.read_block(block).await?);
        }

        let skip = usize::from(offset) - base;
        Ok(data[skip..skip + len].to_vec())
    }

    async fn write(&mut self, offset: u16, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let span = block_span(offset, bytes.len())?;
        let start = usize::from(offset);
        let end = start + bytes.len();

        // Refuse the whole range before touching the card.
        for block in span.clone() {
            if block == 0 || is_sector_trailer(block) {
                return Err(HardwareError::invalid_address(format!(
                    "range {offset:#06X}+{} covers protected block {block}",
                    bytes.len()
                )));
            }
        }

        for block in span {
            let block_start = usize::from(block) * CLASSIC_BLOCK_SIZE;
            let block_end = block_start + CLASSIC_BLOCK_SIZE;
            let from = start.max(block_start);
            let to = end.min(block_end);

            // Partial blocks keep the bytes outside the written range.
            let mut data = if from == block_start && to == block_end {
                [0u8; CLASSIC_BLOCK_SIZE]
            } else {
                self.read_block(block).await?
            };
            data[from - block_start..to - block_start].copy_from_slice(&bytes[from - start..to - start]);
            self.write_block(block, &data).await?;
        }
        Ok(())
    }

    async fn release(self) -> Result<()> {
        self.channel.disconnect().await
    }
}
