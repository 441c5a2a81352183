//! Card format transports.
//!
//! - [`NdefTransport`]: Type 4 tags. Selects the NDEF application and file
//!   once per connection, then moves data with READ/UPDATE BINARY in chunks
//!   of at most 246 bytes.
//! - [`ClassicTransport`]: MIFARE Classic 1K. Loads the key on connect and
//!   authenticates every block before reading or writing it.
//!
//! [`AnyCardTransport`] selects one of them at runtime.

mod classic;
mod ndef;

pub use classic::{
    BlockDump, CLASSIC_1K_BLOCKS, ClassicConnection, ClassicTransport, is_sector_trailer,
};
pub use ndef::{NdefConnection, NdefTransport};

use crate::{
    error::{HardwareError, Result},
    traits::{ApduChannel, CardConnection, CardReader, CardTransport},
    types::TransportConfig,
};
use kiosk_core::TagUid;
use kiosk_protocol::{ApduCommand, CardFormat};
use tracing::{debug, warn};

/// Transmit `command` and fail unless the card answered `90 00`.
pub(crate) async fn transmit_checked<C: ApduChannel>(
    channel: &mut C,
    command: &ApduCommand,
) -> Result<Vec<u8>> {
    let response = channel.transmit(command).await?;
    let status = response.status();
    debug!(
        ins = format_args!("{:02X}", command.ins),
        p1 = command.p1,
        p2 = command.p2,
        status = %status,
        len = response.data().len(),
        "APDU exchanged"
    );
    if !status.is_success() {
        return Err(HardwareError::status(status));
    }
    Ok(response.into_data())
}

/// Wait for a card and read its UID.
///
/// The channel is disconnected again if the UID cannot be read.
pub(crate) async fn open_channel<R: CardReader>(
    reader: &mut R,
    config: &TransportConfig,
) -> Result<(R::Channel, TagUid)> {
    let mut channel = reader
        .wait_for_card(config.card_timeout, config.retry_interval)
        .await?;

    let uid = match transmit_checked(&mut channel, &ApduCommand::get_uid()).await {
        Ok(data) => TagUid::new(data).map_err(|e| HardwareError::protocol(e.to_string())),
        Err(e) => Err(e),
    };

    match uid {
        Ok(uid) => Ok((channel, uid)),
        Err(e) => {
            if let Err(close) = channel.disconnect().await {
                warn!(error = %close, "Failed to disconnect after UID read failure");
            }
            Err(e)
        }
    }
}

/// Transport selected from configuration.
#[derive(Debug)]
pub enum AnyCardTransport<R: CardReader> {
    Ndef(NdefTransport<R>),
    Classic(ClassicTransport<R>),
}

impl<R: CardReader> AnyCardTransport<R> {
    pub fn new(format: CardFormat, reader: R, config: TransportConfig) -> Self {
        match format {
            CardFormat::Ndef => Self::Ndef(NdefTransport::new(reader, config)),
            CardFormat::Classic => Self::Classic(ClassicTransport::new(reader, config)),
        }
    }

    pub fn reader(&self) -> &R {
        match self {
            Self::Ndef(t) => t.reader(),
            Self::Classic(t) => t.reader(),
        }
    }
}

impl<R: CardReader> CardTransport for AnyCardTransport<R> {
    type Connection = AnyCardConnection<R::Channel>;

    fn format(&self) -> CardFormat {
        match self {
            Self::Ndef(t) => t.format(),
            Self::Classic(t) => t.format(),
        }
    }

    async fn connect(&mut self) -> Result<Self::Connection> {
        match self {
            Self::Ndef(t) => t.connect().await.map(AnyCardConnection::Ndef),
            Self::Classic(t) => t.connect().await.map(AnyCardConnection::Classic),
        }
    }
}

/// Connection produced by [`AnyCardTransport`].
#[derive(Debug)]
pub enum AnyCardConnection<C: ApduChannel> {
    Ndef(NdefConnection<C>),
    Classic(ClassicConnection<C>),
}

impl<C: ApduChannel> AnyCardConnection<C> {
    /// The Classic connection, for block-level diagnostics.
    pub fn as_classic(&mut self) -> Option<&mut ClassicConnection<C>> {
        match self {
            Self::Classic(c) => Some(c),
            Self::Ndef(_) => None,
        }
    }
}

impl<C: ApduChannel> CardConnection for AnyCardConnection<C> {
    fn uid(&self) -> &TagUid {
        match self {
            Self::Ndef(c) => c.uid(),
            Self::Classic(c) => c.uid(),
        }
    }

    async fn read(&mut self, offset: u16, len: usize) -> Result<Vec<u8>> {
        match self {
            Self::Ndef(c) => c.read(offset, len).await,
            Self::Classic(c) => c.read(offset, len).await,
        }
    }

    async fn write(&mut self, offset: u16, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Ndef(c) => c.write(offset, bytes).await,
            Self::Classic(c) => c.write(offset, bytes).await,
        }
    }

    async fn release(self) -> Result<()> {
        match self {
            Self::Ndef(c) => c.release().await,
            Self::Classic(c) => c.release().await,
        }
    }
}
