//! Enum wrappers for reader dispatch.
//!
//! Native `async fn` in traits is not object-safe, so readers picked at
//! runtime (simulated for development, PC/SC on a kiosk) are wrapped in an
//! enum instead of a `Box<dyn CardReader>`. Each variant is monomorphized at
//! compile time and feature-gated drivers drop out of the enum when their
//! feature is off.
//!
//! # Examples
//!
//! ```
//! use kiosk_hardware::devices::AnyCardReader;
//! use kiosk_hardware::simulated::SimulatedReader;
//! use kiosk_hardware::traits::CardReader;
//!
//! let (reader, _handle) = SimulatedReader::new();
//! let reader = AnyCardReader::Simulated(reader);
//! assert_eq!(reader.reader_info().driver, "simulated");
//! ```

#[cfg(feature = "hardware-pcsc")]
use crate::pcsc::{PcscChannel, PcscReader};
use crate::{
    error::Result,
    simulated::{SimulatedChannel, SimulatedReader},
    traits::{ApduChannel, CardReader},
    types::ReaderInfo,
};
use kiosk_protocol::{ApduCommand, ApduResponse};
use std::time::Duration;

/// Enum wrapper for card reader dispatch.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::devices::AnyCardReader;
/// use kiosk_hardware::simulated::{SimulatedCard, SimulatedReader};
/// use kiosk_hardware::traits::{ApduChannel, CardReader};
/// use kiosk_core::TagUid;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> kiosk_hardware::Result<()> {
///     let (reader, handle) = SimulatedReader::new();
///     handle.present(SimulatedCard::blank_classic(TagUid::from_hex("04A1B2C3").unwrap()));
///
///     let mut reader = AnyCardReader::Simulated(reader);
///     let channel = reader
///         .wait_for_card(Duration::from_secs(1), Duration::from_millis(200))
///         .await?;
///     channel.disconnect().await
/// }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCardReader {
    /// Simulated reader for development and testing.
    Simulated(SimulatedReader),

    /// PC/SC reader (contactless slot of a USB reader).
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscReader),
}

impl CardReader for AnyCardReader {
    type Channel = AnyApduChannel;

    async fn wait_for_card(
        &mut self,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<Self::Channel> {
        match self {
            Self::Simulated(reader) => reader
                .wait_for_card(timeout, retry_interval)
                .await
                .map(AnyApduChannel::Simulated),
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(reader) => reader
                .wait_for_card(timeout, retry_interval)
                .await
                .map(AnyApduChannel::Pcsc),
        }
    }

    fn reader_info(&self) -> ReaderInfo {
        match self {
            Self::Simulated(reader) => reader.reader_info(),
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(reader) => reader.reader_info(),
        }
    }
}

/// Channel opened by an [`AnyCardReader`].
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyApduChannel {
    Simulated(SimulatedChannel),
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscChannel),
}

impl ApduChannel for AnyApduChannel {
    async fn transmit(&mut self, command: &ApduCommand) -> Result<ApduResponse> {
        match self {
            Self::Simulated(channel) => channel.transmit(command).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(channel) => channel.transmit(command).await,
        }
    }

    async fn disconnect(self) -> Result<()> {
        match self {
            Self::Simulated(channel) => channel.disconnect().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(channel) => channel.disconnect().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedCard;
    use kiosk_core::TagUid;

    #[tokio::test]
    async fn test_simulated_dispatch() {
        let (reader, handle) = SimulatedReader::new();
        handle.present(SimulatedCard::blank_ndef(TagUid::from_hex("04A1B2C3").unwrap()));
        let mut reader = AnyCardReader::Simulated(reader);

        let mut channel = reader
            .wait_for_card(Duration::from_secs(1), Duration::from_millis(200))
            .await
            .unwrap();
        let response = channel.transmit(&ApduCommand::get_uid()).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.data(), &[0x04, 0xA1, 0xB2, 0xC3]);

        channel.disconnect().await.unwrap();
        assert_eq!(handle.open_channels(), 0);
        assert_eq!(handle.transmit_count(), 1);
    }

    #[test]
    fn test_reader_info() {
        let (reader, _handle) = SimulatedReader::with_name("Bench Reader");
        let reader = AnyCardReader::Simulated(reader);
        let info = reader.reader_info();
        assert_eq!(info.name, "Bench Reader");
        assert_eq!(info.driver, "simulated");
    }
}
