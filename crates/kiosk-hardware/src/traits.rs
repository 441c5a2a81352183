//! Card reader trait definitions.
//!
//! Reader access is split into two layers:
//!
//! - [`CardReader`] / [`ApduChannel`]: the physical reader. It waits for a
//!   card and exchanges raw APDUs with it.
//! - [`CardTransport`] / [`CardConnection`]: a card format on top of a
//!   reader. It exposes the card as a flat byte address space with
//!   `read(offset, len)` and `write(offset, bytes)`, hiding chunking, file
//!   selection and block authentication.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT).
//!
//! **NOTE**: These traits are NOT object-safe. Use generics, or the enum
//! wrappers in [`crate::devices`] and [`crate::transport`] for runtime
//! selection.

#![allow(async_fn_in_trait)]

use crate::{error::Result, types::ReaderInfo};
use kiosk_core::TagUid;
use kiosk_protocol::{ApduCommand, ApduResponse, CardFormat};
use std::time::Duration;

/// An open session with one card on a reader.
pub trait ApduChannel: Send {
    /// Send a command and return the card's response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns an error only when the exchange itself failed (reader
    /// unplugged, card removed). Status words are left to the caller.
    async fn transmit(&mut self, command: &ApduCommand) -> Result<ApduResponse>;

    /// End the session, leaving the card powered.
    async fn disconnect(self) -> Result<()>
    where
        Self: Sized;
}

/// A physical (or simulated) card reader.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::simulated::{SimulatedCard, SimulatedReader};
/// use kiosk_hardware::traits::{ApduChannel, CardReader};
/// use kiosk_core::TagUid;
/// use kiosk_protocol::ApduCommand;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> kiosk_hardware::Result<()> {
///     let (mut reader, handle) = SimulatedReader::new();
///     handle.present(SimulatedCard::blank_ndef(TagUid::from_hex("04A1B2C3").unwrap()));
///
///     let mut channel = reader
///         .wait_for_card(Duration::from_secs(1), Duration::from_millis(200))
///         .await?;
///     let response = channel.transmit(&ApduCommand::get_uid()).await?;
///     assert_eq!(response.data(), &[0x04, 0xA1, 0xB2, 0xC3]);
///     channel.disconnect().await
/// }
/// ```
pub trait CardReader: Send {
    type Channel: ApduChannel;

    /// Wait up to `timeout` for a card, checking every `retry_interval`.
    ///
    /// # Errors
    ///
    /// - [`HardwareError::NoCardPresent`](crate::HardwareError::NoCardPresent)
    ///   if no card arrived in time
    /// - `Connection` / `ReaderNotFound` for reader failures
    async fn wait_for_card(
        &mut self,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<Self::Channel>;

    /// Describe the reader.
    fn reader_info(&self) -> ReaderInfo;
}

/// A card format's view of a reader.
///
/// Each `connect` opens a fresh session; connections are never shared or
/// kept across poll cycles.
pub trait CardTransport: Send {
    type Connection: CardConnection;

    /// Card format this transport speaks.
    fn format(&self) -> CardFormat;

    /// Wait for a card, read its UID and prepare it for reads and writes.
    ///
    /// # Errors
    ///
    /// - `NoCardPresent` when the wait times out
    /// - `Connection` for reader failures
    /// - `Status` if the card rejects the setup commands
    async fn connect(&mut self) -> Result<Self::Connection>;
}

/// A prepared card, addressed as a flat byte space.
pub trait CardConnection: Send {
    /// UID read during `connect`.
    fn uid(&self) -> &TagUid;

    /// Read `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Any non-success status aborts the read with `Status`.
    async fn read(&mut self, offset: u16, len: usize) -> Result<Vec<u8>>;

    /// Write `bytes` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Any non-success status aborts the write with `Status`; bytes
    /// already sent stay written.
    async fn write(&mut self, offset: u16, bytes: &[u8]) -> Result<()>;

    /// Close the session.
    async fn release(self) -> Result<()>
    where
        Self: Sized;
}
