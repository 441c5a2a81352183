//! Card reader access for the ride kiosk.
//!
//! The crate is layered bottom-up:
//!
//! - [`traits::CardReader`] / [`traits::ApduChannel`]: a physical reader
//!   exchanging raw APDUs. Implemented by [`simulated::SimulatedReader`] and,
//!   with the `hardware-pcsc` feature, by `pcsc::PcscReader`.
//! - [`traits::CardTransport`] / [`traits::CardConnection`]: a card format
//!   over a reader, addressed as a flat byte space. See [`transport`].
//! - [`devices`]: enum wrappers for choosing a reader at runtime.
//!
//! # Example
//!
//! ```
//! use kiosk_hardware::simulated::{SimulatedCard, SimulatedReader};
//! use kiosk_hardware::traits::{CardConnection, CardTransport};
//! use kiosk_hardware::transport::NdefTransport;
//! use kiosk_hardware::TransportConfig;
//! use kiosk_core::TagUid;
//!
//! #[tokio::main]
//! async fn main() -> kiosk_hardware::Result<()> {
//!     let (reader, handle) = SimulatedReader::new();
//!     handle.present(SimulatedCard::blank_ndef(TagUid::from_hex("04A1B2C3").unwrap()));
//!
//!     let mut transport = NdefTransport::new(reader, TransportConfig::default());
//!     let mut card = transport.connect().await?;
//!     card.write(0x10, b"hello").await?;
//!     assert_eq!(card.read(0x10, 5).await?, b"hello");
//!     card.release().await
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `hardware-pcsc`: PC/SC reader driver (needs pcsclite on Linux).

pub mod devices;
pub mod error;
#[cfg(feature = "hardware-pcsc")]
pub mod pcsc;
pub mod simulated;
pub mod traits;
pub mod transport;
pub mod types;

pub use error::{HardwareError, Result};
pub use traits::{ApduChannel, CardConnection, CardReader, CardTransport};
pub use types::{ReaderInfo, TransportConfig};
