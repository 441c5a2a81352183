//! Kiosk orchestration.
//!
//! Ties the card reader, the reservation API and the UI shell together:
//!
//! - [`CardPoller`] watches the reader in the background and hands newly
//!   tapped cards to a [`CardHandler`]
//! - [`CardWriter`] writes a reservation on demand, pausing the poller
//! - [`KioskController`] runs the guest session and picks the next [`Route`]
//! - [`IdleTimer`] sends the kiosk back to the welcome screen when idle
//!
//! The poller and the writer share one transport through a [`ReaderGate`],
//! so a write never interleaves with a poll.
//!
//! # Example
//!
//! ```
//! use kiosk_controller::{CardWriter, ControllerConfig, KioskController, Navigator, ReaderGate};
//! use kiosk_hardware::{TransportConfig, simulated::SimulatedReader, transport::NdefTransport};
//! use kiosk_network::MockReservationApi;
//! use kiosk_protocol::{AnyRecordLayout, CardFormat};
//! use std::sync::Arc;
//!
//! let (reader, _handle) = SimulatedReader::new();
//! let gate = Arc::new(ReaderGate::new(NdefTransport::new(reader, TransportConfig::default())));
//! let writer = CardWriter::new(Arc::clone(&gate), AnyRecordLayout::for_format(CardFormat::Ndef));
//! let (navigator, _routes) = Navigator::channel();
//!
//! let controller = KioskController::new(
//!     MockReservationApi::new(),
//!     writer,
//!     navigator,
//!     ControllerConfig::default(),
//! );
//! assert!(controller.last_tag().is_none());
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod navigation;
pub mod poller;
pub mod timer;
pub mod writer;

pub use config::{ControllerConfig, PollerConfig};
pub use controller::{ConfirmedReservation, KioskController, WriteOutcome};
pub use error::{ControllerError, Result};
pub use gate::{PauseGuard, ReaderGate};
pub use navigation::{AttractionChoice, Navigator, Route};
pub use poller::{CardEvent, CardHandler, CardPoller, PollOutcome, PollState};
pub use timer::IdleTimer;
pub use writer::CardWriter;
