//! Reservation API client for the ride kiosk.
//!
//! # Components
//!
//! - [`SessionClient`]: two-step login with a cached token, attraction
//!   listing, and reservation creation following the server's hypermedia
//!   actions.
//! - [`JsonTransport`] / [`HttpTransport`]: the JSON exchange underneath,
//!   replaceable for tests.
//! - [`ReservationApi`]: what the controller consumes, implemented by the
//!   session client and by [`MockReservationApi`] for offline runs.
//!
//! # Example
//!
//! ```no_run
//! use kiosk_network::{ClientConfig, HttpTransport, SessionClient};
//!
//! # async fn example() -> kiosk_network::Result<()> {
//! let config = ClientConfig {
//!     api_root: "https://api.example.com/v1".to_string(),
//!     ..ClientConfig::default()
//! };
//! let client = SessionClient::new(HttpTransport::new(config.timeout)?, config);
//!
//! client.login("guest@example.com", "04A1B2C3").await?;
//! for attraction in client.fetch_attractions().await? {
//!     println!("{} ({} min)", attraction.name, attraction.wait_time_minutes);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod models;
pub mod session;
pub mod transport;

pub use api::{AnyReservationApi, MOCK_CONFIRMATION_ID, MOCK_DEVICE_ID, MockReservationApi, ReservationApi};
pub use error::{ApiError, Result};
pub use models::{ActionDescriptor, Attraction, AttractionData, AttractionDetails, ReservationReceipt};
pub use session::{ClientConfig, SessionClient};
pub use transport::{HttpTransport, JsonTransport};
