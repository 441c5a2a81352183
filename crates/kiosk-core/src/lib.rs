//! Domain types shared by every kiosk crate: the on-card reservation record,
//! guest email, tag UID, and the constants that size the card layouts.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
