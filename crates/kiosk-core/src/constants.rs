//! Core constants for the ride reservation kiosk.
//!
//! This module collects the limits and defaults shared by the card codec,
//! the reader transports, and the poller. Values that describe the on-card
//! layout itself live next to the layouts in `kiosk-protocol`.
//!
//! # Usage
//!
//! ```
//! use kiosk_core::constants::*;
//! use std::time::Duration;
//!
//! let interval = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);
//! assert_eq!(interval.as_secs(), 2);
//! assert_eq!(MAX_GUEST_EMAIL_LENGTH, 127);
//! ```

// ============================================================================
// Record Limits
// ============================================================================

/// Maximum guest email length in bytes on any card format.
pub const MAX_GUEST_EMAIL_LENGTH: usize = 127;

/// Largest wait time, in minutes, that fits the 16-bit seconds field on card.
///
/// # Examples
///
/// ```
/// use kiosk_core::constants::MAX_WAIT_TIME_MINUTES;
///
/// assert!(u32::from(MAX_WAIT_TIME_MINUTES) * 60 <= u32::from(u16::MAX));
/// ```
pub const MAX_WAIT_TIME_MINUTES: u16 = u16::MAX / 60;

/// Byte value found on freshly provisioned cards with no reservation.
pub const BLANK_SENTINEL: u8 = 0xAA;

/// Minimum tag UID length in bytes (ISO 14443 single size UID).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum tag UID length in bytes (ISO 14443 triple size UID).
pub const MAX_UID_LENGTH: usize = 10;

// ============================================================================
// Command Flags
// ============================================================================

/// Flag bit telling card firmware that the reservation fields are valid.
pub const FLAG_RESERVATION_VALID: u8 = 0x40;

// ============================================================================
// Timing Defaults
// ============================================================================

/// Default idle sleep between poll cycles (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Default time to wait for a card before giving up (milliseconds).
pub const DEFAULT_CARD_TIMEOUT_MS: u64 = 10_000;

/// Default retry interval while no card is present (milliseconds).
pub const DEFAULT_CARD_RETRY_MS: u64 = 300;

/// Lower bound for the no-card retry interval (milliseconds).
pub const MIN_CARD_RETRY_MS: u64 = 200;

/// Upper bound for the no-card retry interval (milliseconds).
pub const MAX_CARD_RETRY_MS: u64 = 500;

/// Default countdown before an idle kiosk returns to the welcome screen (seconds).
pub const DEFAULT_IDLE_RESET_SECS: u64 = 10;

/// Countdown used after a successful reservation (seconds).
pub const DEFAULT_SUCCESS_RESET_SECS: u64 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_time_fits_wire_field() {
        let seconds = u32::from(MAX_WAIT_TIME_MINUTES) * 60;
        assert!(seconds <= u32::from(u16::MAX));
        assert!(seconds + 60 > u32::from(u16::MAX));
    }

    #[test]
    fn test_retry_bounds_contain_default() {
        assert!((MIN_CARD_RETRY_MS..=MAX_CARD_RETRY_MS).contains(&DEFAULT_CARD_RETRY_MS));
    }
}
