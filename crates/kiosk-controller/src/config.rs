//! Controller and poller settings.

use kiosk_core::constants::{
    DEFAULT_IDLE_RESET_SECS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SUCCESS_RESET_SECS,
};
use std::time::Duration;

/// Card poller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Sleep between poll cycles.
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Kiosk controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Guests booked per reservation.
    pub guest_count: u8,

    /// Inactivity before returning to the welcome screen.
    pub idle_reset: Duration,

    /// How long the success screen stays up.
    pub success_reset: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            guest_count: 1,
            idle_reset: Duration::from_secs(DEFAULT_IDLE_RESET_SECS),
            success_reset: Duration::from_secs(DEFAULT_SUCCESS_RESET_SECS),
        }
    }
}
