//! Types shared by readers and transports.

use kiosk_core::constants::{
    DEFAULT_CARD_RETRY_MS, DEFAULT_CARD_TIMEOUT_MS, MAX_CARD_RETRY_MS, MIN_CARD_RETRY_MS,
};
use kiosk_protocol::{KeyType, apdu::DEFAULT_CLASSIC_KEY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Card reader information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name as reported by the driver (e.g. "FEIG ... Slot:CL").
    pub name: String,

    /// Driver backing the reader ("pcsc", "simulated").
    pub driver: String,
}

impl ReaderInfo {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
        }
    }
}

/// Settings for connecting to a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// How long `connect` waits for a card before giving up.
    pub card_timeout: Duration,

    /// Sleep between presence checks while no card is on the reader.
    pub retry_interval: Duration,

    /// MIFARE Classic key used for every sector.
    pub classic_key: [u8; 6],

    /// Which Classic key `classic_key` is.
    pub key_type: KeyType,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            card_timeout: Duration::from_millis(DEFAULT_CARD_TIMEOUT_MS),
            retry_interval: Duration::from_millis(DEFAULT_CARD_RETRY_MS),
            classic_key: DEFAULT_CLASSIC_KEY,
            key_type: KeyType::A,
        }
    }
}

impl TransportConfig {
    /// Set the wait-for-card timeout.
    #[must_use]
    pub fn with_card_timeout(mut self, timeout: Duration) -> Self {
        self.card_timeout = timeout;
        self
    }

    /// Set the no-card retry interval, clamped to 200-500 ms.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval.clamp(
            Duration::from_millis(MIN_CARD_RETRY_MS),
            Duration::from_millis(MAX_CARD_RETRY_MS),
        );
        self
    }

    /// Set the Classic key.
    #[must_use]
    pub fn with_classic_key(mut self, key: [u8; 6], key_type: KeyType) -> Self {
        self.classic_key = key;
        self.key_type = key_type;
        self
    }
}
