//! Environment configuration.
//!
//! Every setting comes from a `KIOSK_*` variable; a `.env` file in the
//! working directory is loaded first by `main`.

use kiosk_controller::{ControllerConfig, PollerConfig};
use kiosk_core::{
    Error, Result,
    constants::{
        DEFAULT_CARD_RETRY_MS, DEFAULT_CARD_TIMEOUT_MS, DEFAULT_IDLE_RESET_SECS,
        DEFAULT_POLL_INTERVAL_MS, DEFAULT_SUCCESS_RESET_SECS,
    },
};
use kiosk_hardware::TransportConfig;
use kiosk_network::ClientConfig;
use kiosk_protocol::CardFormat;
use std::{str::FromStr, time::Duration};

pub const API_ROOT: &str = "KIOSK_API_ROOT";
pub const CARD_TECHNOLOGY: &str = "KIOSK_CARD_TECHNOLOGY";
pub const READER_FILTER: &str = "KIOSK_READER_FILTER";
pub const POLL_INTERVAL_MS: &str = "KIOSK_POLL_INTERVAL_MS";
pub const CARD_TIMEOUT_MS: &str = "KIOSK_CARD_TIMEOUT_MS";
pub const CARD_RETRY_MS: &str = "KIOSK_CARD_RETRY_MS";
pub const IDLE_RESET_SECS: &str = "KIOSK_IDLE_RESET_SECS";
pub const SUCCESS_RESET_SECS: &str = "KIOSK_SUCCESS_RESET_SECS";
pub const GUEST_COUNT: &str = "KIOSK_GUEST_COUNT";
pub const MOCK_NFC: &str = "KIOSK_MOCK_NFC";
pub const MOCK_API: &str = "KIOSK_MOCK_API";

/// Kiosk settings read at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KioskConfig {
    /// Reservation API root; `None` only with the mock API.
    pub api_root: Option<String>,
    pub card_format: CardFormat,
    /// Substring of the PC/SC reader name to use.
    pub reader_filter: Option<String>,
    pub poll_interval: Duration,
    pub card_timeout: Duration,
    pub card_retry: Duration,
    pub idle_reset: Duration,
    pub success_reset: Duration,
    pub guest_count: u8,
    pub mock_nfc: bool,
    pub mock_api: bool,
}

impl KioskConfig {
    /// Read the process environment.
    ///
    /// # Errors
    ///
    /// `Config` for unparsable values, `MissingConfig` when the API root is
    /// unset and the mock API is off.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns a variable's value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mock_api = parse_flag(MOCK_API, get(MOCK_API))?;
        let api_root = get(API_ROOT);
        if api_root.is_none() && !mock_api {
            return Err(Error::MissingConfig(API_ROOT.to_string()));
        }

        let card_format = match get(CARD_TECHNOLOGY) {
            Some(value) => CardFormat::from_str(&value)?,
            None => CardFormat::Ndef,
        };
        let guest_count = parse(GUEST_COUNT, get(GUEST_COUNT), 1u8)?;
        if guest_count == 0 {
            return Err(Error::Config(format!("{GUEST_COUNT} must be at least 1")));
        }

        Ok(Self {
            api_root,
            card_format,
            reader_filter: get(READER_FILTER),
            poll_interval: Duration::from_millis(parse(
                POLL_INTERVAL_MS,
                get(POLL_INTERVAL_MS),
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            card_timeout: Duration::from_millis(parse(
                CARD_TIMEOUT_MS,
                get(CARD_TIMEOUT_MS),
                DEFAULT_CARD_TIMEOUT_MS,
            )?),
            card_retry: Duration::from_millis(parse(
                CARD_RETRY_MS,
                get(CARD_RETRY_MS),
                DEFAULT_CARD_RETRY_MS,
            )?),
            idle_reset: Duration::from_secs(parse(
                IDLE_RESET_SECS,
                get(IDLE_RESET_SECS),
                DEFAULT_IDLE_RESET_SECS,
            )?),
            success_reset: Duration::from_secs(parse(
                SUCCESS_RESET_SECS,
                get(SUCCESS_RESET_SECS),
                DEFAULT_SUCCESS_RESET_SECS,
            )?),
            guest_count,
            mock_nfc: parse_flag(MOCK_NFC, get(MOCK_NFC))?,
            mock_api,
        })
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: self.poll_interval,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig::default()
            .with_card_timeout(self.card_timeout)
            .with_retry_interval(self.card_retry)
    }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            guest_count: self.guest_count,
            idle_reset: self.idle_reset,
            success_reset: self.success_reset,
        }
    }

    /// HTTP client settings, unless running on the mock API.
    pub fn client(&self) -> Option<ClientConfig> {
        self.api_root.as_ref().map(|root| ClientConfig {
            api_root: root.clone(),
            ..ClientConfig::default()
        })
    }
}

fn parse<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(value) => value
            .parse()
            .map_err(|_| Error::Config(format!("{key}: invalid value {value:?}"))),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, value: Option<String>) -> Result<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected a boolean, got {value:?}"))),
    }
}
