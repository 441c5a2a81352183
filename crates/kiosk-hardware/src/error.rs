//! Error types for card reader operations.
//!
//! The variants map onto how callers react: [`HardwareError::NoCardPresent`]
//! is expected while idle and retried by the next poll, connection problems
//! end the current operation, and a status word other than `90 00` aborts the
//! command sequence without retrying.

use kiosk_protocol::{CodecError, StatusWord};

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to a card reader.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// No card was presented before the wait timed out.
    #[error("No card present")]
    NoCardPresent,

    /// Reader or driver failure.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The card answered with a non-success status word.
    #[error("Card returned status {sw1:02X}{sw2:02X}")]
    Status { sw1: u8, sw2: u8 },

    /// Offset or block outside what the transport may address.
    #[error("Invalid address: {message}")]
    InvalidAddress { message: String },

    /// No reader matched the configured filter.
    #[error("Reader not found: {filter}")]
    ReaderNotFound { filter: String },

    /// Operation on a released connection or a removed card.
    #[error("Not connected")]
    NotConnected,

    /// Response did not have the expected shape.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Framing error while building or parsing an APDU.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl HardwareError {
    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a status error from a card status word.
    pub fn status(status: StatusWord) -> Self {
        Self::Status {
            sw1: status.sw1,
            sw2: status.sw2,
        }
    }

    /// Create a new invalid address error.
    pub fn invalid_address(message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            message: message.into(),
        }
    }

    /// Create a new reader not found error.
    pub fn reader_not_found(filter: impl Into<String>) -> Self {
        Self::ReaderNotFound {
            filter: filter.into(),
        }
    }

    /// Create a new protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` for the expected "nothing on the reader" outcome.
    pub fn is_no_card(&self) -> bool {
        matches!(self, Self::NoCardPresent)
    }
}

#[cfg(feature = "hardware-pcsc")]
impl From<pcsc::Error> for HardwareError {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard | pcsc::Error::Timeout => {
                Self::NoCardPresent
            }
            pcsc::Error::NoReadersAvailable | pcsc::Error::UnknownReader => {
                Self::reader_not_found(err.to_string())
            }
            other => Self::connection(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error() {
        let error = HardwareError::status(StatusWord::new(0x6A, 0x82));
        assert!(matches!(error, HardwareError::Status { sw1: 0x6A, sw2: 0x82 }));
        assert_eq!(error.to_string(), "Card returned status 6A82");
    }

    #[test]
    fn test_connection_error() {
        let error = HardwareError::connection("Reader unplugged");
        assert_eq!(error.to_string(), "Connection error: Reader unplugged");
        assert!(!error.is_no_card());
    }

    #[test]
    fn test_no_card() {
        assert!(HardwareError::NoCardPresent.is_no_card());
        assert_eq!(HardwareError::NoCardPresent.to_string(), "No card present");
    }

    #[test]
    fn test_codec_conversion() {
        let error: HardwareError = CodecError::ApduTooLong { len: 300 }.into();
        assert!(matches!(error, HardwareError::Codec(_)));
    }
}
