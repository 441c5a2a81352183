//! Error types for card encoding and framing.

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while encoding records or parsing frames.
///
/// Decoding a reservation never produces one of these; unreadable card
/// data decodes to "no reservation" instead.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Ride name does not fit the layout.
    #[error("Ride name is {len} bytes, layout allows {max}")]
    RideNameTooLong { len: usize, max: usize },

    /// Guest email does not fit the layout.
    #[error("Guest email is {len} bytes, layout allows {max}")]
    EmailTooLong { len: usize, max: usize },

    /// Record would be indistinguishable from a cleared card.
    #[error("Reservation encodes to a blank record")]
    BlankRecord,

    /// Wait time does not fit the 16-bit seconds field.
    #[error("Wait time of {minutes} minutes does not fit on card")]
    WaitTimeOutOfRange { minutes: u16 },

    /// Not enough bytes to parse a structure.
    #[error("Truncated data: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    /// NDEF feature this kiosk does not handle (e.g. chunked records).
    #[error("Unsupported NDEF record: {0}")]
    UnsupportedRecord(String),

    /// Command data longer than a short APDU can carry.
    #[error("APDU data of {len} bytes exceeds 255")]
    ApduTooLong { len: usize },

    /// Response shorter than its status word.
    #[error("Invalid APDU response: {0}")]
    InvalidResponse(String),
}

impl CodecError {
    /// Create a new truncated-data error.
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }

    /// Create a new unsupported record error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedRecord(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CodecError::RideNameTooLong { len: 40, max: 32 };
        assert_eq!(error.to_string(), "Ride name is 40 bytes, layout allows 32");

        let error = CodecError::truncated(18, 4);
        assert_eq!(error.to_string(), "Truncated data: needed 18 bytes, had 4");
    }
}
