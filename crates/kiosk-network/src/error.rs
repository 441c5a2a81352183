//! Error types for the reservation API client.

/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the reservation API.
///
/// `Auth` and `Reservation` are business failures shown to the guest on the
/// error screen; the other variants describe the exchange itself.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Login failed or no session is available.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// No reservation could be made for the attraction.
    #[error("Reservation failed: {message}")]
    Reservation { message: String },

    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The request never completed (DNS, TLS, timeout, refused).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The response body was not the expected JSON.
    #[error("Decode error: {message}")]
    Decode { message: String },
}

impl ApiError {
    /// Create a new authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new reservation error.
    pub fn reservation(message: impl Into<String>) -> Self {
        Self::Reservation {
            message: message.into(),
        }
    }

    /// Create a new HTTP status error.
    pub fn http(status: u16, url: impl Into<String>) -> Self {
        Self::Http {
            status,
            url: url.into(),
        }
    }

    /// Create a new transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ApiError::auth("missing authCode").to_string(),
            "Authentication failed: missing authCode"
        );
        assert_eq!(
            ApiError::http(503, "http://api/attractions").to_string(),
            "HTTP 503 from http://api/attractions"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(ApiError::from(err), ApiError::Decode { .. }));
    }
}
