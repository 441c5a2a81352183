//! Controller error types.

use kiosk_network::ApiError;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Reservation API failure (login, listing, reservation).
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The tapped card carries no guest email to log in with.
    #[error("Card {uid} is not registered")]
    CardNotRegistered { uid: String },

    /// An operation needed a logged-in guest.
    #[error("No guest session")]
    NoSession,

    /// The ride is not in the attraction list.
    #[error("Unknown attraction: {id}")]
    UnknownAttraction { id: String },

    /// The replace prompt was answered with no reservation pending.
    #[error("No existing reservation to replace")]
    NothingToReplace,
}

impl ControllerError {
    /// Message shown on the error screen.
    pub fn guest_message(&self) -> String {
        match self {
            Self::Api(ApiError::Auth { message }) => format!("Login failed: {message}"),
            Self::Api(ApiError::Reservation { message }) => message.clone(),
            Self::Api(_) => "The reservation service is unavailable".to_string(),
            Self::CardNotRegistered { .. } => "This card is not registered".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_messages() {
        let err = ControllerError::from(ApiError::auth("bad password"));
        assert_eq!(err.guest_message(), "Login failed: bad password");

        let err = ControllerError::from(ApiError::http(502, "http://api"));
        assert_eq!(err.guest_message(), "The reservation service is unavailable");

        let err = ControllerError::CardNotRegistered {
            uid: "04A1B2C3".to_string(),
        };
        assert_eq!(err.to_string(), "Card 04A1B2C3 is not registered");
        assert_eq!(err.guest_message(), "This card is not registered");
    }
}
