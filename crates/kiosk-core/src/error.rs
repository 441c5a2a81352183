use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Card data errors
    #[error("Invalid reservation record: {0}")]
    InvalidRecord(String),

    #[error("Invalid guest email: {0}")]
    InvalidEmail(String),

    #[error("Invalid tag UID: {0}")]
    InvalidUid(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
