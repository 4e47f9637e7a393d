//! Error types for jeapcached

use thiserror::Error;

/// Main error type for jeapcached
#[derive(Error, Debug)]
pub enum JeapError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Request line parsing errors
///
/// A store command without a body length is answered with `NOT_STORED`,
/// everything else with the bare `ERROR` token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid numeric argument")]
    InvalidNumber,

    #[error("Key too long (max 250 bytes)")]
    KeyTooLong,

    #[error("Line too long")]
    LineTooLong,

    #[error("Missing body length")]
    MissingLength,

    #[error("Empty line")]
    EmptyLine,
}

/// Outcome errors reported back through a job.
///
/// The `Display` form of each variant is the exact token written to the
/// client.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    #[error("NOT_FOUND")]
    NotFound,

    #[error("EXISTS")]
    Exists,

    #[error("NOT_STORED")]
    NotStored,

    #[error("NOT_IMPLEMENT")]
    NotImplement,

    #[error("ERROR")]
    Malformed,

    #[error("NO_BACKDOOR")]
    NoBackdoor,

    #[error("CLIENT_ERROR cannot increment or decrement non-numeric value")]
    NonNumeric,

    #[error("SERVER_ERROR shutting down")]
    ShuttingDown,

    #[error("SERVER_ERROR corrupted item")]
    Corrupted,
}

impl CacheError {
    /// Returns true for errors that must terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, CacheError::Corrupted)
    }
}

impl From<ProtocolError> for CacheError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MissingLength => CacheError::NotStored,
            _ => CacheError::Malformed,
        }
    }
}

pub type Result<T> = std::result::Result<T, JeapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tokens() {
        assert_eq!(CacheError::NotFound.to_string(), "NOT_FOUND");
        assert_eq!(CacheError::Exists.to_string(), "EXISTS");
        assert_eq!(CacheError::NotStored.to_string(), "NOT_STORED");
        assert_eq!(CacheError::NotImplement.to_string(), "NOT_IMPLEMENT");
        assert_eq!(CacheError::Malformed.to_string(), "ERROR");
        assert_eq!(CacheError::NoBackdoor.to_string(), "NO_BACKDOOR");
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(CacheError::Corrupted.is_fatal());
        assert!(!CacheError::NotFound.is_fatal());
        assert!(!CacheError::ShuttingDown.is_fatal());
    }

    #[test]
    fn test_protocol_error_maps_to_error_token() {
        let err: CacheError = ProtocolError::KeyTooLong.into();
        assert_eq!(err, CacheError::Malformed);
        let err: CacheError = ProtocolError::MissingLength.into();
        assert_eq!(err, CacheError::NotStored);
    }
}
