//! GTP Error types

use thiserror::Error;

/// GTP Error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GtpError {
    /// Buffer too short for operation
    #[error("Buffer too short: need {needed} bytes, have {available}")]
    BufferTooShort { needed: usize, available: usize },

    /// Invalid GTP version
    #[error("Invalid GTP version: {0}")]
    InvalidVersion(u8),

    /// Invalid message type
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    /// Invalid IE type
    #[error("Invalid IE type: {0}")]
    InvalidIeType(u8),

    /// Invalid IE length
    #[error("Invalid IE length: expected {expected}, got {actual}")]
    InvalidIeLength { expected: usize, actual: usize },

    /// Missing mandatory IE
    #[error("Missing mandatory IE: {0}")]
    MissingMandatoryIe(&'static str),

    /// Resource exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// GTP Result type
pub type GtpResult<T> = Result<T, GtpError>;
