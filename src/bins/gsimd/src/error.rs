//! Simulator error types

use gsim_gtp::GtpError;
use thiserror::Error;

/// Errors raised by the session state machine and its collaborators
#[derive(Error, Debug)]
pub enum SimError {
    /// Message encode/decode failed
    #[error("Codec error: {0}")]
    Codec(#[from] GtpError),

    /// Transport refused an outbound message
    #[error("Send failed: {0}")]
    SendFailed(#[from] std::io::Error),

    /// An operation needed a PDN connection the session does not have
    #[error("No PDN connection for session")]
    PdnMissing,

    /// The control tunnel backing a PDN is gone
    #[error("Control tunnel not found: teid {0}")]
    CtunMissing(u32),

    /// Scenario file could not be understood
    #[error("Scenario error: {0}")]
    Scenario(String),
}

pub type SimResult<T> = Result<T, SimError>;
