// ABOUTME: Error types for SMS PDU encoding and decoding
// ABOUTME: Every codec failure is surfaced to the caller, nothing is recovered silently

use thiserror::Error;

/// Errors produced by the SMS PDU codec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PduError {
    /// The PDU text was not a valid hex string
    #[error("Couldn't parse PDU from hex: {0}")]
    InvalidHex(String),

    /// The PDU is shorter than one of its length fields claims, or a header
    /// field is internally inconsistent
    #[error("Malformed PDU: {0}")]
    MalformedPdu(String),

    /// Only SMS-DELIVER can be decoded
    #[error("Unhandled message type: 0x{0:02x}")]
    UnsupportedMessageType(u8),

    /// The number contains characters that cannot be semi-octet encoded
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    /// Character set conversion failed
    #[error("Encoding failure: {0}")]
    EncodingFailure(String),
}

impl From<hex::FromHexError> for PduError {
    fn from(err: hex::FromHexError) -> Self {
        PduError::InvalidHex(err.to_string())
    }
}

/// Result type alias for codec operations
pub type PduResult<T> = Result<T, PduError>;
