// ABOUTME: Error taxonomy for serial command exchange and modem-level operations
// ABOUTME: Converts transport and codec failures into the ModemError surfaced by probing and registration

use crate::modem::state::ModemState;
use crate::sms::PduError;
use std::io;
use thiserror::Error;

/// Errors from a single command exchange on a serial port
#[derive(Debug, Error)]
pub enum SerialError {
    /// I/O error on the underlying byte stream
    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// No complete response arrived in time
    #[error("Command timed out")]
    Timeout,

    /// The exchange was abandoned by its issuer
    #[error("Command cancelled")]
    Cancelled,

    /// The stream reached end-of-file
    #[error("Port closed")]
    PortClosed,

    /// The device answered with an error final result
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The response did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Result type alias for serial exchanges
pub type SerialResult<T> = Result<T, SerialError>;

/// Errors surfaced by probing, registration and modem lifecycle operations
#[derive(Debug, Error)]
pub enum ModemError {
    /// SMS encode or decode failed
    #[error("PDU error: {0}")]
    Pdu(#[from] PduError),

    /// Serial exchange failed
    #[error("{0}")]
    Serial(SerialError),

    /// The device source knows nothing about the port
    #[error("Couldn't find port for ({subsystem}/{name})")]
    PortLookupFailed { subsystem: String, name: String },

    /// No driver could be resolved for the port
    #[error("Couldn't find driver for ({subsystem}/{name})")]
    DriverLookupFailed { subsystem: String, name: String },

    #[error("Operation timed out")]
    Timeout,

    #[error("{0}")]
    Cancelled(String),

    /// The capability is not implemented by this modem or plugin
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The modem is in a state that doesn't allow the operation
    #[error("Cannot {operation} while modem is {current}")]
    WrongState {
        current: ModemState,
        operation: &'static str,
    },

    /// A response could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl ModemError {
    pub fn cancelled() -> Self {
        ModemError::Cancelled("Operation cancelled".into())
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        ModemError::Unsupported(what.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ModemError::Cancelled(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ModemError::Unsupported(_))
    }
}

impl From<SerialError> for ModemError {
    fn from(err: SerialError) -> Self {
        match err {
            SerialError::Timeout => ModemError::Timeout,
            SerialError::Cancelled => ModemError::cancelled(),
            other => ModemError::Serial(other),
        }
    }
}

/// Result type alias for modem operations
pub type ModemResult<T> = Result<T, ModemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_timeout_maps_to_timeout() {
        assert!(matches!(ModemError::from(SerialError::Timeout), ModemError::Timeout));
        assert!(ModemError::from(SerialError::Cancelled).is_cancelled());
        assert!(matches!(
            ModemError::from(SerialError::PortClosed),
            ModemError::Serial(SerialError::PortClosed)
        ));
    }

    #[test]
    fn test_display() {
        let err = ModemError::PortLookupFailed {
            subsystem: "tty".into(),
            name: "ttyUSB0".into(),
        };
        assert_eq!(err.to_string(), "Couldn't find port for (tty/ttyUSB0)");

        let err = ModemError::WrongState {
            current: ModemState::Disabled,
            operation: "connect",
        };
        assert_eq!(err.to_string(), "Cannot connect while modem is disabled");
    }

    #[test]
    fn test_pdu_error_converts() {
        let err: ModemError = PduError::UnsupportedMessageType(0x01).into();
        assert!(matches!(err, ModemError::Pdu(_)));
    }
}
