// ABOUTME: modemcore: SMS PDU codec, serial port probing and 3GPP registration tracking for cellular modems
// ABOUTME: Re-exports the main codec, probing and modem types at the crate root

pub mod error;
pub mod modem;
pub mod port;
pub mod sms;

#[cfg(test)]
mod tests;

pub use error::{ModemError, ModemResult, SerialError, SerialResult};
pub use modem::{
    AtModem3gpp, Iface3gpp, Modem, Modem3gpp, ModemState, ModemStatus, RegistrationCheckConfig,
    RegistrationState,
};
pub use port::{CommandChannel, Plugin, PluginConfig, PortProbe, ProbeFlags, SerialPort};
pub use sms::{PduError, PduResult, SmsMessage, SmsPdu, SubmitOptions, build_submit_pdus, parse_pdu};

/// A specialized `Result` type for modem operations.
///
/// # Examples
///
/// ## Encoding and decoding SMS PDUs
///
/// ```rust
/// use modemcore::{SubmitOptions, build_submit_pdus, parse_pdu};
///
/// let pdus = build_submit_pdus("+15551234567", "Hello, World!", &SubmitOptions::new())?;
/// assert_eq!(pdus.len(), 1);
/// println!("AT+CMGS={}", pdus[0].tpdu_len());
/// println!("{}", pdus[0].to_hex());
///
/// let message = parse_pdu(
///     "07911326040000F0040B911346610089F60000208062917314080CC8F71D14969741F977FD07",
/// )?;
/// assert_eq!(message.number(), "+31641600986");
/// # Ok::<(), modemcore::ModemError>(())
/// ```
///
/// ## Enabling a modem over a serial port
///
/// ```rust,no_run
/// use modemcore::modem::{AtBearer, AtModem3gpp, BearerProperties, Modem};
/// use modemcore::{RegistrationCheckConfig, SerialPort};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(tty: tokio::io::DuplexStream) -> modemcore::Result<()> {
/// let port = Arc::new(SerialPort::new("ttyUSB0", tty));
/// let modem = Modem::new(AtModem3gpp::new(port.clone()), RegistrationCheckConfig::default());
///
/// let cancel = CancellationToken::new();
/// modem.initialize(&cancel).await?;
/// modem.enable(&cancel).await?;
///
/// let bearer = modem.create_bearer(AtBearer::new(port, BearerProperties::new("internet")));
/// modem.connect(&bearer, &cancel).await?;
/// # Ok(())
/// # }
/// ```
pub type Result<T> = std::result::Result<T, ModemError>;
