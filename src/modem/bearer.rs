// ABOUTME: Data bearer contract: connection properties, status tracking and a generic AT dial-up bearer
// ABOUTME: ManagedBearer serializes connect/disconnect so a bearer has at most one transition in flight

use crate::error::{ModemError, ModemResult};
use crate::port::at::{at_command, at_response};
use crate::port::serial::CommandChannel;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Connection status of one bearer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BearerStatus {
    #[default]
    Disconnected,
    Disconnecting,
    Connecting,
    Connected,
}

impl fmt::Display for BearerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BearerStatus::Disconnected => "disconnected",
            BearerStatus::Disconnecting => "disconnecting",
            BearerStatus::Connecting => "connecting",
            BearerStatus::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// What a bearer connects with
///
/// # Example
///
/// ```rust
/// use modemcore::modem::BearerProperties;
///
/// let properties = BearerProperties::new("internet")
///     .with_credentials("web", "web")
///     .with_allow_roaming(false);
/// assert_eq!(properties.apn.as_deref(), Some("internet"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerProperties {
    pub apn: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// PDP type such as `IP` or `IPV6` (default: `IP`)
    pub ip_type: String,
    /// Number to dial (default: `*99#`)
    pub number: String,
    /// Whether the bearer may connect while roaming (default: true)
    pub allow_roaming: bool,
}

impl Default for BearerProperties {
    fn default() -> Self {
        Self {
            apn: None,
            user: None,
            password: None,
            ip_type: "IP".to_string(),
            number: "*99#".to_string(),
            allow_roaming: true,
        }
    }
}

impl BearerProperties {
    pub fn new(apn: impl Into<String>) -> Self {
        Self {
            apn: Some(apn.into()),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_ip_type(mut self, ip_type: impl Into<String>) -> Self {
        self.ip_type = ip_type.into();
        self
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }

    pub fn with_allow_roaming(mut self, allow_roaming: bool) -> Self {
        self.allow_roaming = allow_roaming;
        self
    }
}

/// A data connection a modem can bring up
pub trait Bearer: Send + Sync {
    fn properties(&self) -> &BearerProperties;

    fn connect(&self, cancel: &CancellationToken) -> impl Future<Output = ModemResult<()>> + Send;

    fn disconnect(&self) -> impl Future<Output = ModemResult<()>> + Send;
}

/// A bearer together with its connection status
#[derive(Debug)]
pub struct ManagedBearer<B> {
    bearer: B,
    status: Mutex<BearerStatus>,
}

impl<B: Bearer> ManagedBearer<B> {
    pub fn new(bearer: B) -> Self {
        Self {
            bearer,
            status: Mutex::new(BearerStatus::Disconnected),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BearerStatus> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn bearer(&self) -> &B {
        &self.bearer
    }

    pub fn properties(&self) -> &BearerProperties {
        self.bearer.properties()
    }

    pub fn status(&self) -> BearerStatus {
        *self.lock()
    }

    fn set_status(&self, status: BearerStatus) {
        let mut current = self.lock();
        if *current != status {
            debug!("Bearer status changed ({} -> {})", *current, status);
            *current = status;
        }
    }

    /// Moves from `from` to `to`; `Ok(false)` when already at `done`
    fn begin(&self, from: BearerStatus, to: BearerStatus, done: BearerStatus) -> ModemResult<bool> {
        let mut status = self.lock();
        if *status == done {
            return Ok(false);
        }
        if *status != from {
            return Err(ModemError::InvalidData(format!("bearer is {}", *status)));
        }
        *status = to;
        Ok(true)
    }

    /// Connects; a connected bearer is left alone
    pub async fn connect(&self, cancel: &CancellationToken) -> ModemResult<()> {
        if !self.begin(BearerStatus::Disconnected, BearerStatus::Connecting, BearerStatus::Connected)? {
            return Ok(());
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ModemError::Cancelled("Bearer connection cancelled".into())),
            result = self.bearer.connect(cancel) => result,
        };
        match &result {
            Ok(()) => {
                info!("Bearer connected");
                self.set_status(BearerStatus::Connected);
            }
            Err(err) => {
                debug!("Bearer connection failed: '{}'", err);
                self.set_status(BearerStatus::Disconnected);
            }
        }
        result
    }

    /// Disconnects; a disconnected bearer is left alone
    pub async fn disconnect(&self) -> ModemResult<()> {
        if !self.begin(BearerStatus::Connected, BearerStatus::Disconnecting, BearerStatus::Disconnected)? {
            return Ok(());
        }
        let result = self.bearer.disconnect().await;
        match &result {
            Ok(()) => {
                info!("Bearer disconnected");
                self.set_status(BearerStatus::Disconnected);
            }
            Err(_) => self.set_status(BearerStatus::Connected),
        }
        result
    }

    /// Records a disconnection the network or device initiated
    pub fn report_disconnection(&self) {
        info!("Bearer disconnected by the network");
        self.set_status(BearerStatus::Disconnected);
    }
}

/// Dial-up bearer over an AT port: `+CGDCONT` then `ATD`
#[derive(Debug)]
pub struct AtBearer<C> {
    channel: C,
    properties: BearerProperties,
    cid: u8,
    command_timeout: Duration,
    dial_timeout: Duration,
}

impl<C: CommandChannel> AtBearer<C> {
    pub fn new(channel: C, properties: BearerProperties) -> Self {
        Self {
            channel,
            properties,
            cid: 1,
            command_timeout: Duration::from_secs(3),
            dial_timeout: Duration::from_secs(60),
        }
    }

    /// PDP context to define and dial (default: 1)
    pub fn with_cid(mut self, cid: u8) -> Self {
        self.cid = cid;
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }
}

impl<C: CommandChannel> Bearer for AtBearer<C> {
    fn properties(&self) -> &BearerProperties {
        &self.properties
    }

    async fn connect(&self, _cancel: &CancellationToken) -> ModemResult<()> {
        let apn = self.properties.apn.as_deref().unwrap_or_default();
        let define = format!(
            "AT+CGDCONT={},\"{}\",\"{}\"",
            self.cid, self.properties.ip_type, apn
        );
        at_command(&self.channel, &define, self.command_timeout).await?;

        let dial = format!("ATD*99***{}#\r", self.cid);
        self.channel
            .send_command(dial.as_bytes(), self.dial_timeout, at_response)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> ModemResult<()> {
        at_command(&self.channel, "ATH", self.command_timeout).await?;
        Ok(())
    }
}
