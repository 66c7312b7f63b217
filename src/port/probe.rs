// ABOUTME: Port probe: per-port asynchronous classification into AT, QCDM, net or ignored
// ABOUTME: Tracks pending checks, caches results across runs and supports full or AT-only cancellation

use super::at::{at_command, at_probe_response, strip_tag};
use super::device::PortDevice;
use super::qcdm::{is_version_info_reply, qcdm_response, version_info_request};
use super::serial::CommandChannel;
use crate::error::{ModemError, ModemResult, SerialError};
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const VENDOR_COMMANDS: [&str; 3] = ["+CGMI", "+GMI", "I"];
const PRODUCT_COMMANDS: [&str; 3] = ["+CGMM", "+GMM", "I"];

/// Set of checks a probe run performs
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProbeFlags(u8);

impl ProbeFlags {
    pub const NONE: ProbeFlags = ProbeFlags(0);
    pub const AT: ProbeFlags = ProbeFlags(1 << 0);
    pub const AT_VENDOR: ProbeFlags = ProbeFlags(1 << 1);
    pub const AT_PRODUCT: ProbeFlags = ProbeFlags(1 << 2);
    pub const QCDM: ProbeFlags = ProbeFlags(1 << 3);

    pub fn contains(&self, other: ProbeFlags) -> bool {
        self.0 & other.0 == other.0 && !other.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn remove(&mut self, other: ProbeFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for ProbeFlags {
    type Output = ProbeFlags;

    fn bitor(self, rhs: ProbeFlags) -> ProbeFlags {
        ProbeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProbeFlags {
    fn bitor_assign(&mut self, rhs: ProbeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ProbeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (ProbeFlags::AT, "AT"),
            (ProbeFlags::AT_VENDOR, "AT_VENDOR"),
            (ProbeFlags::AT_PRODUCT, "AT_PRODUCT"),
            (ProbeFlags::QCDM, "QCDM"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Timing and command settings for a probe run
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for each probing command (default: 3 seconds)
    pub command_timeout: Duration,
    /// `AT` attempts before giving up on a silent port (default: 3)
    pub at_retries: u32,
    /// Commands sent before AT detection to wake up or configure the port
    pub custom_init: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(3),
            at_retries: 3,
            custom_init: Vec::new(),
        }
    }
}

impl ProbeConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_at_retries(mut self, retries: u32) -> Self {
        self.at_retries = retries.max(1);
        self
    }

    pub fn with_custom_init(mut self, commands: Vec<String>) -> Self {
        self.custom_init = commands;
        self
    }
}

/// What a probed port turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    At,
    Qcdm,
    Net,
    Ignored,
}

/// Lifecycle of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Created,
    Probing { pending: ProbeFlags },
    Resolved,
    Cancelled,
}

/// Identity of a probe: subsystem plus port name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeKey {
    pub subsystem: String,
    pub name: String,
}

impl ProbeKey {
    pub fn new(subsystem: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ProbeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subsystem, self.name)
    }
}

#[derive(Debug)]
struct ProbeInner {
    state: ProbeState,
    is_at: Option<bool>,
    vendor: Option<String>,
    product: Option<String>,
    is_qcdm: Option<bool>,
    cancel: CancellationToken,
    cancel_at: CancellationToken,
}

/// One candidate port under classification
#[derive(Debug)]
pub struct PortProbe {
    key: ProbeKey,
    device: PortDevice,
    driver: String,
    inner: Mutex<ProbeInner>,
}

impl PortProbe {
    pub fn new(device: PortDevice, driver: impl Into<String>) -> Self {
        Self {
            key: ProbeKey::new(device.subsystem.clone(), device.name.clone()),
            device,
            driver: driver.into(),
            inner: Mutex::new(ProbeInner {
                state: ProbeState::Created,
                is_at: None,
                vendor: None,
                product: None,
                is_qcdm: None,
                cancel: CancellationToken::new(),
                cancel_at: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProbeInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn key(&self) -> &ProbeKey {
        &self.key
    }

    pub fn subsystem(&self) -> &str {
        &self.key.subsystem
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn physdev(&self) -> &str {
        &self.device.physdev_path
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn device(&self) -> &PortDevice {
        &self.device
    }

    pub fn state(&self) -> ProbeState {
        self.lock().state
    }

    pub fn is_at(&self) -> bool {
        self.lock().is_at == Some(true)
    }

    pub fn is_qcdm(&self) -> bool {
        self.lock().is_qcdm == Some(true)
    }

    /// Vendor string reported by the modem, case-folded
    pub fn vendor(&self) -> Option<String> {
        self.lock().vendor.clone()
    }

    /// Product string reported by the modem, case-folded
    pub fn product(&self) -> Option<String> {
        self.lock().product.clone()
    }

    pub fn port_type(&self) -> PortType {
        if self.key.subsystem == "net" {
            return PortType::Net;
        }
        let inner = self.lock();
        if inner.is_at == Some(true) {
            PortType::At
        } else if inner.is_qcdm == Some(true) {
            PortType::Qcdm
        } else {
            PortType::Ignored
        }
    }

    /// Records the AT result without running the check
    ///
    /// A port known not to be AT has no vendor or product to ask for.
    pub fn set_result_at(&self, is_at: bool) {
        let mut inner = self.lock();
        inner.is_at = Some(is_at);
        if let ProbeState::Probing { pending } = &mut inner.state {
            pending.remove(ProbeFlags::AT);
            if !is_at {
                pending.remove(ProbeFlags::AT_VENDOR);
                pending.remove(ProbeFlags::AT_PRODUCT);
            }
        }
    }

    pub fn set_result_qcdm(&self, is_qcdm: bool) {
        let mut inner = self.lock();
        inner.is_qcdm = Some(is_qcdm);
        if let ProbeState::Probing { pending } = &mut inner.state {
            pending.remove(ProbeFlags::QCDM);
        }
    }

    fn set_result_vendor(&self, vendor: Option<String>) {
        let mut inner = self.lock();
        inner.vendor = vendor;
        if let ProbeState::Probing { pending } = &mut inner.state {
            pending.remove(ProbeFlags::AT_VENDOR);
        }
    }

    fn set_result_product(&self, product: Option<String>) {
        let mut inner = self.lock();
        inner.product = product;
        if let ProbeState::Probing { pending } = &mut inner.state {
            pending.remove(ProbeFlags::AT_PRODUCT);
        }
    }

    /// Cancels a running probe; returns false if nothing was running
    pub fn cancel(&self) -> bool {
        let inner = self.lock();
        if !matches!(inner.state, ProbeState::Probing { .. }) {
            return false;
        }
        inner.cancel.cancel();
        true
    }

    /// Stops AT detection only; the port is then assumed not to be AT
    ///
    /// Returns false when AT detection is not pending.
    pub fn cancel_at_probing(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            ProbeState::Probing { pending } if pending.contains(ProbeFlags::AT) => {
                debug!("({}) cancelling AT probing", self.key);
                inner.cancel_at.cancel();
                true
            }
            _ => false,
        }
    }

    fn start(&self, flags: ProbeFlags) -> (CancellationToken, CancellationToken) {
        let mut inner = self.lock();
        let mut pending = flags;
        if inner.is_at.is_some() {
            pending.remove(ProbeFlags::AT);
        }
        if inner.vendor.is_some() {
            pending.remove(ProbeFlags::AT_VENDOR);
        }
        if inner.product.is_some() {
            pending.remove(ProbeFlags::AT_PRODUCT);
        }
        if inner.is_qcdm.is_some() {
            pending.remove(ProbeFlags::QCDM);
        }
        inner.state = ProbeState::Probing { pending };
        inner.cancel = CancellationToken::new();
        inner.cancel_at = CancellationToken::new();
        (inner.cancel.clone(), inner.cancel_at.clone())
    }

    fn pending(&self) -> ProbeFlags {
        match self.lock().state {
            ProbeState::Probing { pending } => pending,
            _ => ProbeFlags::NONE,
        }
    }

    /// Runs the requested checks over `channel`
    ///
    /// Results already known from an earlier run are not probed again.
    /// Serial failures other than timeouts end the run with an error.
    pub async fn run<C: CommandChannel>(
        &self,
        flags: ProbeFlags,
        channel: &C,
        config: &ProbeConfig,
    ) -> ModemResult<()> {
        let (cancel, cancel_at) = self.start(flags);
        debug!("({}) probing {:?}", self.key, self.pending());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ModemError::Cancelled(format!("({}) probing cancelled", self.key))),
            result = self.run_checks(channel, config, &cancel_at) => result,
        };

        let mut inner = self.lock();
        inner.state = match &result {
            Err(err) if err.is_cancelled() => ProbeState::Cancelled,
            _ => ProbeState::Resolved,
        };
        debug!(
            "({}) probing finished: at={:?} qcdm={:?} vendor={:?} product={:?}",
            self.key, inner.is_at, inner.is_qcdm, inner.vendor, inner.product
        );
        result
    }

    async fn run_checks<C: CommandChannel>(
        &self,
        channel: &C,
        config: &ProbeConfig,
        cancel_at: &CancellationToken,
    ) -> ModemResult<()> {
        if self.pending().contains(ProbeFlags::AT) {
            let is_at = tokio::select! {
                biased;
                _ = cancel_at.cancelled() => false,
                is_at = probe_at(channel, config) => is_at?,
            };
            self.set_result_at(is_at);
        }

        if self.pending().contains(ProbeFlags::AT_VENDOR) {
            let vendor = probe_string(channel, config, &VENDOR_COMMANDS).await?;
            self.set_result_vendor(vendor);
        }

        if self.pending().contains(ProbeFlags::AT_PRODUCT) {
            let product = probe_string(channel, config, &PRODUCT_COMMANDS).await?;
            self.set_result_product(product);
        }

        if self.pending().contains(ProbeFlags::QCDM) {
            // an AT port never speaks QCDM
            let is_qcdm = if self.is_at() {
                false
            } else {
                probe_qcdm(channel, config).await?
            };
            self.set_result_qcdm(is_qcdm);
        }
        Ok(())
    }
}

async fn probe_at<C: CommandChannel>(channel: &C, config: &ProbeConfig) -> ModemResult<bool> {
    for command in &config.custom_init {
        match at_command(channel, command, config.command_timeout).await {
            Ok(_) | Err(SerialError::CommandFailed(_)) | Err(SerialError::Timeout) => {}
            Err(err) => return Err(err.into()),
        }
    }

    for attempt in 1..=config.at_retries.max(1) {
        match channel
            .send_command(b"AT\r", config.command_timeout, at_probe_response)
            .await
        {
            Ok(_) => return Ok(true),
            Err(SerialError::Timeout) => {
                debug!("AT probe attempt {} timed out", attempt);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(false)
}

fn clean_identification(response: &str, command: &str) -> Option<String> {
    let first = response.lines().next()?;
    let value = if command.starts_with('+') {
        strip_tag(first, command)
    } else {
        first.trim()
    };
    let value = value.trim_matches('"').trim();
    (!value.is_empty()).then(|| value.to_lowercase())
}

async fn probe_string<C: CommandChannel>(
    channel: &C,
    config: &ProbeConfig,
    commands: &[&str],
) -> ModemResult<Option<String>> {
    for command in commands {
        match at_command(channel, &format!("AT{command}"), config.command_timeout).await {
            Ok(response) => {
                if let Some(value) = clean_identification(&response, command) {
                    return Ok(Some(value));
                }
            }
            Err(SerialError::CommandFailed(_)) | Err(SerialError::Timeout) => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(None)
}

async fn probe_qcdm<C: CommandChannel>(channel: &C, config: &ProbeConfig) -> ModemResult<bool> {
    let request = version_info_request();
    match channel
        .send_command(&request, config.command_timeout, qcdm_response)
        .await
    {
        Ok(response) => Ok(is_version_info_reply(&response)),
        Err(SerialError::Timeout) | Err(SerialError::CommandFailed(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Probes shared between plugins, so a port is only classified once
#[derive(Debug, Default)]
pub struct ProbeCache {
    probes: Mutex<HashMap<ProbeKey, Arc<PortProbe>>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, device: &PortDevice, driver: &str) -> Arc<PortProbe> {
        let key = ProbeKey::new(device.subsystem.clone(), device.name.clone());
        let mut probes = self.probes.lock().unwrap_or_else(|p| p.into_inner());
        probes
            .entry(key)
            .or_insert_with(|| Arc::new(PortProbe::new(device.clone(), driver)))
            .clone()
    }

    /// Forgets a port, e.g. when it is removed from the system
    pub fn remove(&self, key: &ProbeKey) -> Option<Arc<PortProbe>> {
        self.probes.lock().unwrap_or_else(|p| p.into_inner()).remove(key)
    }

    pub fn len(&self) -> usize {
        self.probes.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
