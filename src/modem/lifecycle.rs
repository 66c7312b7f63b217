// ABOUTME: One modem: lifecycle state machine, 3GPP interface and data bearers tied together
// ABOUTME: Enable, disable, connect and disconnect each run as a single validated state transition

use super::bearer::{Bearer, BearerStatus, ManagedBearer};
use super::iface_3gpp::{Iface3gpp, Modem3gpp};
use super::periodic::RegistrationCheckConfig;
use super::registration::{Domain, NetworkInfo, RegistrationReport, RegistrationState};
use super::sink::ModemStatus;
use super::state::ModemState;
use crate::error::{ModemError, ModemResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How long a manual registration request may take
const MANUAL_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(60);

/// A modem built from probed ports
pub struct Modem<M, B> {
    status: Arc<ModemStatus>,
    iface: Arc<Iface3gpp<M, ModemStatus>>,
    bearers: Mutex<Vec<Arc<ManagedBearer<B>>>>,
}

impl<M, B> Modem<M, B>
where
    M: Modem3gpp + 'static,
    B: Bearer,
{
    /// Creates a disabled modem
    pub fn new(modem: M, config: RegistrationCheckConfig) -> Self {
        let status = Arc::new(ModemStatus::new(ModemState::Disabled));
        let iface = Arc::new(Iface3gpp::new(modem, status.clone(), config));
        Self {
            status,
            iface,
            bearers: Mutex::new(Vec::new()),
        }
    }

    pub fn status(&self) -> &Arc<ModemStatus> {
        &self.status
    }

    pub fn state(&self) -> ModemState {
        self.status.state()
    }

    pub fn iface_3gpp(&self) -> &Arc<Iface3gpp<M, ModemStatus>> {
        &self.iface
    }

    /// Loads the static 3GPP properties
    pub async fn initialize(&self, cancel: &CancellationToken) -> ModemResult<()> {
        self.iface.initialize(cancel).await
    }

    /// Runs the 3GPP enable sequence between `enabling` and the registration state
    pub async fn enable(&self, cancel: &CancellationToken) -> ModemResult<()> {
        if !self.status.with_machine(|m| m.start_enabling())? {
            debug!("Modem already enabled");
            return Ok(());
        }
        let result = self.iface.enable(cancel).await;
        self.status.with_machine(|m| m.finish_enabling(result.is_ok()));
        result
    }

    /// Disconnects every bearer, then runs the 3GPP disable sequence
    pub async fn disable(&self) -> ModemResult<()> {
        if !self.status.with_machine(|m| m.start_disabling())? {
            debug!("Modem already disabled");
            return Ok(());
        }
        for bearer in self.bearers() {
            if let Err(err) = bearer.disconnect().await {
                debug!("Couldn't disconnect bearer while disabling: '{}'", err);
            }
        }
        self.iface.disable().await;
        self.status.with_machine(|m| m.finish_disabling(true));
        Ok(())
    }

    /// Registers a bearer with the modem
    pub fn create_bearer(&self, bearer: B) -> Arc<ManagedBearer<B>> {
        let bearer = Arc::new(ManagedBearer::new(bearer));
        self.bearers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(bearer.clone());
        bearer
    }

    pub fn bearers(&self) -> Vec<Arc<ManagedBearer<B>>> {
        self.bearers.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Connects `bearer`, moving the modem through `connecting`
    ///
    /// Requires the modem to be registered. Bearers that don't allow
    /// roaming refuse to connect on a roaming registration.
    pub async fn connect(&self, bearer: &ManagedBearer<B>, cancel: &CancellationToken) -> ModemResult<()> {
        if !bearer.properties().allow_roaming
            && self.iface.registration_state() == RegistrationState::Roaming
        {
            return Err(ModemError::unsupported("connection while roaming"));
        }
        let started = self.status.with_machine(|m| m.start_connecting())?;
        let result = bearer.connect(cancel).await;
        if started {
            self.status.with_machine(|m| m.finish_connecting(result.is_ok()));
        }
        result
    }

    /// Disconnects `bearer`; the modem leaves `connected` once no bearer is up
    pub async fn disconnect(&self, bearer: &ManagedBearer<B>) -> ModemResult<()> {
        bearer.disconnect().await?;
        let still_connected = self
            .bearers()
            .iter()
            .any(|b| b.status() == BearerStatus::Connected);
        if still_connected {
            return Ok(());
        }
        if self.status.with_machine(|m| m.start_disconnecting())? {
            self.status.with_machine(|m| m.finish_disconnecting(true));
        }
        Ok(())
    }

    /// Registers with `operator_id` (`MCCMNC`), or automatically with `None`
    ///
    /// Not allowed before the modem is enabled or while it has a bearer up.
    pub async fn register(&self, operator_id: Option<&str>) -> ModemResult<()> {
        match self.state() {
            ModemState::Enabled | ModemState::Searching | ModemState::Registered => {}
            current => {
                return Err(ModemError::WrongState {
                    current,
                    operation: "register in network",
                });
            }
        }
        self.iface
            .register_in_network(operator_id, MANUAL_REGISTRATION_TIMEOUT)
            .await
    }

    /// Lists the networks in range
    pub async fn scan_networks(&self) -> ModemResult<Vec<NetworkInfo>> {
        let current = self.state();
        if current < ModemState::Enabled {
            return Err(ModemError::WrongState {
                current,
                operation: "scan networks",
            });
        }
        self.iface.scan_networks().await
    }

    /// Feeds a registration report from outside the port's own listener
    pub async fn handle_registration(&self, domain: Domain, report: RegistrationReport) {
        if self.state() < ModemState::Enabling {
            debug!("Ignoring {} registration report while {}", domain, self.state());
            return;
        }
        self.iface.update_registration(domain, report).await;
    }

    /// Records a bearer dropped by the network
    pub fn report_disconnection(&self, bearer: &ManagedBearer<B>) {
        bearer.report_disconnection();
        let any_connected = self
            .bearers()
            .iter()
            .any(|b| b.status() == BearerStatus::Connected);
        if !any_connected && self.status.with_machine(|m| m.start_disconnecting()).unwrap_or(false) {
            info!("Last bearer dropped");
            self.status.with_machine(|m| m.finish_disconnecting(true));
        }
    }
}
