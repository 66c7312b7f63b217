// ABOUTME: 3GPP modem interface: capability trait plus the initialize, enable and disable step sequences
// ABOUTME: Tracks CS/PS registration, reports consolidated changes and falls back to periodic polling

use super::periodic::{PeriodicRegistrationCheck, RegistrationCheckConfig};
use super::registration::{Domain, NetworkInfo, RegistrationContext, RegistrationReport, RegistrationState};
use super::sink::{Location, ModemStateSink, OperatorInfo, RegistrationUpdate};
use super::state::ModemState;
use crate::error::{ModemError, ModemResult};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Facilities with an enabled lock, as reported by `AT+CLCK`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FacilityLocks(u32);

impl FacilityLocks {
    pub const NONE: FacilityLocks = FacilityLocks(0);
    pub const SIM: FacilityLocks = FacilityLocks(1 << 0);
    pub const FIXED_DIALING: FacilityLocks = FacilityLocks(1 << 1);
    pub const PH_SIM: FacilityLocks = FacilityLocks(1 << 2);
    pub const PH_FSIM: FacilityLocks = FacilityLocks(1 << 3);
    pub const NET_PERS: FacilityLocks = FacilityLocks(1 << 4);
    pub const NET_SUB_PERS: FacilityLocks = FacilityLocks(1 << 5);
    pub const PROVIDER_PERS: FacilityLocks = FacilityLocks(1 << 6);
    pub const CORP_PERS: FacilityLocks = FacilityLocks(1 << 7);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: FacilityLocks) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FacilityLocks) {
        self.0 |= other.0;
    }
}

impl fmt::Debug for FacilityLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FacilityLocks({:#04x})", self.0)
    }
}

/// Time between registration checks while waiting for a requested registration
const REGISTRATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Unsolicited CS/PS registration reports delivered by a modem port
pub struct RegistrationReports {
    lines: mpsc::UnboundedReceiver<String>,
    parse: fn(&str) -> Option<(Domain, RegistrationReport)>,
}

impl RegistrationReports {
    pub fn new(lines: mpsc::UnboundedReceiver<String>, parse: fn(&str) -> Option<(Domain, RegistrationReport)>) -> Self {
        Self { lines, parse }
    }

    /// Next report; `None` once the port stops delivering them
    pub async fn recv(&mut self) -> Option<(Domain, RegistrationReport)> {
        loop {
            let line = self.lines.recv().await?;
            match (self.parse)(&line) {
                Some(report) => return Some(report),
                None => debug!("Ignoring unsolicited registration line '{}'", line),
            }
        }
    }
}

/// What a modem can do on a 3GPP network
///
/// Every operation defaults to `Unsupported`, which the interface treats
/// as "not implemented" and skips. Any other error is a real failure.
pub trait Modem3gpp: Send + Sync {
    /// LTE-only modems have no circuit-switched service
    fn is_lte_only(&self) -> bool {
        false
    }

    fn load_imei(&self) -> impl Future<Output = ModemResult<String>> + Send {
        async { Err(ModemError::unsupported("load IMEI")) }
    }

    fn load_enabled_facility_locks(&self) -> impl Future<Output = ModemResult<FacilityLocks>> + Send {
        async { Err(ModemError::unsupported("load enabled facility locks")) }
    }

    fn setup_indicators(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("setup indicators")) }
    }

    fn setup_unsolicited_events(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("setup unsolicited events")) }
    }

    fn cleanup_unsolicited_events(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("cleanup unsolicited events")) }
    }

    fn enable_unsolicited_events(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("enable unsolicited events")) }
    }

    fn disable_unsolicited_events(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("disable unsolicited events")) }
    }

    /// Starts delivering unsolicited registration reports
    ///
    /// `None` means the modem has no way to deliver them, so registration
    /// gets polled instead.
    fn setup_unsolicited_registration(&self) -> impl Future<Output = ModemResult<Option<RegistrationReports>>> + Send {
        async { Err(ModemError::unsupported("setup unsolicited registration")) }
    }

    fn cleanup_unsolicited_registration(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("cleanup unsolicited registration")) }
    }

    fn setup_cs_registration(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("setup CS registration")) }
    }

    fn cleanup_cs_registration(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("cleanup CS registration")) }
    }

    fn setup_ps_registration(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("setup PS registration")) }
    }

    fn cleanup_ps_registration(&self) -> impl Future<Output = ModemResult<()>> + Send {
        async { Err(ModemError::unsupported("cleanup PS registration")) }
    }

    fn run_cs_registration_check(&self) -> impl Future<Output = ModemResult<RegistrationReport>> + Send {
        async { Err(ModemError::unsupported("CS registration check")) }
    }

    fn run_ps_registration_check(&self) -> impl Future<Output = ModemResult<RegistrationReport>> + Send {
        async { Err(ModemError::unsupported("PS registration check")) }
    }

    fn load_operator_code(&self) -> impl Future<Output = ModemResult<String>> + Send {
        async { Err(ModemError::unsupported("load operator code")) }
    }

    fn load_operator_name(&self) -> impl Future<Output = ModemResult<String>> + Send {
        async { Err(ModemError::unsupported("load operator name")) }
    }

    /// Selects `operator_id` manually, or lets the modem choose with `None`
    fn register_in_network(
        &self,
        operator_id: Option<&str>,
        timeout: Duration,
    ) -> impl Future<Output = ModemResult<()>> + Send {
        let _ = (operator_id, timeout);
        async { Err(ModemError::unsupported("register in network")) }
    }

    fn scan_networks(&self) -> impl Future<Output = ModemResult<Vec<NetworkInfo>>> + Send {
        async { Err(ModemError::unsupported("scan networks")) }
    }
}

/// Steps of interface initialization, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationStep {
    Imei,
    EnabledFacilityLocks,
    Last,
}

/// Steps of interface enabling, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnablingStep {
    SetupIndicators,
    SetupUnsolicitedEvents,
    EnableUnsolicitedEvents,
    SetupUnsolicitedRegistration,
    SetupCsRegistration,
    SetupPsRegistration,
    RunAllRegistrationChecks,
    Last,
}

impl EnablingStep {
    fn next(self) -> EnablingStep {
        match self {
            EnablingStep::SetupIndicators => EnablingStep::SetupUnsolicitedEvents,
            EnablingStep::SetupUnsolicitedEvents => EnablingStep::EnableUnsolicitedEvents,
            EnablingStep::EnableUnsolicitedEvents => EnablingStep::SetupUnsolicitedRegistration,
            EnablingStep::SetupUnsolicitedRegistration => EnablingStep::SetupCsRegistration,
            EnablingStep::SetupCsRegistration => EnablingStep::SetupPsRegistration,
            EnablingStep::SetupPsRegistration => EnablingStep::RunAllRegistrationChecks,
            EnablingStep::RunAllRegistrationChecks | EnablingStep::Last => EnablingStep::Last,
        }
    }
}

/// Steps of interface disabling, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisablingStep {
    PeriodicRegistrationChecks,
    CleanupPsRegistration,
    CleanupCsRegistration,
    CleanupUnsolicitedRegistration,
    CleanupUnsolicitedEvents,
    DisableUnsolicitedEvents,
    Last,
}

impl DisablingStep {
    fn next(self) -> DisablingStep {
        match self {
            DisablingStep::PeriodicRegistrationChecks => DisablingStep::CleanupPsRegistration,
            DisablingStep::CleanupPsRegistration => DisablingStep::CleanupCsRegistration,
            DisablingStep::CleanupCsRegistration => DisablingStep::CleanupUnsolicitedRegistration,
            DisablingStep::CleanupUnsolicitedRegistration => DisablingStep::CleanupUnsolicitedEvents,
            DisablingStep::CleanupUnsolicitedEvents => DisablingStep::DisableUnsolicitedEvents,
            DisablingStep::DisableUnsolicitedEvents | DisablingStep::Last => DisablingStep::Last,
        }
    }
}

/// Splits an operator code into MCC and MNC
///
/// Codes are 5 or 6 digits: a 3 digit MCC and a 2 or 3 digit MNC.
pub fn parse_mcc_mnc(code: &str) -> Option<(u16, u16)> {
    if !(code.len() == 5 || code.len() == 6) || !code.bytes().all(|b| b.is_ascii_digit()) {
        debug!("Unexpected MCC/MNC string '{}'", code);
        return None;
    }
    let mcc = code[..3].parse().ok()?;
    let mnc = code[3..].parse().ok()?;
    Some((mcc, mnc))
}

#[derive(Debug)]
struct IfaceInner {
    context: RegistrationContext,
    /// Last consolidated state reported
    reported: RegistrationState,
    lte_only_checked: bool,
    indicators_checked: bool,
    unsolicited_events_supported: bool,
    imei: Option<String>,
    facility_locks: FacilityLocks,
    /// Operator code while registered
    operator_code: Option<String>,
}

/// The 3GPP interface of one modem
pub struct Iface3gpp<M, S> {
    modem: M,
    sink: Arc<S>,
    inner: Mutex<IfaceInner>,
    periodic: PeriodicRegistrationCheck,
    /// Task feeding unsolicited registration reports into the interface
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<M, S> Drop for Iface3gpp<M, S> {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(listener) = listener.take() {
            listener.abort();
        }
    }
}

impl<M, S> Iface3gpp<M, S>
where
    M: Modem3gpp + 'static,
    S: ModemStateSink + 'static,
{
    pub fn new(modem: M, sink: Arc<S>, config: RegistrationCheckConfig) -> Self {
        Self {
            modem,
            sink,
            inner: Mutex::new(IfaceInner {
                context: RegistrationContext::new(),
                reported: RegistrationState::Unknown,
                lte_only_checked: false,
                indicators_checked: false,
                unsolicited_events_supported: false,
                imei: None,
                facility_locks: FacilityLocks::NONE,
                operator_code: None,
            }),
            periodic: PeriodicRegistrationCheck::new(config),
            listener: Mutex::new(None),
        }
    }

    fn inner(&self) -> MutexGuard<'_, IfaceInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn modem(&self) -> &M {
        &self.modem
    }

    /// The consolidated registration state last reported
    pub fn registration_state(&self) -> RegistrationState {
        self.inner().reported
    }

    pub fn registration_context(&self) -> RegistrationContext {
        self.inner().context.clone()
    }

    pub fn supports(&self, domain: Domain) -> bool {
        self.inner().context.supports(domain)
    }

    pub fn set_supported(&self, domain: Domain, supported: bool) {
        self.inner().context.set_supported(domain, supported);
    }

    pub fn imei(&self) -> Option<String> {
        self.inner().imei.clone()
    }

    pub fn facility_locks(&self) -> FacilityLocks {
        self.inner().facility_locks
    }

    pub fn unsolicited_events_supported(&self) -> bool {
        self.inner().unsolicited_events_supported
    }

    pub fn periodic_checks_enabled(&self) -> bool {
        self.periodic.is_enabled()
    }

    /// Whether unsolicited registration reports are being listened for
    pub fn listening_for_reports(&self) -> bool {
        self.listener().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Code of the operator the modem is registered with
    pub fn operator_code(&self) -> Option<String> {
        self.inner().operator_code.clone()
    }

    fn listener(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Applies a CS or PS registration report, from polling or an unsolicited event
    ///
    /// Reports for an unsupported domain are ignored.
    pub async fn update_registration(&self, domain: Domain, report: RegistrationReport) {
        let (old, new) = {
            let mut inner = self.inner();
            if !inner.context.update(domain, report.state) {
                return;
            }
            let old = inner.reported;
            inner.reported = inner.context.consolidated();
            (old, inner.reported)
        };

        let update = if new.is_registered() {
            RegistrationUpdate {
                state: new,
                access_tech: (!report.access_tech.is_unknown()).then_some(report.access_tech),
                location: Some(Location {
                    lac: report.lac,
                    cell_id: report.cell_id,
                })
                .filter(Location::is_known),
            }
        } else {
            RegistrationUpdate {
                state: new,
                access_tech: Some(Default::default()),
                location: Some(Location::default()),
            }
        };
        self.sink.update_registration(update);

        if old != new {
            info!("3GPP registration state changed ({} -> {})", old, new);
            self.reload_current_operator().await;
            let state = match new {
                s if s.is_registered() => ModemState::Registered,
                RegistrationState::Searching => ModemState::Searching,
                _ => ModemState::Enabled,
            };
            self.sink.update_modem_state(state);
        }
    }

    /// Loads operator code and name while registered, clears them otherwise
    pub async fn reload_current_operator(&self) {
        if !self.registration_state().is_registered() {
            self.inner().operator_code = None;
            self.sink.update_operator(OperatorInfo::default());
            return;
        }

        let code = match self.modem.load_operator_code().await {
            Ok(code) => Some(code),
            Err(err) if err.is_unsupported() => None,
            Err(err) => {
                warn!("Couldn't load Operator Code: '{}'", err);
                None
            }
        };
        let name = match self.modem.load_operator_name().await {
            Ok(name) => Some(name),
            Err(err) if err.is_unsupported() => None,
            Err(err) => {
                warn!("Couldn't load Operator Name: '{}'", err);
                None
            }
        };
        let mcc_mnc = code.as_deref().and_then(parse_mcc_mnc);
        self.inner().operator_code = code.clone();
        self.sink.update_operator(OperatorInfo { code, name, mcc_mnc });
    }

    /// Runs one domain's check; `None` when the modem can't check it
    async fn run_registration_check(&self, domain: Domain) -> Option<ModemResult<()>> {
        let result = match domain {
            Domain::Cs => self.modem.run_cs_registration_check().await,
            Domain::Ps => self.modem.run_ps_registration_check().await,
        };
        match result {
            Ok(report) => {
                self.update_registration(domain, report).await;
                Some(Ok(()))
            }
            Err(err) if err.is_unsupported() => None,
            Err(err) => Some(Err(err)),
        }
    }

    /// Queries CS then PS registration, each only if the domain is supported
    ///
    /// Fails only when no check succeeded; a PS error is preferred.
    pub async fn run_all_registration_checks(&self) -> ModemResult<()> {
        let cs_supported = self.supports(Domain::Cs);
        let ps_supported = self.supports(Domain::Ps);
        debug!(
            "Running registration checks (CS: '{}', PS: '{}')",
            if cs_supported { "yes" } else { "no" },
            if ps_supported { "yes" } else { "no" }
        );

        let cs = match cs_supported {
            true => self.run_registration_check(Domain::Cs).await,
            false => None,
        };
        let ps = match ps_supported {
            true => self.run_registration_check(Domain::Ps).await,
            false => None,
        };

        match (cs, ps) {
            (Some(Ok(())), _) => Ok(()),
            (_, Some(Err(err))) => Err(err),
            (Some(Err(err)), None) => Err(err),
            _ => Ok(()),
        }
    }

    /// Loads the IMEI (once per modem lifetime) and the enabled facility locks
    ///
    /// Load failures are logged; only cancellation fails the sequence.
    pub async fn initialize(&self, cancel: &CancellationToken) -> ModemResult<()> {
        {
            let mut inner = self.inner();
            if !inner.lte_only_checked {
                inner.lte_only_checked = true;
                if self.modem.is_lte_only() {
                    debug!("Modem is LTE-only, assuming CS network is not supported");
                    inner.context.set_supported(Domain::Cs, false);
                }
            }
        }

        let mut step = InitializationStep::Imei;
        while step != InitializationStep::Last {
            if cancel.is_cancelled() {
                return Err(ModemError::Cancelled("Interface initialization cancelled".into()));
            }
            step = self.initialization_step(step).await;
        }
        Ok(())
    }

    async fn initialization_step(&self, step: InitializationStep) -> InitializationStep {
        match step {
            InitializationStep::Imei => {
                if self.imei().is_none() {
                    match self.modem.load_imei().await {
                        Ok(imei) => self.inner().imei = Some(imei),
                        Err(err) if err.is_unsupported() => {}
                        Err(err) => warn!("couldn't load IMEI: '{}'", err),
                    }
                }
                InitializationStep::EnabledFacilityLocks
            }
            InitializationStep::EnabledFacilityLocks => {
                match self.modem.load_enabled_facility_locks().await {
                    Ok(locks) => self.inner().facility_locks = locks,
                    Err(err) if err.is_unsupported() => {}
                    Err(err) => {
                        warn!("couldn't load facility locks: '{}'", err);
                        self.inner().facility_locks = FacilityLocks::NONE;
                    }
                }
                InitializationStep::Last
            }
            InitializationStep::Last => InitializationStep::Last,
        }
    }

    /// Brings up registration reporting
    ///
    /// Only a failure to set up unsolicited registration aborts enabling.
    /// Failing to set up CS or PS registration reports starts periodic
    /// polling instead.
    pub async fn enable(self: &Arc<Self>, cancel: &CancellationToken) -> ModemResult<()> {
        let mut step = EnablingStep::SetupIndicators;
        while step != EnablingStep::Last {
            if cancel.is_cancelled() {
                return Err(ModemError::Cancelled("Interface enabling cancelled".into()));
            }
            step = self.enabling_step(step).await?;
        }
        Ok(())
    }

    async fn enabling_step(self: &Arc<Self>, step: EnablingStep) -> ModemResult<EnablingStep> {
        // skipping these two jumps straight to unsolicited registration
        let skip_events = EnablingStep::SetupUnsolicitedRegistration;

        match step {
            EnablingStep::SetupIndicators => {
                {
                    let mut inner = self.inner();
                    if inner.indicators_checked {
                        return Ok(step.next());
                    }
                    inner.indicators_checked = true;
                    inner.unsolicited_events_supported = false;
                }
                match self.modem.setup_indicators().await {
                    Ok(()) => {
                        self.inner().unsolicited_events_supported = true;
                        Ok(step.next())
                    }
                    Err(err) => {
                        if !err.is_unsupported() {
                            debug!("Indicator control setup failed: '{}'", err);
                        }
                        Ok(skip_events)
                    }
                }
            }
            EnablingStep::SetupUnsolicitedEvents => {
                if !self.unsolicited_events_supported() {
                    return Ok(step.next());
                }
                match self.modem.setup_unsolicited_events().await {
                    Ok(()) => Ok(step.next()),
                    Err(err) if err.is_unsupported() => Ok(step.next()),
                    Err(err) => {
                        debug!("Setting up unsolicited events failed: '{}'", err);
                        self.inner().unsolicited_events_supported = false;
                        Ok(skip_events)
                    }
                }
            }
            EnablingStep::EnableUnsolicitedEvents => {
                if !self.unsolicited_events_supported() {
                    return Ok(step.next());
                }
                match self.modem.enable_unsolicited_events().await {
                    Ok(()) => {}
                    Err(err) if err.is_unsupported() => {}
                    Err(err) => {
                        debug!("Enabling unsolicited events failed: '{}'", err);
                        self.inner().unsolicited_events_supported = false;
                    }
                }
                Ok(step.next())
            }
            EnablingStep::SetupUnsolicitedRegistration => {
                match self.modem.setup_unsolicited_registration().await {
                    Ok(Some(reports)) => self.listen_for_reports(reports),
                    Ok(None) => {
                        debug!("No unsolicited registration reports, polling instead");
                        self.enable_periodic_checks();
                    }
                    Err(err) if err.is_unsupported() => {}
                    Err(err) => return Err(err),
                }
                Ok(step.next())
            }
            EnablingStep::SetupCsRegistration | EnablingStep::SetupPsRegistration => {
                let domain = match step {
                    EnablingStep::SetupCsRegistration => Domain::Cs,
                    _ => Domain::Ps,
                };
                if !self.supports(domain) {
                    return Ok(step.next());
                }
                let result = match domain {
                    Domain::Cs => self.modem.setup_cs_registration().await,
                    Domain::Ps => self.modem.setup_ps_registration().await,
                };
                match result {
                    Ok(()) => {}
                    Err(err) if err.is_unsupported() => {}
                    Err(err) => {
                        self.enable_periodic_checks();
                        debug!("Couldn't setup {} registration: '{}'", domain, err);
                    }
                }
                Ok(step.next())
            }
            EnablingStep::RunAllRegistrationChecks => {
                if let Err(err) = self.run_all_registration_checks().await {
                    debug!("Initial registration check failed: '{}'", err);
                }
                Ok(step.next())
            }
            EnablingStep::Last => Ok(EnablingStep::Last),
        }
    }

    fn listen_for_reports(self: &Arc<Self>, mut reports: RegistrationReports) {
        let iface = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some((domain, report)) = reports.recv().await {
                let Some(iface) = iface.upgrade() else {
                    break;
                };
                iface.update_registration(domain, report).await;
            }
            debug!("Unsolicited registration reports stopped");
        });
        if let Some(previous) = self.listener().replace(task) {
            previous.abort();
        }
    }

    fn enable_periodic_checks(self: &Arc<Self>) {
        let iface = Arc::downgrade(self);
        self.periodic.enable(move || {
            let iface = iface.clone();
            async move {
                match iface.upgrade() {
                    Some(iface) => iface.run_all_registration_checks().await,
                    None => Ok(()),
                }
            }
        });
    }

    /// Tears down registration reporting; every step runs and errors are logged
    ///
    /// The registration state is forgotten, so the next enable reports
    /// whatever the modem registers with from scratch.
    pub async fn disable(&self) {
        let mut step = DisablingStep::PeriodicRegistrationChecks;
        while step != DisablingStep::Last {
            if let Err(err) = self.disabling_step(step).await {
                if !err.is_unsupported() {
                    debug!("Disabling step {:?} failed: '{}'", step, err);
                }
            }
            step = step.next();
        }
        self.reset_registration();
    }

    fn reset_registration(&self) {
        {
            let mut inner = self.inner();
            inner.context.reset();
            inner.reported = RegistrationState::Unknown;
            inner.operator_code = None;
        }
        self.sink.update_registration(RegistrationUpdate {
            state: RegistrationState::Unknown,
            access_tech: Some(Default::default()),
            location: Some(Location::default()),
        });
        self.sink.update_operator(OperatorInfo::default());
    }

    /// Registers with `operator_id` (MCC and MNC digits), or lets the
    /// modem pick a network when `None`
    ///
    /// Nothing is sent when already registered with the requested
    /// operator, or with any operator if none was requested. Otherwise
    /// waits up to `max_registration_time` for the registration.
    pub async fn register_in_network(
        &self,
        operator_id: Option<&str>,
        max_registration_time: Duration,
    ) -> ModemResult<()> {
        if let Some(id) = operator_id {
            if parse_mcc_mnc(id).is_none() {
                return Err(ModemError::InvalidData(format!("invalid operator ID '{id}'")));
            }
        }
        if let Some(current) = self.operator_code() {
            if operator_id.is_none_or(|id| id == current) {
                debug!("Already registered in network '{}'", current);
                return Ok(());
            }
        }

        self.modem.register_in_network(operator_id, max_registration_time).await?;
        let registered = async {
            loop {
                if let Err(err) = self.run_all_registration_checks().await {
                    debug!("Registration check failed: '{}'", err);
                }
                if self.registration_state().is_registered() {
                    return;
                }
                tokio::time::sleep(REGISTRATION_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(max_registration_time, registered)
            .await
            .map_err(|_| ModemError::Timeout)?;
        info!("Registered in network '{}'", self.operator_code().unwrap_or_default());
        Ok(())
    }

    /// Lists the networks the modem can see
    pub async fn scan_networks(&self) -> ModemResult<Vec<NetworkInfo>> {
        let networks = self.modem.scan_networks().await?;
        debug!("Found {} network(s)", networks.len());
        Ok(networks)
    }

    async fn disabling_step(&self, step: DisablingStep) -> ModemResult<()> {
        match step {
            DisablingStep::PeriodicRegistrationChecks => {
                self.periodic.disable();
                Ok(())
            }
            DisablingStep::CleanupPsRegistration if self.supports(Domain::Ps) => {
                self.modem.cleanup_ps_registration().await
            }
            DisablingStep::CleanupCsRegistration if self.supports(Domain::Cs) => {
                self.modem.cleanup_cs_registration().await
            }
            DisablingStep::CleanupUnsolicitedRegistration => {
                if let Some(listener) = self.listener().take() {
                    listener.abort();
                }
                self.modem.cleanup_unsolicited_registration().await
            }
            DisablingStep::CleanupUnsolicitedEvents if self.unsolicited_events_supported() => {
                self.modem.cleanup_unsolicited_events().await
            }
            DisablingStep::DisableUnsolicitedEvents if self.unsolicited_events_supported() => {
                self.modem.disable_unsolicited_events().await
            }
            _ => Ok(()),
        }
    }
}
