// ABOUTME: Notification sink receiving registration, operator and modem-state updates
// ABOUTME: ModemStatus is the per-modem store implementing it on top of the lifecycle state machine

use super::registration::{AccessTechnology, RegistrationState};
use super::state::{ModemState, ModemStateMachine};
use std::sync::{Mutex, MutexGuard};

/// Location area code and cell ID of the serving cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub lac: u32,
    pub cell_id: u32,
}

impl Location {
    pub fn is_known(&self) -> bool {
        self.lac > 0 && self.cell_id > 0
    }
}

/// Consolidated registration update
///
/// `None` fields leave the current value untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationUpdate {
    pub state: RegistrationState,
    pub access_tech: Option<AccessTechnology>,
    pub location: Option<Location>,
}

/// Current network operator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperatorInfo {
    /// MCC and MNC digits, e.g. `20404`
    pub code: Option<String>,
    pub name: Option<String>,
    pub mcc_mnc: Option<(u16, u16)>,
}

/// Receiver of the updates the 3GPP interface produces
pub trait ModemStateSink: Send + Sync {
    fn update_registration(&self, update: RegistrationUpdate);

    fn update_operator(&self, operator: OperatorInfo);

    /// Requests `registered`, `searching` or `enabled`
    fn update_modem_state(&self, state: ModemState);
}

#[derive(Debug, Default)]
struct StatusInner {
    machine: ModemStateMachine,
    registration: RegistrationState,
    access_tech: AccessTechnology,
    location: Location,
    operator: OperatorInfo,
}

/// Observable status of one modem
#[derive(Debug, Default)]
pub struct ModemStatus {
    inner: Mutex<StatusInner>,
}

impl ModemStatus {
    pub fn new(state: ModemState) -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                machine: ModemStateMachine::new(state),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> ModemState {
        self.lock().machine.state()
    }

    pub fn registration(&self) -> RegistrationState {
        self.lock().registration
    }

    pub fn access_tech(&self) -> AccessTechnology {
        self.lock().access_tech
    }

    pub fn location(&self) -> Location {
        self.lock().location
    }

    pub fn operator(&self) -> OperatorInfo {
        self.lock().operator.clone()
    }

    /// Runs `f` on the lifecycle state machine
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut ModemStateMachine) -> R) -> R {
        f(&mut self.lock().machine)
    }
}

impl ModemStateSink for ModemStatus {
    fn update_registration(&self, update: RegistrationUpdate) {
        let mut inner = self.lock();
        inner.registration = update.state;
        if let Some(access_tech) = update.access_tech {
            inner.access_tech = access_tech;
        }
        if let Some(location) = update.location {
            inner.location = location;
        }
    }

    fn update_operator(&self, operator: OperatorInfo) {
        self.lock().operator = operator;
    }

    fn update_modem_state(&self, state: ModemState) {
        self.lock().machine.update_from_registration(state);
    }
}
