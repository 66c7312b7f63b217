// ABOUTME: Overall modem state and the lifecycle state machine driving enable, disable, connect and disconnect
// ABOUTME: Allows a single in-flight transition and folds registration-driven updates into the modem state

use crate::error::{ModemError, ModemResult};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use tracing::{debug, info};

/// Overall modem state, ordered from failed to connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i8)]
pub enum ModemState {
    Failed = -1,
    Unknown = 0,
    Initializing = 1,
    Locked = 2,
    Disabled = 3,
    Disabling = 4,
    Enabling = 5,
    Enabled = 6,
    Searching = 7,
    Registered = 8,
    Disconnecting = 9,
    Connecting = 10,
    Connected = 11,
}

impl ModemState {
    /// Whether a transition is under way
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ModemState::Enabling
                | ModemState::Disabling
                | ModemState::Connecting
                | ModemState::Disconnecting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModemState::Failed => "failed",
            ModemState::Unknown => "unknown",
            ModemState::Initializing => "initializing",
            ModemState::Locked => "locked",
            ModemState::Disabled => "disabled",
            ModemState::Disabling => "disabling",
            ModemState::Enabling => "enabling",
            ModemState::Enabled => "enabled",
            ModemState::Searching => "searching",
            ModemState::Registered => "registered",
            ModemState::Disconnecting => "disconnecting",
            ModemState::Connecting => "connecting",
            ModemState::Connected => "connected",
        }
    }
}

impl fmt::Display for ModemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the modem changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChangeReason {
    Unknown,
    UserRequested,
    Suspend,
}

/// Lifecycle state machine of one modem
///
/// Enabling, disabling, connecting and disconnecting are in-flight states;
/// while one is active every other request fails with `WrongState`.
/// `start_*` returns `Ok(false)` when the modem is already where the
/// request would take it.
#[derive(Debug, Clone)]
pub struct ModemStateMachine {
    state: ModemState,
    /// State to return to if the in-flight transition fails
    rollback: ModemState,
    /// Latest state reported by registration, applied once enabled
    registration: ModemState,
}

impl Default for ModemStateMachine {
    fn default() -> Self {
        Self::new(ModemState::Disabled)
    }
}

impl ModemStateMachine {
    pub fn new(state: ModemState) -> Self {
        let registration = if (ModemState::Enabled..=ModemState::Registered).contains(&state) {
            state
        } else {
            ModemState::Enabled
        };
        Self {
            state,
            rollback: state,
            registration,
        }
    }

    pub fn state(&self) -> ModemState {
        self.state
    }

    fn set(&mut self, state: ModemState, reason: StateChangeReason) {
        if self.state != state {
            info!("Modem state changed ({} -> {}) [{:?}]", self.state, state, reason);
            self.state = state;
        }
    }

    fn begin(&mut self, target: ModemState, operation: &'static str) -> ModemResult<()> {
        if self.state.is_in_flight() {
            return Err(ModemError::WrongState {
                current: self.state,
                operation,
            });
        }
        self.rollback = self.state;
        self.set(target, StateChangeReason::UserRequested);
        Ok(())
    }

    fn wrong_state(&self, operation: &'static str) -> ModemError {
        ModemError::WrongState {
            current: self.state,
            operation,
        }
    }

    pub fn start_enabling(&mut self) -> ModemResult<bool> {
        match self.state {
            ModemState::Disabled => self.begin(ModemState::Enabling, "enable").map(|_| true),
            s if s >= ModemState::Enabled && !s.is_in_flight() => Ok(false),
            _ => Err(self.wrong_state("enable")),
        }
    }

    /// On success the modem lands in the latest registration-derived state
    pub fn finish_enabling(&mut self, success: bool) {
        if self.state != ModemState::Enabling {
            return;
        }
        let target = if success { self.registration } else { self.rollback };
        self.set(target, StateChangeReason::UserRequested);
    }

    pub fn start_disabling(&mut self) -> ModemResult<bool> {
        match self.state {
            ModemState::Disabled => Ok(false),
            s if s >= ModemState::Enabled && !s.is_in_flight() => {
                self.begin(ModemState::Disabling, "disable").map(|_| true)
            }
            _ => Err(self.wrong_state("disable")),
        }
    }

    pub fn finish_disabling(&mut self, success: bool) {
        if self.state != ModemState::Disabling {
            return;
        }
        if success {
            self.registration = ModemState::Enabled;
            self.set(ModemState::Disabled, StateChangeReason::UserRequested);
        } else {
            let rollback = self.rollback;
            self.set(rollback, StateChangeReason::UserRequested);
        }
    }

    pub fn start_connecting(&mut self) -> ModemResult<bool> {
        match self.state {
            ModemState::Registered => self.begin(ModemState::Connecting, "connect").map(|_| true),
            ModemState::Connected => Ok(false),
            _ => Err(self.wrong_state("connect")),
        }
    }

    pub fn finish_connecting(&mut self, success: bool) {
        if self.state != ModemState::Connecting {
            return;
        }
        let target = if success {
            ModemState::Connected
        } else {
            self.rollback
        };
        self.set(target, StateChangeReason::UserRequested);
    }

    pub fn start_disconnecting(&mut self) -> ModemResult<bool> {
        match self.state {
            ModemState::Connected => self.begin(ModemState::Disconnecting, "disconnect").map(|_| true),
            s if s >= ModemState::Enabled && !s.is_in_flight() => Ok(false),
            _ => Err(self.wrong_state("disconnect")),
        }
    }

    /// A disconnected modem falls back to its registration state
    pub fn finish_disconnecting(&mut self, success: bool) {
        if self.state != ModemState::Disconnecting {
            return;
        }
        let target = if success {
            self.registration
        } else {
            ModemState::Connected
        };
        self.set(target, StateChangeReason::UserRequested);
    }

    /// Applies a registration-derived state: registered, searching or enabled
    ///
    /// The value is remembered but only applied while the modem is enabled
    /// and idle. A connected modem stays connected while registered.
    /// Returns whether the visible state changed.
    pub fn update_from_registration(&mut self, state: ModemState) -> bool {
        self.registration = state;
        if self.state < ModemState::Enabled || self.state.is_in_flight() {
            debug!("Ignoring registration update to {} while {}", state, self.state);
            return false;
        }
        if self.state == ModemState::Connected && state == ModemState::Registered {
            return false;
        }
        let changed = self.state != state;
        self.set(state, StateChangeReason::Unknown);
        changed
    }
}
