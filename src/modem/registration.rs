// ABOUTME: 3GPP registration states, access technologies and the CS/PS registration context
// ABOUTME: Consolidates circuit-switched and packet-switched registration into one reported state

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Registration state of one 3GPP domain, as reported by `+CREG`/`+CGREG`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RegistrationState {
    Idle = 0,
    Home = 1,
    Searching = 2,
    Denied = 3,
    #[default]
    Unknown = 4,
    Roaming = 5,
}

impl RegistrationState {
    /// Registered in the home network or roaming
    pub fn is_registered(self) -> bool {
        matches!(self, RegistrationState::Home | RegistrationState::Roaming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationState::Idle => "idle",
            RegistrationState::Home => "home",
            RegistrationState::Searching => "searching",
            RegistrationState::Denied => "denied",
            RegistrationState::Unknown => "unknown",
            RegistrationState::Roaming => "roaming",
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of radio access technologies
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessTechnology(u32);

impl AccessTechnology {
    pub const UNKNOWN: AccessTechnology = AccessTechnology(0);
    pub const GSM: AccessTechnology = AccessTechnology(1 << 1);
    pub const GPRS: AccessTechnology = AccessTechnology(1 << 3);
    pub const EDGE: AccessTechnology = AccessTechnology(1 << 4);
    pub const UMTS: AccessTechnology = AccessTechnology(1 << 5);
    pub const HSDPA: AccessTechnology = AccessTechnology(1 << 6);
    pub const HSUPA: AccessTechnology = AccessTechnology(1 << 7);
    pub const HSPA: AccessTechnology = AccessTechnology(1 << 8);
    pub const HSPA_PLUS: AccessTechnology = AccessTechnology(1 << 9);
    pub const ONE_X_RTT: AccessTechnology = AccessTechnology(1 << 10);
    pub const EVDO0: AccessTechnology = AccessTechnology(1 << 11);
    pub const EVDOA: AccessTechnology = AccessTechnology(1 << 12);
    pub const EVDOB: AccessTechnology = AccessTechnology(1 << 13);
    pub const LTE: AccessTechnology = AccessTechnology(1 << 14);

    const NAMES: [(AccessTechnology, &'static str); 13] = [
        (Self::GSM, "gsm"),
        (Self::GPRS, "gprs"),
        (Self::EDGE, "edge"),
        (Self::UMTS, "umts"),
        (Self::HSDPA, "hsdpa"),
        (Self::HSUPA, "hsupa"),
        (Self::HSPA, "hspa"),
        (Self::HSPA_PLUS, "hspa+"),
        (Self::ONE_X_RTT, "1xrtt"),
        (Self::EVDO0, "evdo0"),
        (Self::EVDOA, "evdoa"),
        (Self::EVDOB, "evdob"),
        (Self::LTE, "lte"),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_unknown(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: AccessTechnology) -> bool {
        !other.is_unknown() && self.0 & other.0 == other.0
    }

    /// Maps the `<AcT>` field of 27.007 registration responses
    pub fn from_act(act: u8) -> AccessTechnology {
        match act {
            0 | 1 => Self::GSM,
            2 => Self::UMTS,
            3 => Self::EDGE,
            4 => Self::HSDPA,
            5 => Self::HSUPA,
            6 => Self::HSPA,
            7 => Self::LTE,
            _ => Self::UNKNOWN,
        }
    }
}

impl BitOr for AccessTechnology {
    type Output = AccessTechnology;

    fn bitor(self, rhs: AccessTechnology) -> AccessTechnology {
        AccessTechnology(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessTechnology {
    fn bitor_assign(&mut self, rhs: AccessTechnology) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AccessTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for AccessTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return f.write_str("unknown");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(tech, _)| self.contains(*tech))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(", "))
    }
}

/// One domain's registration as reported by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistrationReport {
    pub state: RegistrationState,
    pub access_tech: AccessTechnology,
    /// Location area code, 0 when unknown
    pub lac: u32,
    /// Cell ID, 0 when unknown
    pub cell_id: u32,
}

impl RegistrationReport {
    pub fn new(state: RegistrationState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    pub fn with_access_tech(mut self, access_tech: AccessTechnology) -> Self {
        self.access_tech = access_tech;
        self
    }

    pub fn with_location(mut self, lac: u32, cell_id: u32) -> Self {
        self.lac = lac;
        self.cell_id = cell_id;
        self
    }
}

/// Packet-switched or circuit-switched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Cs,
    Ps,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Cs => f.write_str("CS"),
            Domain::Ps => f.write_str("PS"),
        }
    }
}

/// Availability of a network found by a scan, as in `+COPS=?`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum NetworkAvailability {
    #[default]
    Unknown = 0,
    Available = 1,
    Current = 2,
    Forbidden = 3,
}

/// One network found by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkAvailability,
    pub operator_long: Option<String>,
    pub operator_short: Option<String>,
    /// MCC and MNC digits, always present
    pub operator_code: String,
    pub access_tech: AccessTechnology,
}

/// Independently tracked CS and PS registration of one modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationContext {
    cs: RegistrationState,
    ps: RegistrationState,
    cs_supported: bool,
    ps_supported: bool,
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self {
            cs: RegistrationState::Unknown,
            ps: RegistrationState::Unknown,
            cs_supported: true,
            ps_supported: true,
        }
    }
}

impl RegistrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cs(&self) -> RegistrationState {
        self.cs
    }

    pub fn ps(&self) -> RegistrationState {
        self.ps
    }

    pub fn supports(&self, domain: Domain) -> bool {
        match domain {
            Domain::Cs => self.cs_supported,
            Domain::Ps => self.ps_supported,
        }
    }

    pub fn set_supported(&mut self, domain: Domain, supported: bool) {
        match domain {
            Domain::Cs => self.cs_supported = supported,
            Domain::Ps => self.ps_supported = supported,
        }
    }

    /// Forgets both domains' states, keeping which domains are supported
    pub fn reset(&mut self) {
        self.cs = RegistrationState::Unknown;
        self.ps = RegistrationState::Unknown;
    }

    /// Records a domain's state; unsupported domains are ignored
    pub fn update(&mut self, domain: Domain, state: RegistrationState) -> bool {
        if !self.supports(domain) {
            return false;
        }
        match domain {
            Domain::Cs => self.cs = state,
            Domain::Ps => self.ps = state,
        }
        true
    }

    /// The single state reported for the modem
    ///
    /// Some firmware answers `+CGREG` but fails `+CREG`, so a PS
    /// registration is used when CS is not registered.
    pub fn consolidated(&self) -> RegistrationState {
        consolidate(self.cs, self.ps)
    }
}

/// CS registration wins, then PS registration, then searching in either
pub fn consolidate(cs: RegistrationState, ps: RegistrationState) -> RegistrationState {
    if cs.is_registered() {
        cs
    } else if ps.is_registered() {
        ps
    } else if cs == RegistrationState::Searching {
        cs
    } else if ps == RegistrationState::Searching {
        ps
    } else {
        cs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RegistrationState::*;

    #[test]
    fn test_consolidation() {
        assert_eq!(consolidate(Denied, Home), Home);
        assert_eq!(consolidate(Searching, Idle), Searching);
        assert_eq!(consolidate(Unknown, Unknown), Unknown);
        assert_eq!(consolidate(Roaming, Home), Roaming);
        assert_eq!(consolidate(Idle, Searching), Searching);
        assert_eq!(consolidate(Denied, Idle), Denied);
        assert_eq!(consolidate(Searching, Roaming), Roaming);
    }

    #[test]
    fn test_context_ignores_unsupported_domain() {
        let mut context = RegistrationContext::new();
        context.set_supported(Domain::Cs, false);
        assert!(!context.update(Domain::Cs, Home));
        assert!(context.update(Domain::Ps, Searching));
        assert_eq!(context.cs(), Unknown);
        assert_eq!(context.consolidated(), Searching);
    }

    #[test]
    fn test_reset_keeps_support() {
        let mut context = RegistrationContext::new();
        context.set_supported(Domain::Cs, false);
        context.update(Domain::Ps, Home);
        context.reset();
        assert_eq!(context.ps(), Unknown);
        assert_eq!(context.consolidated(), Unknown);
        assert!(!context.supports(Domain::Cs));
    }

    #[test]
    fn test_state_values() {
        assert_eq!(RegistrationState::try_from(5u8).unwrap(), Roaming);
        assert!(RegistrationState::try_from(6u8).is_err());
        assert_eq!(Roaming.to_string(), "roaming");
    }

    #[test]
    fn test_access_technology() {
        assert_eq!(AccessTechnology::LTE.bits(), 1 << 14);
        assert_eq!(AccessTechnology::from_act(7), AccessTechnology::LTE);
        assert_eq!(AccessTechnology::from_act(9), AccessTechnology::UNKNOWN);
        let both = AccessTechnology::GSM | AccessTechnology::UMTS;
        assert!(both.contains(AccessTechnology::UMTS));
        assert_eq!(both.to_string(), "gsm, umts");
        assert_eq!(AccessTechnology::UNKNOWN.to_string(), "unknown");
    }
}
