// ABOUTME: Modem side: lifecycle state, CS/PS registration tracking, the 3GPP interface and bearers
// ABOUTME: AT-based implementations of the capability traits live next to the traits they implement

pub mod at;
pub mod bearer;
pub mod iface_3gpp;
pub mod lifecycle;
pub mod messaging;
pub mod periodic;
pub mod registration;
pub mod sink;
pub mod state;

pub use at::{AtModem3gpp, is_unsolicited_registration, parse_network_scan, parse_operator, parse_registration};
pub use bearer::{AtBearer, Bearer, BearerProperties, BearerStatus, ManagedBearer};
pub use iface_3gpp::{
    DisablingStep, EnablingStep, FacilityLocks, Iface3gpp, InitializationStep, Modem3gpp, RegistrationReports,
    parse_mcc_mnc,
};
pub use lifecycle::Modem;
pub use messaging::Messaging;
pub use periodic::{PeriodicRegistrationCheck, RegistrationCheckConfig};
pub use registration::{
    AccessTechnology, Domain, NetworkAvailability, NetworkInfo, RegistrationContext, RegistrationReport,
    RegistrationState, consolidate,
};
pub use sink::{Location, ModemStateSink, ModemStatus, OperatorInfo, RegistrationUpdate};
pub use state::{ModemState, ModemStateMachine, StateChangeReason};
