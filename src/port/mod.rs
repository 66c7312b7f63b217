// ABOUTME: Port layer: serial command channels, AT and QCDM framing, device properties and probing
// ABOUTME: Plugins filter and probe candidate ports to decide which ones a modem is built from

pub mod at;
pub mod device;
pub mod filter;
pub mod plugin;
pub mod probe;
pub mod qcdm;
pub mod serial;

#[cfg(test)]
pub(crate) mod mock;

pub use device::{DeviceIds, DeviceLookup, ParentDevice, PortDevice, device_ids, driver_name};
pub use filter::{PluginConfig, ProbeNeeds};
pub use plugin::{ExistingModem, Plugin, PortOpener, SupportsResult};
pub use probe::{PortProbe, PortType, ProbeCache, ProbeConfig, ProbeFlags, ProbeKey, ProbeState};
pub use serial::{CommandChannel, ResponseProcessor, ResponseStatus, SerialPort};
