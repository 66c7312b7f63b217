// ABOUTME: Device property source consumed by port probing: udev-style port and parent attributes
// ABOUTME: Resolves vendor/product IDs and driver names with bluetooth, pcmcia and platform special cases

use std::collections::HashMap;
use std::path::Path;

/// Ports reachable without a USB/serial driver of their own
const VIRTUAL_PORTS: [&str; 1] = ["smd0"];

/// The parent of a port device, as far as probing cares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentDevice {
    pub subsystem: Option<String>,
    pub driver: Option<String>,
    /// sysfs attributes, e.g. `manf_id` and `card_id` for PCMCIA cards
    pub attributes: HashMap<String, String>,
}

/// A port device as reported by the device property source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortDevice {
    pub subsystem: String,
    pub name: String,
    pub driver: Option<String>,
    pub physdev_path: String,
    /// udev properties, including `ID_VENDOR_ID`, `ID_MODEL_ID` and tags
    pub properties: HashMap<String, String>,
    pub parent: Option<ParentDevice>,
}

impl PortDevice {
    pub fn new(subsystem: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn with_physdev(mut self, path: impl Into<String>) -> Self {
        self.physdev_path = path.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: ParentDevice) -> Self {
        self.parent = Some(parent);
        self
    }

    fn parent_subsystem(&self) -> Option<&str> {
        self.parent.as_ref()?.subsystem.as_deref()
    }

    /// Interprets a udev property as a boolean flag, as udev tags are set
    pub fn property_as_bool(&self, key: &str) -> bool {
        matches!(
            self.properties.get(key).map(String::as_str),
            Some("1") | Some("true") | Some("yes")
        )
    }
}

/// USB (or PCMCIA) vendor and product IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIds {
    pub vendor: u16,
    pub product: u16,
}

/// Source of device properties, typically backed by udev
pub trait DeviceLookup: Send + Sync {
    fn lookup_device(&self, subsystem: &str, name: &str) -> Option<PortDevice>;

    /// Whether `/dev/<name>` exists
    fn device_node_exists(&self, name: &str) -> bool {
        Path::new("/dev").join(name).exists()
    }
}

fn parse_hex_id(value: &str) -> Option<u16> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.len() != 4 {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// Resolves the vendor and product IDs of a port
///
/// Bluetooth parents report the adapter's IDs and platform devices have
/// none, so both yield `None`. PCMCIA cards use the parent's `manf_id` and
/// `card_id`. A vendor without a valid product counts as no IDs.
pub fn device_ids(device: &PortDevice) -> Option<DeviceIds> {
    let (vendor, product) = match device.parent_subsystem() {
        Some("bluetooth") | Some("platform") => return None,
        Some("pcmcia") => {
            let attributes = &device.parent.as_ref()?.attributes;
            (attributes.get("manf_id")?, attributes.get("card_id")?)
        }
        _ => (
            device.properties.get("ID_VENDOR_ID")?,
            device.properties.get("ID_MODEL_ID")?,
        ),
    };
    Some(DeviceIds {
        vendor: parse_hex_id(vendor)?,
        product: parse_hex_id(product)?,
    })
}

/// Resolves the kernel driver name of a port
///
/// Falls back to the parent's driver; bluetooth ports sit several levels
/// below their driver so a bluetooth parent is enough to call it
/// `bluetooth`. Known virtual ports report `virtual` when their node exists.
pub fn driver_name<L: DeviceLookup + ?Sized>(lookup: &L, device: &PortDevice) -> Option<String> {
    if VIRTUAL_PORTS.contains(&device.name.as_str()) && lookup.device_node_exists(&device.name) {
        return Some("virtual".to_string());
    }
    if let Some(driver) = &device.driver {
        return Some(driver.clone());
    }
    let parent = device.parent.as_ref()?;
    if let Some(driver) = &parent.driver {
        return Some(driver.clone());
    }
    (parent.subsystem.as_deref() == Some("bluetooth")).then(|| "bluetooth".to_string())
}
