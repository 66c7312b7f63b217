// ABOUTME: Plugin configuration and the pre- and post-probing port filters
// ABOUTME: Pre-filters use device properties; post-filters match vendor and product strings found by probing

use super::device::{PortDevice, device_ids};
use super::probe::{PortProbe, ProbeConfig};
use std::time::Duration;

/// Which ports a plugin handles and how they are probed
///
/// Empty lists do not filter. Vendor and product strings are matched as
/// case-folded substrings of what the modem reports.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub name: String,
    pub subsystems: Vec<String>,
    pub drivers: Vec<String>,
    pub vendor_ids: Vec<u16>,
    /// (vendor, product) ID pairs
    pub product_ids: Vec<(u16, u16)>,
    pub vendor_strings: Vec<String>,
    /// (vendor, product) string pairs
    pub product_strings: Vec<(String, String)>,
    pub udev_tags: Vec<String>,
    pub at: bool,
    /// Only one AT port is expected per device
    pub single_at: bool,
    pub qcdm: bool,
    pub send_delay: Duration,
    pub custom_init: Vec<String>,
    pub command_timeout: Duration,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: "generic".to_string(),
            subsystems: Vec::new(),
            drivers: Vec::new(),
            vendor_ids: Vec::new(),
            product_ids: Vec::new(),
            vendor_strings: Vec::new(),
            product_strings: Vec::new(),
            udev_tags: Vec::new(),
            at: false,
            single_at: false,
            qcdm: false,
            send_delay: Duration::from_millis(100),
            custom_init: Vec::new(),
            command_timeout: Duration::from_secs(3),
        }
    }
}

impl PluginConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_subsystems(mut self, subsystems: &[&str]) -> Self {
        self.subsystems = subsystems.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_drivers(mut self, drivers: &[&str]) -> Self {
        self.drivers = drivers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_vendor_ids(mut self, ids: &[u16]) -> Self {
        self.vendor_ids = ids.to_vec();
        self
    }

    pub fn with_product_ids(mut self, ids: &[(u16, u16)]) -> Self {
        self.product_ids = ids.to_vec();
        self
    }

    pub fn with_vendor_strings(mut self, vendors: &[&str]) -> Self {
        self.vendor_strings = vendors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_product_strings(mut self, pairs: &[(&str, &str)]) -> Self {
        self.product_strings = pairs
            .iter()
            .map(|(v, p)| (v.to_string(), p.to_string()))
            .collect();
        self
    }

    pub fn with_udev_tags(mut self, tags: &[&str]) -> Self {
        self.udev_tags = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_at(mut self, at: bool) -> Self {
        self.at = at;
        self
    }

    pub fn with_single_at(mut self, single_at: bool) -> Self {
        self.single_at = single_at;
        self
    }

    pub fn with_qcdm(mut self, qcdm: bool) -> Self {
        self.qcdm = qcdm;
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn with_custom_init(mut self, commands: &[&str]) -> Self {
        self.custom_init = commands.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Plugins relying on probed strings should be tried after the others
    pub fn sort_last(&self) -> bool {
        !self.vendor_strings.is_empty() || !self.product_strings.is_empty()
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig::default()
            .with_command_timeout(self.command_timeout)
            .with_custom_init(self.custom_init.clone())
    }
}

/// Extra identification a port needs before post-filters can decide
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeNeeds {
    pub vendor: bool,
    pub product: bool,
}

/// Filters a port on its device properties; `None` means unsupported
///
/// A device filtered out by its IDs is still probed when string filters
/// are configured, since a serial modem behind a USB adaptor carries the
/// adaptor's IDs.
pub fn apply_pre_probing_filters(
    config: &PluginConfig,
    device: &PortDevice,
    driver: &str,
) -> Option<ProbeNeeds> {
    if !config.subsystems.is_empty() && !config.subsystems.iter().any(|s| *s == device.subsystem) {
        return None;
    }
    if !config.drivers.is_empty() && !config.drivers.iter().any(|d| d == driver) {
        return None;
    }

    let ids = device_ids(device);
    let vendor_filtered = !config.vendor_ids.is_empty()
        && !ids.is_some_and(|ids| ids.vendor != 0 && config.vendor_ids.contains(&ids.vendor));
    let product_filtered = !config.product_ids.is_empty()
        && !ids.is_some_and(|ids| {
            ids.product != 0 && config.product_ids.contains(&(ids.vendor, ids.product))
        });

    if (vendor_filtered || product_filtered)
        && config.vendor_strings.is_empty()
        && config.product_strings.is_empty()
    {
        return None;
    }

    let needs = if !config.product_strings.is_empty() {
        ProbeNeeds {
            vendor: true,
            product: true,
        }
    } else {
        ProbeNeeds {
            vendor: !config.vendor_strings.is_empty(),
            product: false,
        }
    };

    if !config.udev_tags.is_empty() && !config.udev_tags.iter().any(|t| device.property_as_bool(t)) {
        return None;
    }
    Some(needs)
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.contains(&needle.to_lowercase())
}

/// Filters a probed port on its vendor and product strings; true rejects it
pub fn apply_post_probing_filters(config: &PluginConfig, probe: &PortProbe) -> bool {
    let vendor = probe.vendor();

    if !config.vendor_strings.is_empty() {
        let matched = vendor
            .as_deref()
            .is_some_and(|v| config.vendor_strings.iter().any(|s| contains_folded(v, s)));
        if matched {
            return false;
        }
        if config.product_strings.is_empty() {
            return true;
        }
    }

    if !config.product_strings.is_empty() {
        let product = probe.product();
        return match (vendor.as_deref(), product.as_deref()) {
            (Some(v), Some(p)) => !config
                .product_strings
                .iter()
                .any(|(sv, sp)| contains_folded(v, sv) && contains_folded(p, sp)),
            _ => true,
        };
    }
    false
}
