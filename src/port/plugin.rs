// ABOUTME: Plugin port support: decides whether a plugin handles a port by filtering and probing it
// ABOUTME: Keeps the in-flight probe table and cancels sibling AT probing when one AT port is expected

use super::device::{DeviceLookup, PortDevice, driver_name};
use super::filter::{PluginConfig, apply_post_probing_filters, apply_pre_probing_filters};
use super::probe::{PortProbe, ProbeCache, ProbeFlags, ProbeKey};
use super::serial::CommandChannel;
use crate::error::{ModemError, ModemResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Outcome of asking a plugin about a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportsResult {
    Supported,
    Unsupported,
    /// Net ports wait until another port of the device was claimed
    DeferUntilSuggested,
}

/// The modem already built from sibling ports, if any
pub trait ExistingModem: Send + Sync {
    fn has_at_port(&self) -> bool;
}

/// Opens the command channel used to probe a port
pub trait PortOpener: Send + Sync {
    type Channel: CommandChannel;

    fn open(
        &self,
        device: &PortDevice,
        send_delay: Duration,
    ) -> impl Future<Output = ModemResult<Self::Channel>> + Send;
}

/// A modem plugin driving port filtering and probing
pub struct Plugin<L, O> {
    config: PluginConfig,
    lookup: L,
    opener: O,
    cache: Arc<ProbeCache>,
    tasks: Mutex<HashMap<ProbeKey, Arc<PortProbe>>>,
}

impl<L, O> Plugin<L, O>
where
    L: DeviceLookup,
    O: PortOpener,
{
    pub fn new(config: PluginConfig, lookup: L, opener: O) -> Self {
        Self::with_cache(config, lookup, opener, Arc::new(ProbeCache::new()))
    }

    /// Shares probe results with other plugins through `cache`
    pub fn with_cache(config: PluginConfig, lookup: L, opener: O, cache: Arc<ProbeCache>) -> Self {
        Self {
            config,
            lookup,
            opener,
            cache,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn sort_last(&self) -> bool {
        self.config.sort_last()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<ProbeKey, Arc<PortProbe>>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Number of probes running or awaiting `grab_port`
    pub fn pending_tasks(&self) -> usize {
        self.tasks().len()
    }

    fn run_flags(&self, needs_vendor: bool, needs_product: bool) -> ProbeFlags {
        let mut flags = ProbeFlags::NONE;
        if self.config.at || self.config.single_at {
            flags |= ProbeFlags::AT;
        }
        if needs_vendor {
            flags |= ProbeFlags::AT | ProbeFlags::AT_VENDOR;
        }
        if needs_product {
            flags |= ProbeFlags::AT | ProbeFlags::AT_PRODUCT;
        }
        if self.config.qcdm {
            flags |= ProbeFlags::QCDM;
        }
        flags
    }

    /// Decides whether this plugin supports the port `subsystem/name`
    ///
    /// Supported probes stay in the task table until [`Plugin::grab_port`].
    /// Probing errors drop the probe and are returned to the caller.
    pub async fn supports_port(
        &self,
        subsystem: &str,
        name: &str,
        existing: Option<&dyn ExistingModem>,
    ) -> ModemResult<SupportsResult> {
        let device = self.lookup.lookup_device(subsystem, name).ok_or_else(|| {
            ModemError::PortLookupFailed {
                subsystem: subsystem.to_string(),
                name: name.to_string(),
            }
        })?;
        let driver = driver_name(&self.lookup, &device).ok_or_else(|| ModemError::DriverLookupFailed {
            subsystem: subsystem.to_string(),
            name: name.to_string(),
        })?;

        let Some(needs) = apply_pre_probing_filters(&self.config, &device, &driver) else {
            return Ok(SupportsResult::Unsupported);
        };

        debug!("({}) checking port support ({},{})", self.config.name, subsystem, name);
        let key = ProbeKey::new(subsystem, name);
        let probe = self
            .tasks()
            .entry(key.clone())
            .or_insert_with(|| self.cache.get_or_create(&device, &driver))
            .clone();

        if subsystem == "net" {
            return Ok(match existing {
                Some(_) => SupportsResult::Supported,
                None => SupportsResult::DeferUntilSuggested,
            });
        }

        let flags = self.run_flags(needs.vendor, needs.product);
        if self.config.single_at && existing.is_some_and(|modem| modem.has_at_port()) {
            debug!(
                "({}) modem already has its single AT port, ({},{}) is not AT",
                self.config.name, subsystem, name
            );
            probe.set_result_at(false);
        }

        debug!("({}) launching probe for ({},{})", self.config.name, subsystem, name);
        match self.run_probe(&probe, flags).await {
            Ok(()) => {}
            Err(err) => {
                self.tasks().remove(&key);
                return Err(err);
            }
        }

        if apply_post_probing_filters(&self.config, &probe) {
            self.tasks().remove(&key);
            return Ok(SupportsResult::Unsupported);
        }

        if self.config.single_at && flags.contains(ProbeFlags::AT) && probe.is_at() {
            self.cancel_sibling_at_probing(&probe);
        }
        Ok(SupportsResult::Supported)
    }

    async fn run_probe(&self, probe: &PortProbe, flags: ProbeFlags) -> ModemResult<()> {
        if flags.is_empty() {
            return Ok(());
        }
        let channel = self.opener.open(probe.device(), self.config.send_delay).await?;
        probe.run(flags, &channel, &self.config.probe_config()).await
    }

    fn cancel_sibling_at_probing(&self, probe: &PortProbe) {
        for other in self.tasks().values() {
            if other.key() != probe.key() && other.physdev() == probe.physdev() {
                other.cancel_at_probing();
            }
        }
    }

    /// Abandons the support check of a port
    pub fn supports_port_cancel(&self, subsystem: &str, name: &str) {
        if let Some(probe) = self.tasks().remove(&ProbeKey::new(subsystem, name)) {
            probe.cancel();
        }
    }

    /// Hands a supported port's probe over to the modem
    pub fn grab_port(&self, subsystem: &str, name: &str) -> ModemResult<Arc<PortProbe>> {
        self.tasks()
            .remove(&ProbeKey::new(subsystem, name))
            .ok_or_else(|| ModemError::PortLookupFailed {
                subsystem: subsystem.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{Reply, ScriptedChannel};
    use crate::port::probe::{PortType, ProbeState};

    const PHYSDEV: &str = "/sys/devices/pci0000:00/usb2/2-1";

    struct Devices(Vec<PortDevice>);

    impl DeviceLookup for Devices {
        fn lookup_device(&self, subsystem: &str, name: &str) -> Option<PortDevice> {
            self.0
                .iter()
                .find(|d| d.subsystem == subsystem && d.name == name)
                .cloned()
        }
    }

    #[derive(Default)]
    struct Channels(HashMap<String, Arc<ScriptedChannel>>, std::sync::Mutex<Vec<Duration>>);

    impl Channels {
        fn with(mut self, name: &str, channel: ScriptedChannel) -> Self {
            self.0.insert(name.to_string(), Arc::new(channel));
            self
        }

        fn send_delays(&self) -> Vec<Duration> {
            self.1.lock().unwrap().clone()
        }

        fn sent(&self, name: &str) -> Vec<String> {
            self.0[name].sent()
        }
    }

    impl PortOpener for &Channels {
        type Channel = Arc<ScriptedChannel>;

        async fn open(&self, device: &PortDevice, send_delay: Duration) -> ModemResult<Self::Channel> {
            self.1.lock().unwrap().push(send_delay);
            self.0.get(&device.name).cloned().ok_or_else(|| ModemError::PortLookupFailed {
                subsystem: device.subsystem.clone(),
                name: device.name.clone(),
            })
        }
    }

    struct Modem {
        at: bool,
    }

    impl ExistingModem for Modem {
        fn has_at_port(&self) -> bool {
            self.at
        }
    }

    fn tty(name: &str) -> PortDevice {
        PortDevice::new("tty", name)
            .with_driver("option1")
            .with_physdev(PHYSDEV)
            .with_property("ID_VENDOR_ID", "12d1")
            .with_property("ID_MODEL_ID", "1001")
    }

    fn devices() -> Devices {
        Devices(vec![
            tty("ttyUSB0"),
            tty("ttyUSB1"),
            PortDevice::new("net", "wwan0").with_driver("qmi_wwan").with_physdev(PHYSDEV),
        ])
    }

    fn config() -> PluginConfig {
        PluginConfig::new("generic")
            .with_at(true)
            .with_send_delay(Duration::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_delay_reaches_opener() {
        let channels = Channels::default().with("ttyUSB0", ScriptedChannel::new().on("AT", Reply::ok()));
        let config = config().with_send_delay(Duration::from_millis(50));
        let plugin = Plugin::new(config, devices(), &channels);
        plugin.supports_port("tty", "ttyUSB0", None).await.unwrap();
        assert_eq!(channels.send_delays(), vec![Duration::from_millis(50)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_port_supported_then_grabbed() {
        let channels = Channels::default().with("ttyUSB0", ScriptedChannel::new().on("AT", Reply::ok()));
        let plugin = Plugin::new(config(), devices(), &channels);

        let result = plugin.supports_port("tty", "ttyUSB0", None).await.unwrap();
        assert_eq!(result, SupportsResult::Supported);
        assert_eq!(plugin.pending_tasks(), 1);

        let probe = plugin.grab_port("tty", "ttyUSB0").unwrap();
        assert_eq!(probe.port_type(), PortType::At);
        assert_eq!(plugin.pending_tasks(), 0);
        assert!(plugin.grab_port("tty", "ttyUSB0").is_err());
    }

    #[tokio::test]
    async fn test_lookup_failures() {
        let channels = Channels::default();
        let plugin = Plugin::new(config(), devices(), &channels);
        let err = plugin.supports_port("tty", "ttyACM9", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Couldn't find port for (tty/ttyACM9)");

        let plugin = Plugin::new(
            config(),
            Devices(vec![PortDevice::new("tty", "ttyS0")]),
            &channels,
        );
        let err = plugin.supports_port("tty", "ttyS0", None).await.unwrap_err();
        assert!(matches!(err, ModemError::DriverLookupFailed { .. }));
    }

    #[tokio::test]
    async fn test_pre_filtered_port_is_not_probed() {
        let channels = Channels::default().with("ttyUSB0", ScriptedChannel::new().on("AT", Reply::ok()));
        let plugin = Plugin::new(config().with_vendor_ids(&[0x19d2]), devices(), &channels);
        let result = plugin.supports_port("tty", "ttyUSB0", None).await.unwrap();
        assert_eq!(result, SupportsResult::Unsupported);
        assert!(channels.sent("ttyUSB0").is_empty());
        assert_eq!(plugin.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn test_net_port_deferred_without_modem() {
        let channels = Channels::default();
        let plugin = Plugin::new(config(), devices(), &channels);
        assert_eq!(
            plugin.supports_port("net", "wwan0", None).await.unwrap(),
            SupportsResult::DeferUntilSuggested
        );
        let modem = Modem { at: true };
        assert_eq!(
            plugin.supports_port("net", "wwan0", Some(&modem)).await.unwrap(),
            SupportsResult::Supported
        );
        assert_eq!(plugin.grab_port("net", "wwan0").unwrap().port_type(), PortType::Net);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vendor_string_rejects_after_probing() {
        let channel = ScriptedChannel::new()
            .on("AT", Reply::ok())
            .on("AT+CGMI", Reply::text("\r\nhuawei\r\n\r\nOK\r\n"));
        let channels = Channels::default().with("ttyUSB0", channel);
        let plugin = Plugin::new(config().with_vendor_strings(&["zte"]), devices(), &channels);
        assert!(plugin.sort_last());

        let result = plugin.supports_port("tty", "ttyUSB0", None).await.unwrap();
        assert_eq!(result, SupportsResult::Unsupported);
        assert_eq!(channels.sent("ttyUSB0"), vec!["AT", "AT+CGMI"]);
        assert_eq!(plugin.pending_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_drops_task() {
        let channels = Channels::default().with("ttyUSB0", ScriptedChannel::new().on("AT", Reply::IoError));
        let plugin = Plugin::new(config(), devices(), &channels);
        assert!(plugin.supports_port("tty", "ttyUSB0", None).await.is_err());
        assert_eq!(plugin.pending_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_at_cancels_sibling_probing() {
        let channels = Channels::default()
            .with("ttyUSB0", ScriptedChannel::new().on("AT", Reply::ok_after(Duration::from_secs(1))))
            .with("ttyUSB1", ScriptedChannel::new());
        let plugin = Plugin::new(config().with_single_at(true), devices(), &channels);

        let (a, b) = tokio::join!(
            plugin.supports_port("tty", "ttyUSB0", None),
            plugin.supports_port("tty", "ttyUSB1", None),
        );
        assert_eq!(a.unwrap(), SupportsResult::Supported);
        assert_eq!(b.unwrap(), SupportsResult::Supported);

        // one AT attempt, abandoned once the sibling answered
        assert_eq!(channels.sent("ttyUSB1"), vec!["AT"]);
        let sibling = plugin.grab_port("tty", "ttyUSB1").unwrap();
        assert!(!sibling.is_at());
        assert_eq!(sibling.state(), ProbeState::Resolved);
        assert_eq!(sibling.port_type(), PortType::Ignored);
        assert!(plugin.grab_port("tty", "ttyUSB0").unwrap().is_at());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_at_with_existing_modem_skips_at() {
        let channels = Channels::default().with("ttyUSB1", ScriptedChannel::new().on("AT", Reply::ok()));
        let plugin = Plugin::new(config().with_single_at(true), devices(), &channels);
        let modem = Modem { at: true };
        let result = plugin.supports_port("tty", "ttyUSB1", Some(&modem)).await.unwrap();
        assert_eq!(result, SupportsResult::Supported);
        assert!(channels.sent("ttyUSB1").is_empty());
        assert!(!plugin.grab_port("tty", "ttyUSB1").unwrap().is_at());
    }

    #[tokio::test(start_paused = true)]
    async fn test_supports_port_cancel() {
        let channels = Channels::default().with("ttyUSB0", ScriptedChannel::new());
        let plugin = Plugin::new(config(), devices(), &channels);
        let canceller = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            plugin.supports_port_cancel("tty", "ttyUSB0");
        };
        let (result, _) = tokio::join!(plugin.supports_port("tty", "ttyUSB0", None), canceller);
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(plugin.pending_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_cache_reuses_results() {
        let cache = Arc::new(ProbeCache::new());
        let channels = Channels::default().with("ttyUSB0", ScriptedChannel::new().on("AT", Reply::ok()));
        let first = Plugin::with_cache(config(), devices(), &channels, cache.clone());
        let second = Plugin::with_cache(config(), devices(), &channels, cache.clone());

        first.supports_port("tty", "ttyUSB0", None).await.unwrap();
        second.supports_port("tty", "ttyUSB0", None).await.unwrap();
        assert_eq!(channels.sent("ttyUSB0"), vec!["AT"]);
        assert_eq!(cache.len(), 1);
    }
}
