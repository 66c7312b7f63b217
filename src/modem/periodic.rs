// ABOUTME: Periodic registration re-checks for modems without unsolicited registration reports
// ABOUTME: A timer task runs one check at a time; ticks arriving while a check is in flight are skipped

use crate::error::ModemResult;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Configuration for periodic registration checks
///
/// # Example
///
/// ```rust
/// use modemcore::modem::RegistrationCheckConfig;
/// use std::time::Duration;
///
/// let config = RegistrationCheckConfig::default();
/// assert_eq!(config.interval, Duration::from_secs(30));
///
/// let config = RegistrationCheckConfig::new(Duration::from_secs(10));
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone)]
pub struct RegistrationCheckConfig {
    /// Time between checks (default: 30 seconds)
    pub interval: Duration,
    /// When false, polling is never started (default: true)
    pub enabled: bool,
}

impl Default for RegistrationCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            enabled: true,
        }
    }
}

impl RegistrationCheckConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

type CheckFuture = Pin<Box<dyn Future<Output = ModemResult<()>> + Send>>;

async fn poll_check(check: &mut Option<CheckFuture>) -> ModemResult<()> {
    match check {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

/// Owns the polling task of one modem
#[derive(Debug)]
pub struct PeriodicRegistrationCheck {
    config: RegistrationCheckConfig,
    task: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl PeriodicRegistrationCheck {
    pub fn new(config: RegistrationCheckConfig) -> Self {
        Self {
            config,
            task: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &RegistrationCheckConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.task.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Whether a check is currently in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts polling with `check`; does nothing if already polling
    pub fn enable<F, Fut>(&self, check: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ModemResult<()>> + Send + 'static,
    {
        if !self.config.enabled {
            return;
        }
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.is_some() {
            return;
        }
        debug!("Periodic 3GPP registration checks enabled");

        let period = self.config.interval;
        let running = self.running.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight: Option<CheckFuture> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if in_flight.is_some() {
                            debug!("Registration check still running, skipping tick");
                        } else {
                            running.store(true, Ordering::SeqCst);
                            in_flight = Some(Box::pin(check()));
                        }
                    }
                    result = poll_check(&mut in_flight), if in_flight.is_some() => {
                        in_flight = None;
                        running.store(false, Ordering::SeqCst);
                        if let Err(err) = result {
                            debug!("Couldn't refresh 3GPP registration status: '{}'", err);
                        }
                    }
                }
            }
        }));
    }

    /// Stops polling, abandoning any check in flight
    pub fn disable(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
            self.running.store(false, Ordering::SeqCst);
            debug!("Periodic 3GPP registration checks disabled");
        }
    }
}

impl Drop for PeriodicRegistrationCheck {
    fn drop(&mut self) {
        self.disable();
    }
}
