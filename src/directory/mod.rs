//! Device directory and rescan supervisor
//!
//! Keeps a cached list of reachable playback devices, refreshed on a timer
//! and on demand, and resolves a friendly name to a live connection.


use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::controller::ControlEvent;
use crate::driver::{CastConnection, Discovery};
use crate::error::CastError;
use crate::types::{BridgeConfig, DeviceHost};

/// Process-wide cache of discovered device hosts plus the timer that keeps
/// it fresh
///
/// The cache is replaced wholesale by every scan. The supervisor arms
/// exactly one timer at a time; when it fires it pushes
/// [`ControlEvent::RescanDue`] onto the control channel, and the loop calls
/// [`DeviceDirectory::scan`] again, which re-arms.
pub struct DeviceDirectory {
    discovery: Arc<dyn Discovery>,
    hosts: RwLock<Vec<DeviceHost>>,
    rescan_timer: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::Sender<ControlEvent>,
    scan_timeout: Duration,
    rescan_interval: Duration,
}

impl DeviceDirectory {
    /// Create a directory with an empty cache
    #[must_use]
    pub fn new(
        discovery: Arc<dyn Discovery>,
        events: mpsc::Sender<ControlEvent>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            discovery,
            hosts: RwLock::new(Vec::new()),
            rescan_timer: Mutex::new(None),
            events,
            scan_timeout: config.scan_timeout,
            rescan_interval: config.rescan_interval,
        }
    }

    /// Scan for device hosts, replacing the cache wholesale
    ///
    /// Returns whether at least one host was found. An empty scan logs an
    /// error and reports a fatal error on the control channel, but the next
    /// periodic scan is still scheduled; the supervisor never dies from one
    /// empty scan. Any previously armed timer is cancelled first so
    /// scanners cannot overlap.
    ///
    /// # Errors
    ///
    /// Propagates discovery transport failures; the next scan is scheduled
    /// even then.
    pub async fn scan(&self) -> Result<bool, CastError> {
        self.cancel_scanner();

        debug!("Scanning for device hosts...");
        let started = Instant::now();

        let result = self.discovery.discover(self.scan_timeout).await;
        let elapsed = started.elapsed();

        // The next scan is scheduled no matter how this one went.
        self.arm_rescan_timer();

        let hosts = match result {
            Ok(hosts) => hosts,
            Err(e) => {
                error!("Device host scan failed after {:.1?}: {e}", elapsed);
                return Err(e);
            }
        };

        let found = !hosts.is_empty();
        let count = hosts.len();
        *self.hosts.write().await = hosts;

        if found {
            info!(
                "Device scan completed with {count} device(s) found after {:.1?}. \
                 Next scan in {:?}.",
                elapsed, self.rescan_interval
            );
        } else {
            error!(
                "Device host scan completed with no hosts found after {:.1?}. \
                 Next scan in {:?}.",
                elapsed, self.rescan_interval
            );
            let _ = self
                .events
                .send(ControlEvent::FatalError {
                    message: "device host scan completed with no device(s) found".to_string(),
                })
                .await;
        }

        Ok(found)
    }

    /// Cancel the pending rescan timer, if any
    ///
    /// Safe to call repeatedly or when no timer is armed.
    pub fn cancel_scanner(&self) {
        if let Ok(mut slot) = self.rescan_timer.lock() {
            if let Some(timer) = slot.take() {
                timer.abort();
            }
        }
    }

    /// Whether a rescan timer is currently armed
    #[must_use]
    pub fn scanner_armed(&self) -> bool {
        self.rescan_timer
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    /// Resolve a friendly name to a live device connection
    ///
    /// Looks up the name in the cache by exact match. On a miss, triggers
    /// exactly one rescan and retries the lookup once; the retry is a
    /// bounded loop, so resolution can never recurse. On a hit, connects
    /// and blocks until the device reports ready.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::DeviceNotFound`] after the second miss, or the
    /// connection/scan error encountered along the way.
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn CastConnection>, CastError> {
        debug!("Getting device \"{name}\"");

        for attempt in 0..2 {
            if let Some(host) = self.lookup(name).await {
                debug!("Device \"{name}\" found, connecting...");
                let connection = self.discovery.connect(&host).await?;
                debug!("Connected to \"{name}\"");
                return Ok(connection);
            }

            if attempt == 0 {
                warn!("Device \"{name}\" not found - triggering new device scan");
                self.scan().await?;
            }
        }

        warn!("Device \"{name}\" not found (tried scanning anew)");
        Err(CastError::DeviceNotFound {
            device_name: name.to_string(),
        })
    }

    /// Current cache contents
    pub async fn snapshot(&self) -> Vec<DeviceHost> {
        self.hosts.read().await.clone()
    }

    async fn lookup(&self, name: &str) -> Option<DeviceHost> {
        self.hosts
            .read()
            .await
            .iter()
            .find(|host| host.friendly_name == name)
            .cloned()
    }

    fn arm_rescan_timer(&self) {
        let events = self.events.clone();
        let interval = self.rescan_interval;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = events.send(ControlEvent::RescanDue).await;
        });

        if let Ok(mut slot) = self.rescan_timer.lock() {
            if let Some(previous) = slot.replace(timer) {
                previous.abort();
            }
        }
    }
}

impl Drop for DeviceDirectory {
    fn drop(&mut self) {
        self.cancel_scanner();
    }
}
