//! Testing utilities
//!
//! Fake discovery and connection implementations that record every call,
//! so the directory and controller can be unit tested without a network.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{CastConnection, Discovery};
use crate::error::CastError;
use crate::types::{DeviceHost, MediaDescriptor, PlayerState};

/// Build a `DeviceHost` for tests
#[must_use]
pub fn test_host(name: &str) -> DeviceHost {
    DeviceHost::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40)), 8009, name)
}

/// Scripted discovery backend
///
/// Scan results can be queued with [`FakeDiscovery::push_scan`]; once the
/// queue is empty every scan returns the fallback set. Connections are
/// handed out per friendly name and kept so tests can assert on them.
#[derive(Default)]
pub struct FakeDiscovery {
    scripted: Mutex<VecDeque<Vec<DeviceHost>>>,
    fallback: Mutex<Vec<DeviceHost>>,
    connections: Mutex<HashMap<String, Arc<FakeConnection>>>,
    discover_calls: AtomicUsize,
    connect_calls: AtomicUsize,
    refuse_connections: Mutex<bool>,
}

impl FakeDiscovery {
    /// Create a discovery backend that finds nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a discovery backend whose every scan returns `hosts`
    #[must_use]
    pub fn with_hosts(hosts: Vec<DeviceHost>) -> Self {
        let fake = Self::default();
        *fake.fallback.lock().unwrap() = hosts;
        fake
    }

    /// Queue the result for the next scan
    pub fn push_scan(&self, hosts: Vec<DeviceHost>) {
        self.scripted.lock().unwrap().push_back(hosts);
    }

    /// Make every subsequent connect attempt fail
    pub fn refuse_connections(&self) {
        *self.refuse_connections.lock().unwrap() = true;
    }

    /// Number of scans performed
    #[must_use]
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    /// Number of connections opened
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// The connection handed out for `name`, creating it if needed
    ///
    /// Useful for seeding expectations before the code under test connects.
    #[must_use]
    pub fn connection_for(&self, name: &str) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(FakeConnection::new(name)))
            .clone()
    }
}

#[async_trait]
impl Discovery for FakeDiscovery {
    async fn discover(&self, _timeout: Duration) -> Result<Vec<DeviceHost>, CastError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.scripted.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(self.fallback.lock().unwrap().clone())
    }

    async fn connect(&self, host: &DeviceHost) -> Result<Arc<dyn CastConnection>, CastError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if *self.refuse_connections.lock().unwrap() {
            return Err(CastError::ConnectionFailed {
                device_name: host.friendly_name.clone(),
                message: "refused by test".to_string(),
            });
        }
        Ok(self.connection_for(&host.friendly_name))
    }
}

/// Recording fake for a device connection
pub struct FakeConnection {
    name: String,
    play_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    quit_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    volumes: Mutex<Vec<f32>>,
    played: Mutex<Vec<MediaDescriptor>>,
    player_state: Mutex<PlayerState>,
    stop_error: Mutex<Option<CastError>>,
}

impl FakeConnection {
    /// Create a fake connection for a device name
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            play_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            quit_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            volumes: Mutex::new(Vec::new()),
            played: Mutex::new(Vec::new()),
            player_state: Mutex::new(PlayerState::Playing),
            stop_error: Mutex::new(None),
        }
    }

    /// Number of `play` calls
    #[must_use]
    pub fn play_calls(&self) -> usize {
        self.play_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls
    #[must_use]
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Number of `quit_app` calls
    #[must_use]
    pub fn quit_calls(&self) -> usize {
        self.quit_calls.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Volume levels applied, in order
    #[must_use]
    pub fn volumes(&self) -> Vec<f32> {
        self.volumes.lock().unwrap().clone()
    }

    /// Media descriptors played, in order
    #[must_use]
    pub fn played(&self) -> Vec<MediaDescriptor> {
        self.played.lock().unwrap().clone()
    }

    /// Set the player state returned by status polls
    pub fn set_player_state(&self, state: PlayerState) {
        *self.player_state.lock().unwrap() = state;
    }

    /// Make the next `stop` call fail as an unregistered app session
    pub fn fail_next_stop(&self) {
        *self.stop_error.lock().unwrap() = Some(CastError::ControllerNotRegistered {
            device_name: self.name.clone(),
            command: "stop",
        });
    }
}

#[async_trait]
impl CastConnection for FakeConnection {
    fn device_name(&self) -> &str {
        &self.name
    }

    async fn play(&self, media: &MediaDescriptor) -> Result<(), CastError> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        self.played.lock().unwrap().push(media.clone());
        Ok(())
    }

    async fn stop(&self) -> Result<(), CastError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        match self.stop_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn quit_app(&self) -> Result<(), CastError> {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, level: f32) -> Result<(), CastError> {
        self.volumes.lock().unwrap().push(level);
        Ok(())
    }

    async fn player_state(&self) -> Result<PlayerState, CastError> {
        Ok(*self.player_state.lock().unwrap())
    }

    async fn disconnect(&self) -> Result<(), CastError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
