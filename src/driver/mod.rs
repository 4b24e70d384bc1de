//! Boundary traits over the discovery/connection SDK
//!
//! The directory and controller only ever see these traits; the production
//! implementations ([`MdnsDiscovery`], [`ChromecastConnection`]) live next
//! to them, and tests substitute the fakes from [`crate::testing`].

mod chromecast;
mod mdns;

pub use chromecast::ChromecastConnection;
pub use mdns::MdnsDiscovery;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CastError;
use crate::types::{DeviceHost, MediaDescriptor, PlayerState};

/// Discovers playback devices and opens connections to them
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Scan the local network for playback devices
    ///
    /// Blocks for up to `timeout` and returns every host seen in that
    /// window. An empty result is not an error at this level; the directory
    /// decides what an empty scan means.
    ///
    /// # Errors
    ///
    /// Returns an error when the discovery transport itself fails.
    async fn discover(&self, timeout: Duration) -> Result<Vec<DeviceHost>, CastError>;

    /// Open a connection to a host, blocking until the device reports ready
    ///
    /// # Errors
    ///
    /// Returns [`CastError::ConnectionFailed`] when the device cannot be
    /// reached or never becomes ready.
    async fn connect(&self, host: &DeviceHost) -> Result<Arc<dyn CastConnection>, CastError>;
}

/// A live connection to a single playback device
#[async_trait]
pub trait CastConnection: Send + Sync {
    /// Friendly name of the connected device
    fn device_name(&self) -> &str;

    /// Load the media and start playback
    ///
    /// Returns once the receiver has acknowledged the load and created a
    /// media session; that acknowledgement is the playback-start
    /// confirmation (bounded by the driver's own request round-trip).
    ///
    /// # Errors
    ///
    /// Returns [`CastError::PlaybackFailed`] when the load is rejected.
    async fn play(&self, media: &MediaDescriptor) -> Result<(), CastError>;

    /// Stop the current media session
    ///
    /// # Errors
    ///
    /// Returns [`CastError::ControllerNotRegistered`] when no media session
    /// was ever established on this connection.
    async fn stop(&self) -> Result<(), CastError>;

    /// Close the receiver application launched for this session
    ///
    /// # Errors
    ///
    /// Returns [`CastError::ControllerNotRegistered`] when no application
    /// was ever launched on this connection.
    async fn quit_app(&self) -> Result<(), CastError>;

    /// Set the device volume (0.0 - 1.0)
    ///
    /// # Errors
    ///
    /// Returns an error when the device rejects the command.
    async fn set_volume(&self, level: f32) -> Result<(), CastError>;

    /// Read the current player state from the device
    ///
    /// # Errors
    ///
    /// Returns an error when the status cannot be fetched; callers polling
    /// for status treat that as [`PlayerState::Unknown`].
    async fn player_state(&self) -> Result<PlayerState, CastError>;

    /// Drop the connection without touching playback
    ///
    /// # Errors
    ///
    /// Returns an error when tearing down the transport fails.
    async fn disconnect(&self) -> Result<(), CastError>;
}

impl std::fmt::Debug for dyn CastConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CastConnection")
            .field("device_name", &self.device_name())
            .finish()
    }
}
