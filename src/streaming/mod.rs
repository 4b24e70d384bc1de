//! Streaming-service playback
//!
//! Media urls carrying a service URI (`spotify:...`) are not loaded onto a
//! device directly; playback is started through the service's own API and
//! the device plays it as a connected player.

mod spotify;

pub use spotify::SpotifyClient;

use async_trait::async_trait;

use crate::error::CastError;
use crate::types::PlayerState;

/// A player registered with the streaming service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingDevice {
    /// Service-side identifier, used to address playback commands
    pub id: String,
    /// Human-readable name, matched against the cast target name
    pub name: String,
}

/// Playback control through a streaming service's API
#[async_trait]
pub trait StreamingService: Send + Sync {
    /// List the players currently registered with the service
    ///
    /// # Errors
    ///
    /// Returns [`CastError::StreamingService`] on auth or API failures.
    async fn list_devices(&self) -> Result<Vec<StreamingDevice>, CastError>;

    /// Start playing `uri` on the player with `device_id`
    ///
    /// # Errors
    ///
    /// Returns [`CastError::StreamingService`] when the service refuses.
    async fn start_playback(&self, device_id: &str, uri: &str) -> Result<(), CastError>;

    /// Pause playback on the player with `device_id`
    ///
    /// # Errors
    ///
    /// Returns [`CastError::StreamingService`] when the service refuses.
    async fn pause_playback(&self, device_id: &str) -> Result<(), CastError>;

    /// The service's view of current playback, if any
    ///
    /// # Errors
    ///
    /// Returns [`CastError::StreamingService`] on auth or API failures.
    async fn current_playback(&self) -> Result<Option<PlayerState>, CastError>;
}
