//! Cast session controller
//!
//! Owns the start/stop lifecycle for the single playback session and the
//! status watcher that observes it.

pub mod events;

#[cfg(test)]
mod tests;

pub use events::ControlEvent;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::directory::DeviceDirectory;
use crate::driver::CastConnection;
use crate::error::CastError;
use crate::streaming::StreamingService;
use crate::types::{BridgeConfig, MediaDescriptor, PlayerState, SessionState, VolumePreset};

/// What the active session is playing on
enum SessionTarget {
    /// A directly connected device
    Device(Arc<dyn CastConnection>),

    /// A streaming-service player addressed by its service-side id
    Streaming {
        device_id: String,
        device_name: String,
    },
}

/// Book-keeping for the one session that may exist at a time
struct CastSession {
    target: SessionTarget,
    media: MediaDescriptor,
    last_player_state: Option<PlayerState>,
    watcher: Option<JoinHandle<()>>,
}

/// Toggle-driven session state machine
///
/// A button gesture while idle starts a session; the same gesture while a
/// session exists tears it down. At most one session and at most one status
/// watcher exist at any time. The controller is driven exclusively by the
/// bridge loop, so its methods take `&mut self` and never race.
pub struct CastController {
    directory: Arc<DeviceDirectory>,
    streaming: Option<Arc<dyn StreamingService>>,
    events: mpsc::Sender<ControlEvent>,
    target_device: String,
    volume_presets: Vec<VolumePreset>,
    status_poll_interval: Duration,
    state: SessionState,
    session: Option<CastSession>,
}

impl CastController {
    /// Create an idle controller
    #[must_use]
    pub fn new(
        directory: Arc<DeviceDirectory>,
        streaming: Option<Arc<dyn StreamingService>>,
        events: mpsc::Sender<ControlEvent>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            directory,
            streaming,
            events,
            target_device: config.target_device.clone(),
            volume_presets: config.volume_presets.clone(),
            status_poll_interval: config.status_poll_interval,
            state: SessionState::Idle,
            session: None,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a session currently exists
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the active session has a status watcher attached
    #[must_use]
    pub fn has_status_watcher(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.watcher.is_some())
    }

    /// Handle one button gesture
    ///
    /// Starts playback of `media` when idle; tears the existing session down
    /// otherwise. Gestures arriving while a start is in flight cannot happen
    /// because the bridge loop processes events one at a time.
    ///
    /// # Errors
    ///
    /// Start failures bubble up after the controller has reset itself to
    /// idle; they poison the gesture, never the process.
    pub async fn toggle(&mut self, media: &MediaDescriptor) -> Result<(), CastError> {
        if self.session.is_some() {
            info!("Currently playing - stopping");
            self.teardown().await;
            return Ok(());
        }

        self.state = SessionState::Starting;
        let result = self.start(media).await;
        if result.is_err() {
            self.state = SessionState::Idle;
            self.session = None;
        }
        result
    }

    /// React to a player state observed on the device
    ///
    /// Consecutive duplicates are suppressed. A terminal state for the
    /// session's stream type tears the session down. Reports arriving after
    /// the session was cleared are ignored.
    pub async fn on_player_state(&mut self, state: PlayerState) {
        let Some(session) = self.session.as_mut() else {
            debug!("Got device media player state \"{state}\" with no active session - ignoring");
            return;
        };

        if session.last_player_state == Some(state) {
            return;
        }
        session.last_player_state = Some(state);
        info!("Got device media player state \"{state}\"");

        if state.is_terminal_for(session.media.args.stream_type) {
            info!("Player state \"{state}\" ends the session");
            self.teardown().await;
        }
    }

    /// Tear the session down, telling the device to stop
    ///
    /// Stops the media session, closes the receiver application and drops
    /// the connection. Each step tolerates failure; a device that already
    /// lost the session must not wedge the controller. No-op when idle.
    pub async fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.state = SessionState::Idle;

        if let Some(watcher) = session.watcher.take() {
            watcher.abort();
        }

        match session.target {
            SessionTarget::Device(connection) => {
                let name = connection.device_name().to_string();
                info!("Stopping playback on \"{name}\"");
                if let Err(e) = connection.stop().await {
                    log_teardown_failure(&name, "stop playback", &e);
                }
                info!("Closing receiver application on \"{name}\"");
                if let Err(e) = connection.quit_app().await {
                    log_teardown_failure(&name, "close receiver application", &e);
                }
                if let Err(e) = connection.disconnect().await {
                    debug!("Failed to disconnect from \"{name}\": {e}");
                }
            }
            SessionTarget::Streaming {
                device_id,
                device_name,
            } => {
                if let Some(streaming) = &self.streaming {
                    info!("Pausing streaming playback on \"{device_name}\"");
                    if let Err(e) = streaming.pause_playback(&device_id).await {
                        warn!("Failed to pause streaming playback on \"{device_name}\": {e}");
                    }
                }
            }
        }
    }

    /// Drop the session without sending any commands to the device
    ///
    /// Used on the fatal-error path where the connection is presumed dead
    /// and a stop or quit would only block shutdown.
    pub fn force_reset(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(watcher) = session.watcher.take() {
                watcher.abort();
            }
            info!("Clearing session without stopping playback");
        }
        self.state = SessionState::Idle;
    }

    /// Release the session as part of process shutdown
    ///
    /// The graceful path is a normal teardown; the forced path skips all
    /// device commands.
    pub async fn shutdown(&mut self, force: bool) {
        if force {
            self.force_reset();
        } else {
            self.teardown().await;
        }
    }

    async fn start(&mut self, media: &MediaDescriptor) -> Result<(), CastError> {
        // Fail fast on media we could never describe to a receiver, before
        // touching any device.
        if !media.is_streaming_service_uri() {
            media.resolved_content_type()?;
        }

        self.apply_volume_presets().await;

        let target_name = media
            .device_name
            .clone()
            .unwrap_or_else(|| self.target_device.clone());

        let target = if media.is_streaming_service_uri() {
            self.start_streaming(media, &target_name).await?
        } else {
            self.start_on_device(media, &target_name).await?
        };

        let watcher = match &target {
            SessionTarget::Device(connection) => Some(self.spawn_watcher(Arc::clone(connection))),
            SessionTarget::Streaming { .. } => None,
        };

        self.session = Some(CastSession {
            target,
            media: media.clone(),
            last_player_state: None,
            watcher,
        });
        self.state = SessionState::Active;
        Ok(())
    }

    async fn start_on_device(
        &mut self,
        media: &MediaDescriptor,
        target_name: &str,
    ) -> Result<SessionTarget, CastError> {
        let connection = self.directory.resolve(target_name).await?;

        if let Some(level) = media.volume {
            if let Err(e) = connection.set_volume(level).await {
                warn!("Failed to set volume {level} on \"{target_name}\": {e}");
            }
        }

        info!("Starting playback of {} on \"{target_name}\"", media.url);
        connection.play(media).await?;
        info!("Playback started on \"{target_name}\"");

        Ok(SessionTarget::Device(connection))
    }

    async fn start_streaming(
        &mut self,
        media: &MediaDescriptor,
        target_name: &str,
    ) -> Result<SessionTarget, CastError> {
        let Some(streaming) = self.streaming.clone() else {
            return Err(CastError::StreamingService {
                status: None,
                message: format!(
                    "media {} needs a streaming service, but none is configured",
                    media.url
                ),
            });
        };

        let devices = streaming.list_devices().await?;
        let device = devices
            .into_iter()
            .find(|device| device.name == target_name)
            .ok_or_else(|| CastError::DeviceNotFound {
                device_name: target_name.to_string(),
            })?;

        info!("Starting streaming playback of {} on \"{target_name}\"", media.url);
        streaming.start_playback(&device.id, &media.url).await?;
        info!("Streaming playback started on \"{target_name}\"");

        Ok(SessionTarget::Streaming {
            device_id: device.id,
            device_name: device.name,
        })
    }

    /// Set preconfigured volumes on auxiliary devices
    ///
    /// Each preset device is resolved, set, then disconnected again.
    /// Failures are logged and skipped; presets must never block the main
    /// playback start.
    async fn apply_volume_presets(&self) {
        for preset in &self.volume_presets {
            let connection = match self.directory.resolve(&preset.device_name).await {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(
                        "Skipping volume preset for \"{}\": {e}",
                        preset.device_name
                    );
                    continue;
                }
            };

            info!(
                "Setting volume {} on \"{}\"",
                preset.level, preset.device_name
            );
            if let Err(e) = connection.set_volume(preset.level).await {
                warn!(
                    "Failed to set volume on \"{}\": {e}",
                    preset.device_name
                );
            }
            if let Err(e) = connection.disconnect().await {
                debug!(
                    "Failed to disconnect from \"{}\": {e}",
                    preset.device_name
                );
            }
        }
    }

    fn spawn_watcher(&self, connection: Arc<dyn CastConnection>) -> JoinHandle<()> {
        let events = self.events.clone();
        let interval = self.status_poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let state = match connection.player_state().await {
                    Ok(state) => state,
                    Err(e) => {
                        debug!("Status poll failed: {e}");
                        PlayerState::Unknown
                    }
                };
                if events.send(ControlEvent::PlayerStatus(state)).await.is_err() {
                    break;
                }
            }
        })
    }
}

/// An app session that is already gone is expected during teardown; anything
/// else is worth a warning. Either way the error is swallowed.
fn log_teardown_failure(name: &str, action: &str, error: &CastError) {
    if error.is_teardown_tolerable() {
        debug!("Ignoring failure to {action} on \"{name}\": {error}");
    } else {
        warn!("Failed to {action} on \"{name}\": {error}");
    }
}
