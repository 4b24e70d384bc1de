//! Chromecast implementation of the connection boundary
//!
//! The underlying SDK is synchronous and its handles borrow the host
//! string, so every command opens a fresh short-lived connection inside
//! `spawn_blocking` and the session ids needed to address later commands
//! are kept in shared bookkeeping.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_cast::CastDevice;
use rust_cast::channels::media::{
    Image, Media, Metadata, MusicTrackMediaMetadata, PlayerState as CastPlayerState,
    StreamType as CastStreamType,
};
use rust_cast::channels::receiver::CastDeviceApp;
use tokio::task;
use tracing::debug;

use crate::driver::CastConnection;
use crate::error::CastError;
use crate::types::{DeviceHost, MediaDescriptor, PlaybackArgs, PlayerState, StreamType};

const DEFAULT_RECEIVER_ID: &str = "receiver-0";

/// Ids of the receiver application and media session started by `play`
#[derive(Debug, Default)]
struct AppSession {
    receiver_session_id: Option<String>,
    media_session_id: Option<i32>,
    destination_id: Option<String>,
}

/// A Chromecast addressed by ip and port
pub struct ChromecastConnection {
    address: String,
    port: u16,
    friendly_name: String,
    session: Arc<Mutex<AppSession>>,
}

impl ChromecastConnection {
    /// Connect to a device and block until it reports ready
    ///
    /// Ready means the platform channel opens and the device answers a
    /// status request.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::ConnectionFailed`] when the device cannot be
    /// reached or never answers.
    pub async fn establish(host: &DeviceHost) -> Result<Self, CastError> {
        let address = host.address.to_string();
        let port = host.port;
        let friendly_name = host.friendly_name.clone();

        let check_address = address.clone();
        let check_name = friendly_name.clone();
        task::spawn_blocking(move || -> Result<(), CastError> {
            let device = open(check_address, port, &check_name)?;
            device
                .receiver
                .get_status()
                .map_err(|e| CastError::ConnectionFailed {
                    device_name: check_name.clone(),
                    message: format!("device never reported ready: {e}"),
                })?;
            Ok(())
        })
        .await
        .map_err(|e| CastError::ConnectionFailed {
            device_name: friendly_name.clone(),
            message: format!("connection task failed: {e}"),
        })??;

        debug!("Device \"{friendly_name}\" at {address}:{port} is ready");
        Ok(Self {
            address,
            port,
            friendly_name,
            session: Arc::new(Mutex::new(AppSession::default())),
        })
    }

    async fn run_blocking<T, F>(&self, command: &'static str, job: F) -> Result<T, CastError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, CastError> + Send + 'static,
    {
        task::spawn_blocking(job)
            .await
            .map_err(|e| CastError::PlaybackFailed {
                device_name: self.friendly_name.clone(),
                message: format!("{command} task failed: {e}"),
            })?
    }

    fn clear_session(&self) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = AppSession::default();
        }
    }
}

#[async_trait]
impl CastConnection for ChromecastConnection {
    fn device_name(&self) -> &str {
        &self.friendly_name
    }

    async fn play(&self, media: &MediaDescriptor) -> Result<(), CastError> {
        let content_type = media.resolved_content_type()?;
        if !media.args.autoplay {
            // The default receiver starts as soon as the load lands.
            debug!("autoplay=false requested; the default receiver ignores it");
        }

        let address = self.address.clone();
        let port = self.port;
        let name = self.friendly_name.clone();
        let session = Arc::clone(&self.session);
        let content_id = media.url.clone();
        let stream_type = match media.args.stream_type {
            StreamType::Live => CastStreamType::Live,
            StreamType::Buffered => CastStreamType::Buffered,
        };
        let metadata = build_metadata(&media.args);

        self.run_blocking("load", move || {
            let device = open(address, port, &name)?;
            let app = device
                .receiver
                .launch_app(&CastDeviceApp::DefaultMediaReceiver)
                .map_err(|e| {
                    playback(&name, format!("failed to launch receiver application: {e}"))
                })?;
            device
                .connection
                .connect(app.transport_id.clone())
                .map_err(|e| {
                    playback(&name, format!("failed to join receiver application: {e}"))
                })?;

            let status = device
                .media
                .load(
                    app.transport_id.clone(),
                    app.session_id.clone(),
                    &Media {
                        content_id,
                        content_type,
                        stream_type,
                        duration: None,
                        metadata,
                    },
                )
                .map_err(|e| playback(&name, format!("failed to load media: {e}")))?;

            let mut slot = session
                .lock()
                .map_err(|_| playback(&name, "session bookkeeping poisoned".to_string()))?;
            slot.receiver_session_id = Some(app.session_id.clone());
            slot.destination_id = Some(app.transport_id.clone());
            slot.media_session_id = status.entries.first().map(|entry| entry.media_session_id);
            Ok(())
        })
        .await
    }

    async fn stop(&self) -> Result<(), CastError> {
        let (destination, media_session_id) = {
            let slot = self
                .session
                .lock()
                .map_err(|_| playback(&self.friendly_name, "session bookkeeping poisoned".to_string()))?;
            match (slot.destination_id.clone(), slot.media_session_id) {
                (Some(destination), Some(media_session_id)) => (destination, media_session_id),
                _ => {
                    return Err(CastError::ControllerNotRegistered {
                        device_name: self.friendly_name.clone(),
                        command: "stop",
                    });
                }
            }
        };

        let address = self.address.clone();
        let port = self.port;
        let name = self.friendly_name.clone();
        self.run_blocking("stop", move || {
            let device = open(address, port, &name)?;
            device
                .connection
                .connect(destination.clone())
                .map_err(|e| {
                    playback(&name, format!("failed to join receiver application: {e}"))
                })?;
            device
                .media
                .stop(destination, media_session_id)
                .map_err(|e| playback(&name, format!("failed to stop media session: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn quit_app(&self) -> Result<(), CastError> {
        let session_id = {
            let slot = self
                .session
                .lock()
                .map_err(|_| playback(&self.friendly_name, "session bookkeeping poisoned".to_string()))?;
            slot.receiver_session_id.clone()
        };
        let Some(session_id) = session_id else {
            return Err(CastError::ControllerNotRegistered {
                device_name: self.friendly_name.clone(),
                command: "quit",
            });
        };

        let address = self.address.clone();
        let port = self.port;
        let name = self.friendly_name.clone();
        let result = self
            .run_blocking("stop application", move || {
                let device = open(address, port, &name)?;
                device
                    .receiver
                    .stop_app(session_id)
                    .map_err(|e| {
                        playback(&name, format!("failed to close receiver application: {e}"))
                    })?;
                Ok(())
            })
            .await;

        // The application is gone either way; its ids are useless now.
        self.clear_session();
        result
    }

    async fn set_volume(&self, level: f32) -> Result<(), CastError> {
        let address = self.address.clone();
        let port = self.port;
        let name = self.friendly_name.clone();
        self.run_blocking("set volume", move || {
            let device = open(address, port, &name)?;
            device
                .receiver
                .set_volume(level)
                .map_err(|e| playback(&name, format!("failed to set volume: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn player_state(&self) -> Result<PlayerState, CastError> {
        let destination = {
            let slot = self
                .session
                .lock()
                .map_err(|_| playback(&self.friendly_name, "session bookkeeping poisoned".to_string()))?;
            slot.destination_id.clone()
        };
        let Some(destination) = destination else {
            return Err(CastError::ControllerNotRegistered {
                device_name: self.friendly_name.clone(),
                command: "get status",
            });
        };

        let address = self.address.clone();
        let port = self.port;
        let name = self.friendly_name.clone();
        self.run_blocking("get status", move || {
            let device = open(address, port, &name)?;
            device
                .connection
                .connect(destination.clone())
                .map_err(|e| {
                    playback(&name, format!("failed to join receiver application: {e}"))
                })?;
            let status = device
                .media
                .get_status(destination, None)
                .map_err(|e| playback(&name, format!("failed to fetch media status: {e}")))?;

            // No entry means the media session evaporated.
            Ok(status
                .entries
                .first()
                .map_or(PlayerState::Idle, |entry| {
                    map_player_state(&entry.player_state)
                }))
        })
        .await
    }

    async fn disconnect(&self) -> Result<(), CastError> {
        // Commands open their own short-lived connections, so there is no
        // transport to close; only the bookkeeping goes.
        self.clear_session();
        debug!("Disconnected from \"{}\"", self.friendly_name);
        Ok(())
    }
}

fn open(address: String, port: u16, name: &str) -> Result<CastDevice<'static>, CastError> {
    let device = CastDevice::connect(address, port).map_err(|e| CastError::ConnectionFailed {
        device_name: name.to_string(),
        message: format!("failed to connect: {e}"),
    })?;
    device
        .connection
        .connect(DEFAULT_RECEIVER_ID.to_string())
        .map_err(|e| CastError::ConnectionFailed {
            device_name: name.to_string(),
            message: format!("failed to open platform channel: {e}"),
        })?;
    Ok(device)
}

fn build_metadata(args: &PlaybackArgs) -> Option<Metadata> {
    if args.title.is_none() && args.thumbnail.is_none() {
        return None;
    }
    let images = args
        .thumbnail
        .iter()
        .map(|url| Image {
            url: url.clone(),
            dimensions: None,
        })
        .collect();
    Some(Metadata::MusicTrack(MusicTrackMediaMetadata {
        title: args.title.clone(),
        images,
        ..MusicTrackMediaMetadata::default()
    }))
}

fn map_player_state(state: &CastPlayerState) -> PlayerState {
    match state {
        CastPlayerState::Playing => PlayerState::Playing,
        CastPlayerState::Paused => PlayerState::Paused,
        CastPlayerState::Buffering => PlayerState::Buffering,
        CastPlayerState::Idle => PlayerState::Idle,
    }
}

fn playback(name: &str, message: String) -> CastError {
    CastError::PlaybackFailed {
        device_name: name.to_string(),
        message,
    }
}
