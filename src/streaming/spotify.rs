//! Spotify Web API client
//!
//! Authenticates with a long-lived refresh token and drives the Connect
//! endpoints for device listing, play and pause.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::error::CastError;
use crate::streaming::{StreamingDevice, StreamingService};
use crate::types::{PlayerState, SpotifyConfig};

const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const API_URL: &str = "https://api.spotify.com";

/// Refresh this long before the token actually expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Spotify implementation of [`StreamingService`]
pub struct SpotifyClient {
    http: reqwest::Client,
    config: SpotifyConfig,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct DevicesResponse {
    devices: Vec<DeviceEntry>,
}

#[derive(Deserialize)]
struct DeviceEntry {
    id: Option<String>,
    name: String,
}

#[derive(Deserialize)]
struct PlaybackResponse {
    is_playing: bool,
}

impl SpotifyClient {
    /// Create a client from credentials
    #[must_use]
    pub fn new(config: SpotifyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, CastError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Refreshing streaming service access token");
        let response = self
            .http
            .post(format!("{ACCOUNTS_URL}/api/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &self.config.refresh_token),
            ])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CastError::StreamingService {
                status: Some(status.as_u16()),
                message: "token refresh rejected".to_string(),
            });
        }

        let token: TokenResponse = response.json().await.map_err(transport)?;
        let access_token = token.access_token.clone();
        *slot = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now()
                + Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(access_token)
    }
}

#[async_trait]
impl StreamingService for SpotifyClient {
    async fn list_devices(&self) -> Result<Vec<StreamingDevice>, CastError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{API_URL}/v1/me/player/devices"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        let response = check(response)?;

        let devices: DevicesResponse = response.json().await.map_err(transport)?;
        Ok(devices
            .devices
            .into_iter()
            .filter_map(|entry| {
                entry.id.map(|id| StreamingDevice {
                    id,
                    name: entry.name,
                })
            })
            .collect())
    }

    async fn start_playback(&self, device_id: &str, uri: &str) -> Result<(), CastError> {
        let token = self.access_token().await?;

        // Tracks are played directly; albums/playlists/artists become the
        // playback context.
        let body = if uri.starts_with("spotify:track:") {
            serde_json::json!({ "uris": [uri] })
        } else {
            serde_json::json!({ "context_uri": uri })
        };

        let response = self
            .http
            .put(format!("{API_URL}/v1/me/player/play"))
            .query(&[("device_id", device_id)])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check(response)?;
        Ok(())
    }

    async fn pause_playback(&self, device_id: &str) -> Result<(), CastError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .put(format!("{API_URL}/v1/me/player/pause"))
            .query(&[("device_id", device_id)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        check(response)?;
        Ok(())
    }

    async fn current_playback(&self) -> Result<Option<PlayerState>, CastError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{API_URL}/v1/me/player"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = check(response)?;

        let playback: PlaybackResponse = response.json().await.map_err(transport)?;
        Ok(Some(if playback.is_playing {
            PlayerState::Playing
        } else {
            PlayerState::Paused
        }))
    }
}

fn check(response: reqwest::Response) -> Result<reqwest::Response, CastError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(CastError::StreamingService {
            status: Some(status.as_u16()),
            message: "request rejected".to_string(),
        })
    }
}

fn transport(error: reqwest::Error) -> CastError {
    CastError::StreamingService {
        status: None,
        message: format!("transport error: {error}"),
    }
}
