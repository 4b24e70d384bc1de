use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::CastError;
use crate::types::MediaDescriptor;

/// Default flicd address
pub const DEFAULT_FLICD_ADDRESS: &str = "localhost:5551";

/// Default timeout for a single device host scan
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(15);

/// Default interval between periodic device host scans
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(900);

/// Default interval between device status polls on an active session
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Button clicks queued longer than this are discarded as stale
pub const DEFAULT_STALE_CLICK_THRESHOLD: Duration = Duration::from_secs(2);

/// A device that gets a fixed volume applied before each playback start
#[derive(Debug, Clone, PartialEq)]
pub struct VolumePreset {
    /// Friendly name of the device
    pub device_name: String,
    /// Volume level (0.0 - 1.0)
    pub level: f32,
}

/// Credentials for the streaming-service collaborator
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Long-lived refresh token used to mint access tokens
    pub refresh_token: String,
}

/// Runtime configuration for the bridge
///
/// Built from the environment in the binary, or via [`BridgeConfig::builder`]
/// in tests.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address of the flicd daemon
    pub flicd_address: String,

    /// Friendly name of the device to cast to
    pub target_device: String,

    /// Devices that get a volume preset applied before each playback start
    pub volume_presets: Vec<VolumePreset>,

    /// Media to play, keyed by button Bluetooth address
    pub button_media: HashMap<String, MediaDescriptor>,

    /// Timeout for a single device host scan
    pub scan_timeout: Duration,

    /// Interval between periodic device host scans
    pub rescan_interval: Duration,

    /// Interval between device status polls on an active session
    pub status_poll_interval: Duration,

    /// Queued button clicks older than this are discarded
    pub stale_click_threshold: Duration,

    /// Streaming-service credentials, when the optional path is configured
    pub spotify: Option<SpotifyConfig>,
}

impl BridgeConfig {
    /// Create a config builder with defaults suitable for tests
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Read configuration from the process environment
    ///
    /// Required: `DEVICE_TO_CAST_TO`, `BUTTON_MEDIA`. Optional:
    /// `FLICD_ADDRESS`, `DEVICES_TO_SET_VOLUME_FOR`, and the
    /// `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET` /
    /// `SPOTIFY_REFRESH_TOKEN` triple (all or none).
    ///
    /// # Errors
    ///
    /// Returns [`CastError::Config`] when a required variable is missing or
    /// a value fails to parse.
    pub fn from_env() -> Result<Self, CastError> {
        let target_device = env::var("DEVICE_TO_CAST_TO").map_err(|_| CastError::Config {
            message: "DEVICE_TO_CAST_TO is not set".to_string(),
        })?;

        let button_media_json = env::var("BUTTON_MEDIA").map_err(|_| CastError::Config {
            message: "BUTTON_MEDIA is not set".to_string(),
        })?;
        let button_media = parse_button_media(&button_media_json)?;

        let volume_presets = match env::var("DEVICES_TO_SET_VOLUME_FOR") {
            Ok(raw) => parse_volume_presets(&raw)?,
            Err(_) => Vec::new(),
        };

        let flicd_address =
            env::var("FLICD_ADDRESS").unwrap_or_else(|_| DEFAULT_FLICD_ADDRESS.to_string());

        let spotify = spotify_from_env()?;

        Ok(Self {
            flicd_address,
            target_device,
            volume_presets,
            button_media,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            stale_click_threshold: DEFAULT_STALE_CLICK_THRESHOLD,
            spotify,
        })
    }
}

fn spotify_from_env() -> Result<Option<SpotifyConfig>, CastError> {
    let client_id = env::var("SPOTIFY_CLIENT_ID").ok();
    let client_secret = env::var("SPOTIFY_CLIENT_SECRET").ok();
    let refresh_token = env::var("SPOTIFY_REFRESH_TOKEN").ok();

    match (client_id, client_secret, refresh_token) {
        (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(Some(SpotifyConfig {
            client_id,
            client_secret,
            refresh_token,
        })),
        (None, None, None) => Ok(None),
        _ => Err(CastError::Config {
            message: "SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and \
                      SPOTIFY_REFRESH_TOKEN must be set together"
                .to_string(),
        }),
    }
}

/// Parse the `name=level` comma list from `DEVICES_TO_SET_VOLUME_FOR`
///
/// Whitespace around names and levels is tolerated; levels must parse as
/// floats in 0.0 - 1.0.
///
/// # Errors
///
/// Returns [`CastError::Config`] on a malformed pair or out-of-range level.
pub fn parse_volume_presets(raw: &str) -> Result<Vec<VolumePreset>, CastError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, level) = entry.split_once('=').ok_or_else(|| CastError::Config {
                message: format!("expected `name=level` in volume preset, got `{entry}`"),
            })?;

            let device_name = name.trim().to_string();
            if device_name.is_empty() {
                return Err(CastError::Config {
                    message: format!("empty device name in volume preset `{entry}`"),
                });
            }

            let level: f32 = level.trim().parse().map_err(|_| CastError::Config {
                message: format!("invalid volume level in preset `{entry}`"),
            })?;
            if !(0.0..=1.0).contains(&level) {
                return Err(CastError::Config {
                    message: format!("volume level out of range (0.0 - 1.0) in preset `{entry}`"),
                });
            }

            Ok(VolumePreset { device_name, level })
        })
        .collect()
}

/// Parse the `BUTTON_MEDIA` JSON map of button address to media descriptor
///
/// # Errors
///
/// Returns [`CastError::Config`] when the JSON is malformed or the map is
/// empty.
pub fn parse_button_media(raw: &str) -> Result<HashMap<String, MediaDescriptor>, CastError> {
    let map: HashMap<String, MediaDescriptor> =
        serde_json::from_str(raw).map_err(|e| CastError::Config {
            message: format!("failed to parse BUTTON_MEDIA: {e}"),
        })?;

    if map.is_empty() {
        return Err(CastError::Config {
            message: "BUTTON_MEDIA maps no buttons".to_string(),
        });
    }

    Ok(map)
}

/// Builder for [`BridgeConfig`]
#[derive(Debug, Clone)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl Default for BridgeConfigBuilder {
    fn default() -> Self {
        Self {
            config: BridgeConfig {
                flicd_address: DEFAULT_FLICD_ADDRESS.to_string(),
                target_device: String::new(),
                volume_presets: Vec::new(),
                button_media: HashMap::new(),
                scan_timeout: DEFAULT_SCAN_TIMEOUT,
                rescan_interval: DEFAULT_RESCAN_INTERVAL,
                status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
                stale_click_threshold: DEFAULT_STALE_CLICK_THRESHOLD,
                spotify: None,
            },
        }
    }
}

impl BridgeConfigBuilder {
    /// Set the flicd address
    #[must_use]
    pub fn flicd_address(mut self, addr: impl Into<String>) -> Self {
        self.config.flicd_address = addr.into();
        self
    }

    /// Set the target device name
    #[must_use]
    pub fn target_device(mut self, name: impl Into<String>) -> Self {
        self.config.target_device = name.into();
        self
    }

    /// Set the volume presets
    #[must_use]
    pub fn volume_presets(mut self, presets: Vec<VolumePreset>) -> Self {
        self.config.volume_presets = presets;
        self
    }

    /// Map a button address to a media descriptor
    #[must_use]
    pub fn button(mut self, address: impl Into<String>, media: MediaDescriptor) -> Self {
        self.config.button_media.insert(address.into(), media);
        self
    }

    /// Set the scan timeout
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.config.scan_timeout = timeout;
        self
    }

    /// Set the rescan interval
    #[must_use]
    pub fn rescan_interval(mut self, interval: Duration) -> Self {
        self.config.rescan_interval = interval;
        self
    }

    /// Set the status poll interval
    #[must_use]
    pub fn status_poll_interval(mut self, interval: Duration) -> Self {
        self.config.status_poll_interval = interval;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}
