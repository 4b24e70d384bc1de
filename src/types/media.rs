use serde::Deserialize;

use crate::error::CastError;

/// URI scheme prefix that routes playback through the streaming-service
/// collaborator instead of the cast driver
const STREAMING_URI_PREFIX: &str = "spotify:";

/// How the receiver should treat the stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamType {
    /// Seekable, bufferable content
    #[default]
    Buffered,
    /// Live content; pausing it is terminal since it cannot be resumed
    Live,
}

/// Playback arguments forwarded to the device driver
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaybackArgs {
    /// Stream type (default: buffered)
    #[serde(default)]
    pub stream_type: StreamType,

    /// Whether playback should start immediately. The default media
    /// receiver always starts on load; a `false` value is logged and has
    /// no further effect.
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,

    /// Title shown on the receiver
    #[serde(default)]
    pub title: Option<String>,

    /// Artwork URL shown on the receiver
    #[serde(default, alias = "thumb")]
    pub thumbnail: Option<String>,
}

fn default_autoplay() -> bool {
    true
}

impl Default for PlaybackArgs {
    fn default() -> Self {
        Self {
            stream_type: StreamType::default(),
            autoplay: true,
            title: None,
            thumbnail: None,
        }
    }
}

/// What to play when a button fires
///
/// Deserialized from the per-button JSON payload in the environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaDescriptor {
    /// Media URL, or a streaming-service URI (`spotify:` prefix)
    pub url: String,

    /// Explicit content type; when absent it is inferred from the URL
    #[serde(default)]
    pub content_type: Option<String>,

    /// Playback arguments
    #[serde(default)]
    pub args: PlaybackArgs,

    /// Volume to apply to the target device before playback (0.0 - 1.0)
    #[serde(default)]
    pub volume: Option<f32>,

    /// Overrides the globally configured target device for this media
    #[serde(default)]
    pub device_name: Option<String>,
}

impl MediaDescriptor {
    /// Create a descriptor for a plain media URL with default args
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
            args: PlaybackArgs::default(),
            volume: None,
            device_name: None,
        }
    }

    /// Whether this descriptor targets the streaming-service collaborator
    #[must_use]
    pub fn is_streaming_service_uri(&self) -> bool {
        self.url.starts_with(STREAMING_URI_PREFIX)
    }

    /// Resolve the content type to send to the device
    ///
    /// An explicit `content_type` wins; otherwise the type is inferred from
    /// the URL's file extension (query string and fragment stripped first).
    /// Streaming-service URIs never reach the device driver and are not
    /// resolved here.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::UnknownMediaType`] when no type is supplied and
    /// none can be inferred. This fails fast, before any device interaction.
    pub fn resolved_content_type(&self) -> Result<String, CastError> {
        if let Some(explicit) = &self.content_type {
            return Ok(explicit.clone());
        }

        let path = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or(self.url.as_str());

        mime_guess::from_path(path)
            .first_raw()
            .map(ToString::to_string)
            .ok_or_else(|| CastError::UnknownMediaType {
                url: self.url.clone(),
            })
    }
}
