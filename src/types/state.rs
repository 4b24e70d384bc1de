use std::fmt;

/// Playback state reported asynchronously by the device driver
///
/// Observed only, never owned: the driver (or the streaming service) is the
/// source of truth for what the media engine is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Media is playing
    Playing,
    /// Media is paused
    Paused,
    /// Media is buffering
    Buffering,
    /// No media session is active on the device
    Idle,
    /// The device status could not be read or was unrecognized
    Unknown,
}

impl PlayerState {
    /// Whether this state, reported on a live session, means the session is
    /// finished: the device went idle/unreadable, or a live stream paused
    /// (a paused live stream cannot be resumed)
    #[must_use]
    pub fn is_terminal_for(self, stream_type: super::StreamType) -> bool {
        match self {
            PlayerState::Idle | PlayerState::Unknown => true,
            PlayerState::Paused => stream_type == super::StreamType::Live,
            PlayerState::Playing | PlayerState::Buffering => false,
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlayerState::Playing => "PLAYING",
            PlayerState::Paused => "PAUSED",
            PlayerState::Buffering => "BUFFERING",
            PlayerState::Idle => "IDLE",
            PlayerState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// State of the cast session controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No session exists
    #[default]
    Idle,
    /// A play request is in flight (resolving, loading media)
    Starting,
    /// Playback is confirmed active and a status listener is attached
    Active,
}
