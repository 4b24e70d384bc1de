use std::io;
use thiserror::Error;

/// Errors that can occur while bridging button presses to cast playback
#[derive(Debug, Error)]
pub enum CastError {
    // ===== Discovery Errors =====
    /// Device was not found in the directory, even after one rescan
    #[error("device not found: {device_name}")]
    DeviceNotFound {
        /// Friendly name of the device that was not found
        device_name: String,
    },

    /// A device scan completed without finding any hosts
    #[error("device scan found no hosts: {message}")]
    ScanFailed {
        /// Description of the failure
        message: String,
    },

    /// The discovery transport itself failed
    #[error("discovery failed: {message}")]
    DiscoveryFailed {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ===== Connection Errors =====
    /// Failed to establish a connection to a device
    #[error("connection failed to {device_name}: {message}")]
    ConnectionFailed {
        /// Friendly name of the device
        device_name: String,
        /// Description of the failure
        message: String,
    },

    /// A command was issued against an app session that was never
    /// launched or has already been torn down
    #[error("no registered app session for `{command}` on {device_name}")]
    ControllerNotRegistered {
        /// Friendly name of the device
        device_name: String,
        /// The command that was attempted
        command: &'static str,
    },

    // ===== Playback Errors =====
    /// The device driver rejected or failed a playback command
    #[error("playback failed on {device_name}: {message}")]
    PlaybackFailed {
        /// Friendly name of the device
        device_name: String,
        /// Description of the failure
        message: String,
    },

    /// No content type was supplied and none could be inferred from the URL
    #[error("could not determine content type for media url: {url}")]
    UnknownMediaType {
        /// The media URL that failed MIME lookup
        url: String,
    },

    // ===== Streaming Service Errors =====
    /// The streaming-service collaborator reported a failure
    /// (auth, session, or device unknown to the service)
    #[error("streaming service error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    StreamingService {
        /// HTTP status code, if the failure came from an API response
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    // ===== Button Client Errors =====
    /// The button daemon connection failed or reported a fatal condition
    #[error("button client error: {message}")]
    ButtonClient {
        /// Description of the failure
        message: String,
    },

    /// A frame received from the button daemon could not be decoded
    #[error("invalid button daemon frame: {message}")]
    ButtonProtocol {
        /// Description of the malformed frame
        message: String,
    },

    // ===== Configuration Errors =====
    /// Required configuration is missing or unparseable
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CastError {
    /// True for errors that terminate a single button gesture but must not
    /// bring down the process
    #[must_use]
    pub fn is_gesture_scoped(&self) -> bool {
        matches!(
            self,
            CastError::DeviceNotFound { .. }
                | CastError::UnknownMediaType { .. }
                | CastError::PlaybackFailed { .. }
                | CastError::ConnectionFailed { .. }
                | CastError::ControllerNotRegistered { .. }
                | CastError::StreamingService { .. }
        )
    }

    /// True when tearing down a session may safely swallow this error
    /// (the underlying app session is already gone)
    #[must_use]
    pub fn is_teardown_tolerable(&self) -> bool {
        matches!(
            self,
            CastError::ControllerNotRegistered { .. }
                | CastError::PlaybackFailed { .. }
                | CastError::ConnectionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CastError::DeviceNotFound {
            device_name: "Kitchen".to_string(),
        };
        assert_eq!(err.to_string(), "device not found: Kitchen");
    }

    #[test]
    fn test_streaming_error_display_with_status() {
        let err = CastError::StreamingService {
            status: Some(404),
            message: "device not registered".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "streaming service error (status 404): device not registered"
        );
    }

    #[test]
    fn test_gesture_scoped_classification() {
        assert!(
            CastError::DeviceNotFound {
                device_name: "x".into()
            }
            .is_gesture_scoped()
        );
        assert!(
            !CastError::ScanFailed {
                message: "empty".into()
            }
            .is_gesture_scoped()
        );
    }
}
