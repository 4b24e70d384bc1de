//! # flicast
//!
//! Bridges Flic Bluetooth buttons to Chromecast playback: a click starts
//! casting a configured stream, the next click stops it.
//!
//! ## Features
//!
//! - Device discovery via mDNS, with a periodically refreshed directory
//! - Toggle-style session control driven by button clicks
//! - Status watching, so sessions end when the device stops on its own
//! - Volume presets applied to auxiliary devices before playback
//! - Optional Spotify Connect playback for `spotify:` media URIs
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use flicast::{BridgeConfig, DeviceDirectory, MdnsDiscovery, MediaDescriptor};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), flicast::CastError> {
//! let config = BridgeConfig::builder()
//!     .target_device("Kitchen speaker")
//!     .button(
//!         "80:e4:da:70:32:3b",
//!         MediaDescriptor::new("https://radio.example/direkt.mp3"),
//!     )
//!     .build();
//!
//! let (events, _rx) = mpsc::channel(64);
//! let directory = DeviceDirectory::new(Arc::new(MdnsDiscovery::new()), events, &config);
//! directory.scan().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Every trigger in the process (button clicks, status polls, the rescan
//! timer, signals) becomes a [`ControlEvent`] on one channel, and the
//! [`Bridge`] loop is its only consumer. The [`CastController`] state
//! machine and the [`DeviceDirectory`] are therefore only ever mutated
//! from one place.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Control loop
pub mod bridge;
/// Session control
pub mod controller;
/// Device directory and rescan supervisor
pub mod directory;
/// Device discovery and connection drivers
pub mod driver;
/// Error types
pub mod error;
/// Button daemon client
pub mod flic;
/// Streaming-service playback
pub mod streaming;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

// Re-exports
pub use bridge::Bridge;
pub use controller::{CastController, ControlEvent};
pub use directory::DeviceDirectory;
pub use driver::{CastConnection, ChromecastConnection, Discovery, MdnsDiscovery};
pub use error::CastError;
pub use flic::FlicClient;
pub use streaming::{SpotifyClient, StreamingDevice, StreamingService};
pub use types::{
    BridgeConfig, DeviceHost, MediaDescriptor, PlaybackArgs, PlayerState, SessionState,
    StreamType, VolumePreset,
};
