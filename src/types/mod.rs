//! Core types for the button-to-cast bridge

mod config;
mod device;
mod media;
mod state;


pub use config::{BridgeConfig, BridgeConfigBuilder, SpotifyConfig, VolumePreset};
pub use device::DeviceHost;
pub use media::{MediaDescriptor, PlaybackArgs, StreamType};
pub use state::{PlayerState, SessionState};
