//! Flic button daemon integration
//!
//! The daemon (flicd) owns the Bluetooth side; this module speaks its TCP
//! protocol and turns physical clicks into control events.

mod client;
mod codec;
mod types;

#[cfg(test)]
mod tests;

pub use client::FlicClient;
pub use codec::FlicCodec;
pub use types::{
    BdAddr, BluetoothControllerState, ClickType, Command, ConnectionStatus, Event, LatencyMode,
};
