//! Wire-level types of the button daemon protocol

use std::fmt;
use std::str::FromStr;

use crate::error::CastError;

/// A Bluetooth device address
///
/// Stored in wire order (least significant byte first); displayed in the
/// conventional reversed, colon-separated form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    /// Length of an address on the wire
    pub const WIRE_LEN: usize = 6;

    /// Build an address from wire-order bytes
    #[must_use]
    pub fn from_wire(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// The wire-order bytes
    #[must_use]
    pub fn to_wire(self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BdAddr({self})")
    }
}

impl FromStr for BdAddr {
    type Err = CastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CastError::Config {
            message: format!("invalid bluetooth address: {s}"),
        };

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        // Display order is the reverse of wire order.
        for slot in (0..6).rev() {
            let part = parts.next().ok_or_else(invalid)?;
            bytes[slot] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

/// Kind of button gesture reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Button was pressed
    ButtonDown,
    /// Button was released
    ButtonUp,
    /// Press-and-release, reported immediately
    ButtonClick,
    /// A click that was not part of a double click
    ButtonSingleClick,
    /// Two clicks in rapid succession
    ButtonDoubleClick,
    /// Button held down
    ButtonHold,
}

impl ClickType {
    /// Decode the wire value
    #[must_use]
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ButtonDown),
            1 => Some(Self::ButtonUp),
            2 => Some(Self::ButtonClick),
            3 => Some(Self::ButtonSingleClick),
            4 => Some(Self::ButtonDoubleClick),
            5 => Some(Self::ButtonHold),
            _ => None,
        }
    }
}

/// Connection status of a button channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No Bluetooth connection
    Disconnected,
    /// Connected but not yet verified
    Connected,
    /// Connected and ready to report clicks
    Ready,
}

impl ConnectionStatus {
    /// Decode the wire value
    #[must_use]
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connected),
            2 => Some(Self::Ready),
            _ => None,
        }
    }
}

/// State of the Bluetooth controller the daemon drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BluetoothControllerState {
    /// Controller is gone; the daemon cannot do anything
    Detached,
    /// Controller is resetting
    Resetting,
    /// Controller is working
    Attached,
}

impl BluetoothControllerState {
    /// Decode the wire value
    #[must_use]
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Detached),
            1 => Some(Self::Resetting),
            2 => Some(Self::Attached),
            _ => None,
        }
    }
}

/// Latency/power trade-off requested for a button channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyMode {
    /// Default latency
    Normal,
    /// Lower latency, higher power draw
    Low,
    /// Higher latency, lower power draw
    High,
}

impl LatencyMode {
    /// Encode for the wire
    #[must_use]
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Low => 1,
            Self::High => 2,
        }
    }
}

/// A command sent to the button daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request daemon info, including the verified button list
    GetInfo,

    /// Open a connection channel to a verified button
    CreateConnectionChannel {
        /// Caller-chosen channel identifier
        conn_id: u32,
        /// Address of the button
        bd_addr: BdAddr,
        /// Latency/power trade-off
        latency_mode: LatencyMode,
        /// Seconds of inactivity before disconnect, or -1 to stay connected
        auto_disconnect_time: i16,
    },

    /// Close a connection channel
    RemoveConnectionChannel {
        /// Identifier passed when the channel was created
        conn_id: u32,
    },
}

/// An event received from the button daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Answer to a channel creation request
    CreateConnectionChannelResponse {
        /// Channel identifier from the request
        conn_id: u32,
        /// Zero on success
        error: u8,
        /// Channel status at creation time
        connection_status: Option<ConnectionStatus>,
    },

    /// A channel's connection status changed
    ConnectionStatusChanged {
        /// Channel identifier
        conn_id: u32,
        /// New status
        connection_status: Option<ConnectionStatus>,
        /// Reason for a disconnect, when applicable
        disconnect_reason: u8,
    },

    /// A channel was removed, by request or by the daemon
    ConnectionChannelRemoved {
        /// Channel identifier
        conn_id: u32,
        /// Why the channel went away
        removed_reason: u8,
    },

    /// A button was clicked or held
    ButtonClickOrHold {
        /// Channel the click arrived on
        conn_id: u32,
        /// Kind of gesture
        click_type: ClickType,
        /// Whether the click was queued while the button was offline
        was_queued: bool,
        /// Seconds since the click physically happened
        time_diff: i32,
    },

    /// A new button completed verification and can be connected to
    NewVerifiedButton {
        /// Address of the button
        bd_addr: BdAddr,
    },

    /// Answer to a [`Command::GetInfo`]
    GetInfoResponse {
        /// Current controller state
        bluetooth_controller_state: Option<BluetoothControllerState>,
        /// Address of the daemon's controller
        my_bd_addr: BdAddr,
        /// Address type of the controller
        my_bd_addr_type: u8,
        /// Max pending connections the controller supports
        max_pending_connections: u8,
        /// Max concurrent channels, or -1 for unknown
        max_concurrent_connection_channels: i16,
        /// Pending connections right now
        current_pending_connections: u8,
        /// Whether the controller is out of connection slots
        currently_no_space: bool,
        /// Every button the daemon has verified
        verified_buttons: Vec<BdAddr>,
    },

    /// The controller ran out of connection slots
    NoSpaceForNewConnection {
        /// Max concurrently connected buttons
        max_concurrently_connected_buttons: u8,
    },

    /// A connection slot opened up again
    GotSpaceForNewConnection {
        /// Max concurrently connected buttons
        max_concurrently_connected_buttons: u8,
    },

    /// The Bluetooth controller changed state
    BluetoothControllerStateChange {
        /// New state
        state: Option<BluetoothControllerState>,
    },

    /// An event this client does not care about
    Unknown {
        /// Wire opcode of the event
        opcode: u8,
    },
}
