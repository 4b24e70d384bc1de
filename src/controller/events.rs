//! The single control-event type every trigger source funnels into

use std::time::Duration;

use crate::types::PlayerState;

/// One event on the serial control channel
///
/// Button clicks, status polls, the rescan timer, fatal error reports and
/// shutdown signals all become `ControlEvent`s; the bridge loop is the only
/// consumer, which serializes every state mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// A button was clicked
    ButtonClicked {
        /// Bluetooth address of the button, formatted `aa:bb:cc:dd:ee:ff`
        address: String,
        /// Whether the click was queued while the button was offline
        was_queued: bool,
        /// How long ago the click physically happened
        age: Duration,
    },

    /// The status watcher observed a player state on the active session
    PlayerStatus(PlayerState),

    /// The periodic rescan timer fired
    RescanDue,

    /// A collaborator failed in a way the process cannot recover from
    FatalError {
        /// Description of the failure
        message: String,
    },

    /// A shutdown signal was received
    Shutdown {
        /// Name of the signal, for logging
        signal: &'static str,
    },
}
