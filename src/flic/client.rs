//! Client for the Flic button daemon
//!
//! Connects to flicd over TCP, opens a connection channel for every
//! verified button, and forwards click gestures onto the control channel.

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::controller::ControlEvent;
use crate::error::CastError;
use crate::flic::codec::FlicCodec;
use crate::flic::types::{
    BdAddr, BluetoothControllerState, ClickType, Command, Event, LatencyMode,
};

/// Seconds of button inactivity before the daemon drops the link; the
/// channel stays registered and reconnects on the next press.
const AUTO_DISCONNECT_TIME: i16 = 511;

/// How long a graceful close waits for the daemon to confirm channel
/// removal before giving up.
const CHANNEL_REMOVAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection to a running flicd instance
pub struct FlicClient {
    framed: Framed<TcpStream, FlicCodec>,
    /// Established channels, by our conn id
    channels: HashMap<u32, BdAddr>,
    /// Channels requested but not yet confirmed
    pending: HashMap<u32, BdAddr>,
    next_conn_id: u32,
}

impl FlicClient {
    /// Connect to flicd at `address` (host:port)
    ///
    /// # Errors
    ///
    /// Returns [`CastError::ButtonClient`] when the daemon is unreachable.
    pub async fn connect(address: &str) -> Result<Self, CastError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| CastError::ButtonClient {
                message: format!("failed to connect to flicd at {address}: {e}"),
            })?;
        info!("Connected to flicd at {address}");
        Ok(Self {
            framed: Framed::new(stream, FlicCodec),
            channels: HashMap::new(),
            pending: HashMap::new(),
            next_conn_id: 0,
        })
    }

    /// Drive the daemon connection until shutdown is signalled
    ///
    /// Requests the verified button list up front, opens a channel per
    /// button (and for any button verified later), and forwards click
    /// gestures as [`ControlEvent::ButtonClicked`]. A detached Bluetooth
    /// controller or a closed socket is reported as
    /// [`ControlEvent::FatalError`]. On shutdown the channels are removed
    /// and their confirmations awaited, bounded by a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the daemon closes the connection or sends a
    /// frame that cannot be decoded.
    pub async fn run(
        mut self,
        events: mpsc::Sender<ControlEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), CastError> {
        self.framed.send(Command::GetInfo).await?;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender means the bridge is gone; close too.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                frame = self.framed.next() => match frame {
                    Some(Ok(event)) => self.handle_event(event, &events).await?,
                    Some(Err(e)) => {
                        let _ = events
                            .send(ControlEvent::FatalError {
                                message: format!("flicd sent an undecodable frame: {e}"),
                            })
                            .await;
                        return Err(e);
                    }
                    None => {
                        let _ = events
                            .send(ControlEvent::FatalError {
                                message: "flicd closed the connection".to_string(),
                            })
                            .await;
                        return Err(CastError::ButtonClient {
                            message: "flicd closed the connection".to_string(),
                        });
                    }
                },
            }
        }

        self.close().await
    }

    async fn handle_event(
        &mut self,
        event: Event,
        events: &mpsc::Sender<ControlEvent>,
    ) -> Result<(), CastError> {
        match event {
            Event::GetInfoResponse {
                bluetooth_controller_state,
                verified_buttons,
                ..
            } => {
                info!(
                    "flicd reports {} verified button(s), controller {:?}",
                    verified_buttons.len(),
                    bluetooth_controller_state
                );
                if bluetooth_controller_state == Some(BluetoothControllerState::Detached) {
                    let _ = events
                        .send(ControlEvent::FatalError {
                            message: "bluetooth controller is detached".to_string(),
                        })
                        .await;
                    return Ok(());
                }
                for bd_addr in verified_buttons {
                    self.open_channel(bd_addr).await?;
                }
            }

            Event::NewVerifiedButton { bd_addr } => {
                info!("New verified button {bd_addr}");
                self.open_channel(bd_addr).await?;
            }

            Event::CreateConnectionChannelResponse {
                conn_id,
                error,
                connection_status,
            } => match self.pending.remove(&conn_id) {
                Some(bd_addr) if error == 0 => {
                    debug!(
                        "Connection channel {conn_id} to {bd_addr} established \
                         (status {connection_status:?})"
                    );
                    self.channels.insert(conn_id, bd_addr);
                }
                Some(bd_addr) => {
                    warn!("Connection channel to {bd_addr} refused (error {error})");
                }
                None => {
                    warn!("Response for unknown connection channel {conn_id}");
                }
            },

            Event::ConnectionStatusChanged {
                conn_id,
                connection_status,
                ..
            } => {
                debug!("Connection channel {conn_id} is now {connection_status:?}");
            }

            Event::ConnectionChannelRemoved {
                conn_id,
                removed_reason,
            } => {
                if let Some(bd_addr) = self.channels.remove(&conn_id) {
                    debug!("Connection channel to {bd_addr} removed (reason {removed_reason})");
                }
            }

            Event::ButtonClickOrHold {
                conn_id,
                click_type,
                was_queued,
                time_diff,
            } => {
                if click_type != ClickType::ButtonClick {
                    return Ok(());
                }
                let Some(bd_addr) = self.channels.get(&conn_id) else {
                    warn!("Click on unknown connection channel {conn_id}");
                    return Ok(());
                };
                let age = Duration::from_secs(u64::try_from(time_diff).unwrap_or(0));
                let _ = events
                    .send(ControlEvent::ButtonClicked {
                        address: bd_addr.to_string(),
                        was_queued,
                        age,
                    })
                    .await;
            }

            Event::BluetoothControllerStateChange { state } => {
                info!("Bluetooth controller state changed to {state:?}");
                if state == Some(BluetoothControllerState::Detached) {
                    let _ = events
                        .send(ControlEvent::FatalError {
                            message: "bluetooth controller detached".to_string(),
                        })
                        .await;
                }
            }

            Event::NoSpaceForNewConnection {
                max_concurrently_connected_buttons,
            } => {
                warn!(
                    "No space for new button connections \
                     (max {max_concurrently_connected_buttons})"
                );
            }

            Event::GotSpaceForNewConnection { .. } => {
                debug!("Connection space available again");
            }

            Event::Unknown { opcode } => {
                debug!("Ignoring flicd event with opcode {opcode}");
            }
        }
        Ok(())
    }

    async fn open_channel(&mut self, bd_addr: BdAddr) -> Result<(), CastError> {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        self.pending.insert(conn_id, bd_addr);
        debug!("Opening connection channel {conn_id} to {bd_addr}");
        self.framed
            .send(Command::CreateConnectionChannel {
                conn_id,
                bd_addr,
                latency_mode: LatencyMode::Normal,
                auto_disconnect_time: AUTO_DISCONNECT_TIME,
            })
            .await
    }

    async fn close(mut self) -> Result<(), CastError> {
        info!(
            "Removing {} button connection channel(s)",
            self.channels.len()
        );
        self.pending.clear();
        for conn_id in self.channels.keys().copied().collect::<Vec<_>>() {
            self.framed
                .send(Command::RemoveConnectionChannel { conn_id })
                .await?;
        }

        let deadline = tokio::time::Instant::now() + CHANNEL_REMOVAL_TIMEOUT;
        while !self.channels.is_empty() {
            let frame = tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    warn!(
                        "Gave up waiting for {} channel removal(s)",
                        self.channels.len()
                    );
                    break;
                }
                frame = self.framed.next() => frame,
            };
            match frame {
                Some(Ok(Event::ConnectionChannelRemoved { conn_id, .. })) => {
                    self.channels.remove(&conn_id);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        info!("flicd connection closed");
        Ok(())
    }
}
