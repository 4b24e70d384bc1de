//! Framing and serialization for the button daemon's TCP protocol
//!
//! Every packet is a little-endian u16 length prefix followed by an opcode
//! byte and a little-endian payload.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CastError;
use crate::flic::types::{
    BdAddr, BluetoothControllerState, ClickType, Command, ConnectionStatus, Event,
};

const OPCODE_GET_INFO: u8 = 0;
const OPCODE_CREATE_CONNECTION_CHANNEL: u8 = 3;
const OPCODE_REMOVE_CONNECTION_CHANNEL: u8 = 4;

const EVT_CREATE_CONNECTION_CHANNEL_RESPONSE: u8 = 1;
const EVT_CONNECTION_STATUS_CHANGED: u8 = 2;
const EVT_CONNECTION_CHANNEL_REMOVED: u8 = 3;
const EVT_BUTTON_CLICK_OR_HOLD: u8 = 5;
const EVT_NEW_VERIFIED_BUTTON: u8 = 8;
const EVT_GET_INFO_RESPONSE: u8 = 9;
const EVT_NO_SPACE_FOR_NEW_CONNECTION: u8 = 10;
const EVT_GOT_SPACE_FOR_NEW_CONNECTION: u8 = 11;
const EVT_BLUETOOTH_CONTROLLER_STATE_CHANGE: u8 = 12;

/// Codec for the daemon's length-prefixed packets
#[derive(Debug, Default)]
pub struct FlicCodec;

impl Encoder<Command> for FlicCodec {
    type Error = CastError;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::new();
        match command {
            Command::GetInfo => {
                body.put_u8(OPCODE_GET_INFO);
            }
            Command::CreateConnectionChannel {
                conn_id,
                bd_addr,
                latency_mode,
                auto_disconnect_time,
            } => {
                body.put_u8(OPCODE_CREATE_CONNECTION_CHANNEL);
                body.put_u32_le(conn_id);
                body.put_slice(&bd_addr.to_wire());
                body.put_u8(latency_mode.to_wire());
                body.put_i16_le(auto_disconnect_time);
            }
            Command::RemoveConnectionChannel { conn_id } => {
                body.put_u8(OPCODE_REMOVE_CONNECTION_CHANNEL);
                body.put_u32_le(conn_id);
            }
        }

        let len = u16::try_from(body.len()).map_err(|_| CastError::ButtonProtocol {
            message: "command too large to frame".to_string(),
        })?;
        dst.reserve(2 + body.len());
        dst.put_u16_le(len);
        dst.put_slice(&body);
        Ok(())
    }
}

impl Decoder for FlicCodec {
    type Item = Event;
    type Error = CastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }
        let len = usize::from(u16::from_le_bytes([src[0], src[1]]));
        if src.len() < 2 + len {
            src.reserve(2 + len - src.len());
            return Ok(None);
        }

        src.advance(2);
        let mut frame = src.split_to(len);
        if frame.is_empty() {
            return Err(CastError::ButtonProtocol {
                message: "empty packet".to_string(),
            });
        }

        let opcode = frame.get_u8();
        decode_event(opcode, &mut frame).map(Some)
    }
}

fn decode_event(opcode: u8, frame: &mut BytesMut) -> Result<Event, CastError> {
    match opcode {
        EVT_CREATE_CONNECTION_CHANNEL_RESPONSE => {
            need(frame, 6, opcode)?;
            Ok(Event::CreateConnectionChannelResponse {
                conn_id: frame.get_u32_le(),
                error: frame.get_u8(),
                connection_status: ConnectionStatus::from_wire(frame.get_u8()),
            })
        }
        EVT_CONNECTION_STATUS_CHANGED => {
            need(frame, 6, opcode)?;
            Ok(Event::ConnectionStatusChanged {
                conn_id: frame.get_u32_le(),
                connection_status: ConnectionStatus::from_wire(frame.get_u8()),
                disconnect_reason: frame.get_u8(),
            })
        }
        EVT_CONNECTION_CHANNEL_REMOVED => {
            need(frame, 5, opcode)?;
            Ok(Event::ConnectionChannelRemoved {
                conn_id: frame.get_u32_le(),
                removed_reason: frame.get_u8(),
            })
        }
        EVT_BUTTON_CLICK_OR_HOLD => {
            need(frame, 10, opcode)?;
            let conn_id = frame.get_u32_le();
            let raw_click = frame.get_u8();
            let click_type =
                ClickType::from_wire(raw_click).ok_or_else(|| CastError::ButtonProtocol {
                    message: format!("unknown click type {raw_click}"),
                })?;
            Ok(Event::ButtonClickOrHold {
                conn_id,
                click_type,
                was_queued: frame.get_u8() != 0,
                time_diff: frame.get_i32_le(),
            })
        }
        EVT_NEW_VERIFIED_BUTTON => {
            need(frame, BdAddr::WIRE_LEN, opcode)?;
            Ok(Event::NewVerifiedButton {
                bd_addr: take_addr(frame),
            })
        }
        EVT_GET_INFO_RESPONSE => {
            need(frame, 15, opcode)?;
            let bluetooth_controller_state = BluetoothControllerState::from_wire(frame.get_u8());
            let my_bd_addr = take_addr(frame);
            let my_bd_addr_type = frame.get_u8();
            let max_pending_connections = frame.get_u8();
            let max_concurrent_connection_channels = frame.get_i16_le();
            let current_pending_connections = frame.get_u8();
            let currently_no_space = frame.get_u8() != 0;
            let count = usize::from(frame.get_u16_le());
            need(frame, count * BdAddr::WIRE_LEN, opcode)?;
            let verified_buttons = (0..count).map(|_| take_addr(frame)).collect();
            Ok(Event::GetInfoResponse {
                bluetooth_controller_state,
                my_bd_addr,
                my_bd_addr_type,
                max_pending_connections,
                max_concurrent_connection_channels,
                current_pending_connections,
                currently_no_space,
                verified_buttons,
            })
        }
        EVT_NO_SPACE_FOR_NEW_CONNECTION => {
            need(frame, 1, opcode)?;
            Ok(Event::NoSpaceForNewConnection {
                max_concurrently_connected_buttons: frame.get_u8(),
            })
        }
        EVT_GOT_SPACE_FOR_NEW_CONNECTION => {
            need(frame, 1, opcode)?;
            Ok(Event::GotSpaceForNewConnection {
                max_concurrently_connected_buttons: frame.get_u8(),
            })
        }
        EVT_BLUETOOTH_CONTROLLER_STATE_CHANGE => {
            need(frame, 1, opcode)?;
            Ok(Event::BluetoothControllerStateChange {
                state: BluetoothControllerState::from_wire(frame.get_u8()),
            })
        }
        other => {
            // Consume whatever payload the event carried.
            frame.clear();
            Ok(Event::Unknown { opcode: other })
        }
    }
}

fn need(frame: &BytesMut, bytes: usize, opcode: u8) -> Result<(), CastError> {
    if frame.remaining() < bytes {
        return Err(CastError::ButtonProtocol {
            message: format!(
                "event {opcode} truncated: need {bytes} bytes, have {}",
                frame.remaining()
            ),
        });
    }
    Ok(())
}

fn take_addr(frame: &mut BytesMut) -> BdAddr {
    let mut bytes = [0u8; BdAddr::WIRE_LEN];
    frame.copy_to_slice(&mut bytes);
    BdAddr::from_wire(bytes)
}
