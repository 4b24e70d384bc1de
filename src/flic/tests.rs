use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::*;
use crate::error::CastError;

fn decode_one(bytes: &[u8]) -> Option<Event> {
    let mut codec = FlicCodec;
    let mut buf = BytesMut::from(bytes);
    codec.decode(&mut buf).unwrap()
}

#[test]
fn test_bd_addr_display_reverses_wire_order() {
    let addr = BdAddr::from_wire([0x3b, 0x32, 0x70, 0xda, 0xe4, 0x80]);
    assert_eq!(addr.to_string(), "80:e4:da:70:32:3b");
}

#[test]
fn test_bd_addr_parse_round_trips() {
    let addr: BdAddr = "80:e4:da:70:32:3b".parse().unwrap();
    assert_eq!(addr.to_wire(), [0x3b, 0x32, 0x70, 0xda, 0xe4, 0x80]);
    assert_eq!(addr.to_string().parse::<BdAddr>().unwrap(), addr);
}

#[test]
fn test_bd_addr_parse_rejects_garbage() {
    assert!("80:e4:da:70:32".parse::<BdAddr>().is_err());
    assert!("80:e4:da:70:32:3b:ff".parse::<BdAddr>().is_err());
    assert!("80:e4:da:70:32:zz".parse::<BdAddr>().is_err());
}

#[test]
fn test_encode_get_info() {
    let mut codec = FlicCodec;
    let mut buf = BytesMut::new();
    codec.encode(Command::GetInfo, &mut buf).unwrap();
    assert_eq!(buf.as_ref(), &[0x01, 0x00, 0x00]);
}

#[test]
fn test_encode_create_connection_channel() {
    let mut codec = FlicCodec;
    let mut buf = BytesMut::new();
    codec
        .encode(
            Command::CreateConnectionChannel {
                conn_id: 7,
                bd_addr: BdAddr::from_wire([1, 2, 3, 4, 5, 6]),
                latency_mode: LatencyMode::Normal,
                auto_disconnect_time: 511,
            },
            &mut buf,
        )
        .unwrap();

    // length 14 = opcode + conn_id(4) + addr(6) + latency(1) + timeout(2)
    assert_eq!(
        buf.as_ref(),
        &[
            0x0e, 0x00, // length
            0x03, // opcode
            0x07, 0x00, 0x00, 0x00, // conn_id
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, // bd_addr
            0x00, // latency mode
            0xff, 0x01, // auto disconnect time
        ]
    );
}

#[test]
fn test_decode_button_click() {
    let mut frame = BytesMut::new();
    frame.put_u16_le(11);
    frame.put_u8(5); // opcode
    frame.put_u32_le(3); // conn_id
    frame.put_u8(2); // ButtonClick
    frame.put_u8(1); // was_queued
    frame.put_i32_le(4); // time_diff

    let event = decode_one(&frame).unwrap();
    assert_eq!(
        event,
        Event::ButtonClickOrHold {
            conn_id: 3,
            click_type: ClickType::ButtonClick,
            was_queued: true,
            time_diff: 4,
        }
    );
}

#[test]
fn test_decode_waits_for_full_frame() {
    let mut codec = FlicCodec;
    let mut buf = BytesMut::new();
    buf.put_u16_le(11);
    buf.put_u8(5);
    buf.put_u32_le(3);
    // Payload arrives in a later read.
    assert!(codec.decode(&mut buf).unwrap().is_none());

    buf.put_u8(2);
    buf.put_u8(0);
    buf.put_i32_le(0);
    assert!(codec.decode(&mut buf).unwrap().is_some());
}

#[test]
fn test_decode_get_info_response_with_buttons() {
    let mut frame = BytesMut::new();
    frame.put_u8(9); // opcode
    frame.put_u8(2); // controller attached
    frame.put_slice(&[0xaa; 6]); // my_bd_addr
    frame.put_u8(0); // addr type
    frame.put_u8(32); // max pending
    frame.put_i16_le(5); // max concurrent channels
    frame.put_u8(0); // current pending
    frame.put_u8(0); // no space
    frame.put_u16_le(2); // verified count
    frame.put_slice(&[1, 2, 3, 4, 5, 6]);
    frame.put_slice(&[6, 5, 4, 3, 2, 1]);

    let mut packet = BytesMut::new();
    packet.put_u16_le(u16::try_from(frame.len()).unwrap());
    packet.put_slice(&frame);

    match decode_one(&packet).unwrap() {
        Event::GetInfoResponse {
            bluetooth_controller_state,
            verified_buttons,
            max_concurrent_connection_channels,
            ..
        } => {
            assert_eq!(
                bluetooth_controller_state,
                Some(BluetoothControllerState::Attached)
            );
            assert_eq!(max_concurrent_connection_channels, 5);
            assert_eq!(
                verified_buttons,
                vec![
                    BdAddr::from_wire([1, 2, 3, 4, 5, 6]),
                    BdAddr::from_wire([6, 5, 4, 3, 2, 1]),
                ]
            );
        }
        other => panic!("expected GetInfoResponse, got {other:?}"),
    }
}

#[test]
fn test_decode_unknown_opcode_is_tolerated() {
    let mut frame = BytesMut::new();
    frame.put_u16_le(4);
    frame.put_u8(200);
    frame.put_slice(&[1, 2, 3]);

    assert_eq!(decode_one(&frame).unwrap(), Event::Unknown { opcode: 200 });
}

#[test]
fn test_decode_truncated_event_is_an_error() {
    let mut codec = FlicCodec;
    let mut buf = BytesMut::new();
    buf.put_u16_le(3);
    buf.put_u8(5); // click event needs 10 payload bytes, only 2 follow
    buf.put_slice(&[0, 0]);

    assert!(matches!(
        codec.decode(&mut buf),
        Err(CastError::ButtonProtocol { .. })
    ));
}

#[test]
fn test_decode_two_packets_from_one_read() {
    let mut codec = FlicCodec;
    let mut buf = BytesMut::new();
    for _ in 0..2 {
        buf.put_u16_le(2);
        buf.put_u8(11); // got space
        buf.put_u8(4);
    }

    assert_eq!(
        codec.decode(&mut buf).unwrap().unwrap(),
        Event::GotSpaceForNewConnection {
            max_concurrently_connected_buttons: 4
        }
    );
    assert_eq!(
        codec.decode(&mut buf).unwrap().unwrap(),
        Event::GotSpaceForNewConnection {
            max_concurrently_connected_buttons: 4
        }
    );
    assert!(codec.decode(&mut buf).unwrap().is_none());
}
