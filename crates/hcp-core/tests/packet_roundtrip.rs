//! Integration tests for the hcp-core packet codec.
//!
//! These tests go through the public API only, exercising the packet model,
//! codec, command parsing and request ids together the way the client crate
//! uses them.

use hcp_core::{
    decode, encode,
    protocol::{
        codec::{encode_parts, hello_packet},
        command::HwCommand,
        packet::{Address, Header, HEADER_REQUEST_ID},
    },
    next_request_id, DecodeError, Packet,
};
use serde_json::{json, Value};

/// Encodes a packet and decodes it again.
fn roundtrip(packet: &Packet) -> Packet {
    let bytes = encode(packet).expect("encode must succeed");
    decode(&bytes).expect("decode must succeed")
}

fn header(pairs: &[(&str, Value)]) -> Header {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_roundtrip_request_and_response_packets() {
    let request = Packet::new(
        Address::hw_control(),
        header(&[("hwId", json!("wiseXboard")), ("requestId", json!("r1"))]),
        Some(json!({"hwId": "wiseXboard", "cmd": "digitalRead", "args": [1]})),
    );
    let response = Packet::new(
        Address::hw_control(),
        header(&[("requestId", json!("r1"))]),
        Some(json!({"value": 1})),
    );

    assert_eq!(roundtrip(&request), request);
    assert_eq!(roundtrip(&response), response);
    assert_eq!(roundtrip(&response).request_id(), Some("r1"));
}

#[test]
fn test_roundtrip_packets_without_header_or_body() {
    let welcome = Packet::new(Address::welcome(), Header::new(), None);
    assert_eq!(roundtrip(&welcome), welcome);
    assert_eq!(roundtrip(&hello_packet()), hello_packet());
}

#[test]
fn test_roundtrip_nested_and_scalar_bodies() {
    let bodies = [
        json!(null),
        json!(42),
        json!("text with \n newline and , comma"),
        json!([1, "two", {"three": [3.5]}]),
        json!({"unicode": "핀 값", "nested": {"deep": {"list": [true, false]}}}),
    ];
    for body in bodies {
        let packet = Packet::new(
            Address::new("hw", "firmata-value").unwrap(),
            header(&[("seq", json!(7))]),
            Some(body),
        );
        assert_eq!(roundtrip(&packet), packet);
    }
}

#[test]
fn test_encode_parts_matches_encode() {
    let packet = Packet::new(
        Address::meta_cmd(),
        header(&[("requestId", json!("m1"))]),
        Some(json!({"cmd": "version", "args": []})),
    );

    let from_parts = encode_parts(packet.address(), packet.header(), packet.body()).unwrap();

    assert_eq!(from_parts, encode(&packet).unwrap());
}

#[test]
fn test_parsed_command_builds_decodable_request() {
    // Arrange: resolve a command the way the client does before sending.
    let parsed = HwCommand::from("wiseXboard.digitalRead")
        .parse(vec![json!(1)])
        .unwrap();
    let request_id = next_request_id();
    let packet = Packet::new(
        Address::hw_control(),
        header(&[
            ("hwId", json!(parsed.target)),
            (HEADER_REQUEST_ID, json!(request_id)),
        ]),
        Some(json!({"hwId": parsed.target, "cmd": parsed.command, "args": parsed.args})),
    );

    // Act
    let decoded = roundtrip(&packet);

    // Assert
    assert_eq!(decoded.request_id(), Some(request_id.as_str()));
    assert_eq!(decoded.body().unwrap()["cmd"], "digitalRead");
}

#[test]
fn test_malformed_frames_never_panic() {
    let frames: [&[u8]; 8] = [
        b"",
        b"\n",
        b"hw\n{}",
        b"hw,control,x\n{}",
        b"hw,control\n",
        b"hw,control\n{\"body\":",
        b"hw,control\n\"string\"",
        &[0xC3, 0x28, b'\n', b'{', b'}'],
    ];
    for frame in frames {
        assert!(decode(frame).is_err(), "frame {frame:?} must not decode");
    }
}

#[test]
fn test_missing_address_reported_distinctly() {
    assert_eq!(decode(b"{}"), Err(DecodeError::MissingAddress));
}
