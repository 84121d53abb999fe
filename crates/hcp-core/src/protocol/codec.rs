//! Text codec for encoding and decoding HCP packets.
//!
//! Wire format (UTF-8 text):
//! ```text
//! <channel>,<operation>\n{"header":{...},"body":...}
//! ```
//! The first line is the address; everything after the first `\n` is a JSON
//! object.  An empty header and an absent body are omitted from the object, so
//! a bare handshake packet encodes as `meta,hello\n{}`.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::packet::{Address, AddressError, Header, Packet};

/// Separator between the address line and the JSON document.
const ADDRESS_TERMINATOR: char = '\n';

const KEY_HEADER: &str = "header";
const KEY_BODY: &str = "body";

/// Errors that can occur while decoding inbound bytes.
///
/// The engine never surfaces these to callers: a frame that fails to decode is
/// logged and dropped.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The frame is not valid UTF-8 text.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// The frame has no address line.
    #[error("frame has no address line")]
    MissingAddress,

    /// The address line is not exactly two non-empty comma-separated tokens.
    #[error("invalid address {text:?}: {source}")]
    InvalidAddress {
        text: String,
        #[source]
        source: AddressError,
    },

    /// The document after the address line is not valid JSON.
    #[error("malformed JSON document: {0}")]
    MalformedJson(String),

    /// The document parsed, but its shape is wrong (not an object, or a
    /// non-object header).
    #[error("unexpected document shape: {0}")]
    UnexpectedShape(&'static str),
}

/// Errors that can occur while encoding a packet.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The JSON document could not be serialized.
    #[error("failed to serialize packet document: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Packet`] into wire bytes.
///
/// # Errors
///
/// Returns [`CodecError`] if the JSON document cannot be serialized.
///
/// # Examples
///
/// ```rust
/// use hcp_core::{decode, encode, Address, Header, Packet};
/// use serde_json::json;
///
/// let packet = Packet::new(Address::hw_control(), Header::new(), Some(json!({"cmd": "digitalRead"})));
/// let bytes = encode(&packet).unwrap();
/// assert!(bytes.starts_with(b"hw,control\n"));
/// assert_eq!(decode(&bytes).unwrap(), packet);
/// ```
pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    encode_parts(packet.address(), packet.header(), packet.body())
}

/// Encodes a packet given as its three separate parts.
///
/// # Errors
///
/// Returns [`CodecError`] if the JSON document cannot be serialized.
pub fn encode_parts(
    address: &Address,
    header: &Header,
    body: Option<&Value>,
) -> Result<Vec<u8>, CodecError> {
    let mut document = Map::new();
    if !header.is_empty() {
        document.insert(KEY_HEADER.to_string(), Value::Object(header.clone()));
    }
    if let Some(body) = body {
        document.insert(KEY_BODY.to_string(), body.clone());
    }

    let json = serde_json::to_vec(&Value::Object(document))?;
    let prefix = address.to_string();

    let mut buf = Vec::with_capacity(prefix.len() + 1 + json.len());
    buf.extend_from_slice(prefix.as_bytes());
    buf.push(ADDRESS_TERMINATOR as u8);
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Decodes one [`Packet`] from a complete inbound frame.
///
/// # Errors
///
/// Returns [`DecodeError`] if the bytes are not UTF-8, lack a valid address
/// line, or carry a JSON document of the wrong shape.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;

    let (address_text, json_text) = text
        .split_once(ADDRESS_TERMINATOR)
        .ok_or(DecodeError::MissingAddress)?;

    // Tolerate CRLF framing from servers that write lines.
    let address_text = address_text.strip_suffix('\r').unwrap_or(address_text);
    if address_text.is_empty() {
        return Err(DecodeError::MissingAddress);
    }
    let address = Address::parse(address_text).map_err(|source| DecodeError::InvalidAddress {
        text: address_text.to_string(),
        source,
    })?;

    let document: Value =
        serde_json::from_str(json_text).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
    let Value::Object(mut document) = document else {
        return Err(DecodeError::UnexpectedShape("document is not a JSON object"));
    };

    let header = match document.remove(KEY_HEADER) {
        None | Some(Value::Null) => Header::new(),
        Some(Value::Object(header)) => header,
        Some(_) => return Err(DecodeError::UnexpectedShape("header is not a JSON object")),
    };
    let body = document.remove(KEY_BODY);

    Ok(Packet::new(address, header, body))
}

/// Builds the client's `meta,hello` handshake packet.
pub fn hello_packet() -> Packet {
    Packet::new(Address::hello(), Header::new(), None)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
