//! HCP packet types.
//!
//! A packet is the unit of traffic in both directions.  Its address selects
//! routing, its header carries metadata (most importantly the `requestId` used
//! to correlate responses), and its body is an operation-specific JSON value.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Channel carrying hardware control requests, responses and notifications.
pub const CHANNEL_HW: &str = "hw";

/// Channel carrying the handshake and meta commands.
pub const CHANNEL_META: &str = "meta";

/// Operation of a hardware control request (`hw,control`).
pub const OP_CONTROL: &str = "control";

/// Operation of a meta command request (`meta,cmd`).
pub const OP_CMD: &str = "cmd";

/// Operation of the client's handshake packet (`meta,hello`).
pub const OP_HELLO: &str = "hello";

/// Operation of the server's handshake reply (`meta,welcome`).
pub const OP_WELCOME: &str = "welcome";

/// Header key holding the client-generated correlation token.
pub const HEADER_REQUEST_ID: &str = "requestId";

/// Header and body key naming the hardware a control request targets.
pub const HEADER_HW_ID: &str = "hwId";

/// Header metadata: a JSON object with string keys.
pub type Header = Map<String, Value>;

// ── Address ───────────────────────────────────────────────────────────────────

/// Errors raised when building an [`Address`] from invalid tokens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The channel or operation token is empty.
    #[error("address token must not be empty")]
    EmptyToken,

    /// A token contains the `,` separator or a line break.
    #[error("address token contains a reserved character: {0:?}")]
    ReservedCharacter(String),
}

/// The two-token routing address of a packet: `"<channel>,<operation>"`.
///
/// Both tokens are guaranteed non-empty and free of `,` and line breaks, so the
/// address always survives the wire encoding unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    channel: String,
    operation: String,
}

impl Address {
    /// Builds an address after validating both tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if either token is empty or contains a `,`,
    /// `\n` or `\r`.
    pub fn new(
        channel: impl Into<String>,
        operation: impl Into<String>,
    ) -> Result<Self, AddressError> {
        let channel = channel.into();
        let operation = operation.into();
        validate_token(&channel)?;
        validate_token(&operation)?;
        Ok(Self { channel, operation })
    }

    /// Parses the comma-joined wire form, e.g. `"hw,control"`.
    ///
    /// Exactly two non-empty tokens are required.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] when the text does not hold exactly two valid
    /// tokens.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let mut tokens = text.split(',');
        let channel = tokens.next().unwrap_or_default();
        let operation = tokens.next().ok_or(AddressError::EmptyToken)?;
        if tokens.next().is_some() {
            return Err(AddressError::ReservedCharacter(text.to_string()));
        }
        Self::new(channel, operation)
    }

    /// The `hw,control` address of hardware control requests.
    pub fn hw_control() -> Self {
        Self::fixed(CHANNEL_HW, OP_CONTROL)
    }

    /// The `meta,cmd` address of meta command requests.
    pub fn meta_cmd() -> Self {
        Self::fixed(CHANNEL_META, OP_CMD)
    }

    /// The `meta,hello` handshake address.
    pub fn hello() -> Self {
        Self::fixed(CHANNEL_META, OP_HELLO)
    }

    /// The `meta,welcome` handshake reply address.
    pub fn welcome() -> Self {
        Self::fixed(CHANNEL_META, OP_WELCOME)
    }

    /// Channel identifier, e.g. `"hw"`.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Operation name, e.g. `"control"`.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    // Only used for the protocol constants above, which are valid tokens.
    fn fixed(channel: &str, operation: &str) -> Self {
        Self {
            channel: channel.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.channel, self.operation)
    }
}

fn validate_token(token: &str) -> Result<(), AddressError> {
    if token.is_empty() {
        return Err(AddressError::EmptyToken);
    }
    if token.contains([',', '\n', '\r']) {
        return Err(AddressError::ReservedCharacter(token.to_string()));
    }
    Ok(())
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// An immutable unit of HCP traffic.
///
/// # Examples
///
/// ```rust
/// use hcp_core::{Address, Header, Packet};
/// use serde_json::json;
///
/// let mut header = Header::new();
/// header.insert("requestId".into(), json!("r1"));
/// let packet = Packet::new(Address::hw_control(), header, Some(json!({"value": 1})));
///
/// assert_eq!(packet.channel(), "hw");
/// assert_eq!(packet.request_id(), Some("r1"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    address: Address,
    header: Header,
    /// `None` when the packet has no body at all; `Some(Value::Null)` is an
    /// explicit JSON `null` body.
    body: Option<Value>,
}

impl Packet {
    /// Creates a packet from its three parts.
    pub fn new(address: Address, header: Header, body: Option<Value>) -> Self {
        Self {
            address,
            header,
            body,
        }
    }

    /// The routing address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Channel identifier, e.g. `"hw"`.
    pub fn channel(&self) -> &str {
        self.address.channel()
    }

    /// Operation name, e.g. `"control"`.
    pub fn operation(&self) -> &str {
        self.address.operation()
    }

    /// Header metadata.  Empty when the packet carried no header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Operation-specific payload, if any.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// The correlation token from the header.
    ///
    /// Returns `None` when the header has no `requestId` or it is not a string.
    pub fn request_id(&self) -> Option<&str> {
        self.header.get(HEADER_REQUEST_ID).and_then(Value::as_str)
    }

    /// Returns `true` for the server's `meta,welcome` handshake reply.
    pub fn is_welcome(&self) -> bool {
        self.channel() == CHANNEL_META && self.operation() == OP_WELCOME
    }

    /// Deserializes the body into a typed value.
    ///
    /// A missing body is treated as JSON `null`, so `Option<T>` targets accept
    /// body-less packets.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body does not match `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body)
    }

    /// Splits the packet back into its parts.
    pub fn into_parts(self) -> (Address, Header, Option<Value>) {
        (self.address, self.header, self.body)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.request_id() {
            Some(id) => write!(f, "{} (requestId={id})", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────────────────────

/// A typed view over an unsolicited hardware packet.
///
/// Servers tag notification bodies with a `type` (or `kind`) discriminator,
/// e.g. `{"type": "firmata-value", "kind": "button", "pin": 12, "value": "press"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Body `type`, else body `kind`, else the packet operation.
    pub kind: String,
    /// The full body (`Value::Null` when the packet had none).
    pub payload: Value,
}

impl Notification {
    /// Builds the notification view of a packet.
    pub fn from_packet(packet: &Packet) -> Self {
        let payload = packet.body().cloned().unwrap_or(Value::Null);
        let kind = ["type", "kind"]
            .iter()
            .find_map(|key| payload.get(key).and_then(Value::as_str))
            .unwrap_or_else(|| packet.operation())
            .to_string();
        Self { kind, payload }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
