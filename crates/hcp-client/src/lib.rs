//! hcp-client library crate.
//!
//! Client engine for HCP, the request/response and notification protocol
//! spoken with a hardware-control server over one persistent WebSocket.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Application code
//!         ↕  request_hw_control / request_meta_cmd / observe_*
//! [hcp-client]
//!   ├── domain/           Pure types: ClientConfig, ConnectionState, HcpError
//!   ├── application/      HcpClient → HcpSession → state machine + PacketBus
//!   └── infrastructure/
//!         ├── transport/  The Transport / TransportLink seam
//!         ├── websocket/  tokio-tungstenite client transport
//!         └── memory/     In-process transport for tests and demos
//!         ↕
//! HCP server  (text packets over WebSocket, default ws://127.0.0.1:13997)
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` depends on `domain`, `hcp-core` and the transport traits,
//!   never on a concrete socket.
//! - `infrastructure` owns every socket and runtime task that touches one.
//!
//! # Quick start
//!
//! ```ignore
//! let client = HcpClient::new(ClientConfig::default());
//! client.connect()?;
//! client.wait_for_connected().await;
//!
//! let response = client
//!     .request_hw_control("wiseXboard.digitalRead", vec![json!(1)])
//!     .await?;
//! println!("{:?}", response.body());
//! ```

/// Domain layer: configuration, lifecycle states and error types.
pub mod domain;

/// Application layer: lifecycle, routing and request correlation.
pub mod application;

/// Infrastructure layer: transports.
pub mod infrastructure;

pub use application::{
    HcpClient, HcpSession, PacketBus, PacketFilter, PacketSubscription, StateObserver,
};
pub use domain::{ClientConfig, ConfigError, ConnectionState, HcpError};
pub use infrastructure::{MemoryTransport, Transport, TransportEvent, TransportLink, WebSocketTransport};

// Packet types callers need to read responses and notifications.
pub use hcp_core::{HwCommand, Notification, Packet, StructuredCommand};
