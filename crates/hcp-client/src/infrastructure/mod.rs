//! Infrastructure layer for hcp-client.
//!
//! Everything that touches a socket lives here:
//!
//! - `transport` – the `Transport`/`TransportLink` seam the engine talks to.
//! - `websocket` – the production transport (tokio-tungstenite client).
//! - `memory`    – an in-process server double for tests and demos.
//!
//! # What does NOT belong here?
//!
//! - Packet framing (that is `hcp-core`)
//! - Lifecycle, routing and request correlation (that is the application layer)

pub mod memory;
pub mod transport;
pub mod websocket;

pub use memory::MemoryTransport;
pub use transport::{EventSender, Frame, Transport, TransportEvent, TransportLink};
pub use websocket::WebSocketTransport;
