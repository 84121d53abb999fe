//! Application layer for hcp-client.
//!
//! The application layer is the protocol engine proper: it knows *what* the
//! client does with packets, and delegates *how* bytes move to the
//! infrastructure layer.
//!
//! # Responsibilities
//!
//! - `state_machine` – the connection lifecycle and its replay-latest signal
//! - `bus`           – filtered live views over inbound packets
//! - `session`       – owning the transport connection and pumping its events
//! - `client`        – issuing requests and correlating their responses
//!
//! # What does NOT belong here?
//!
//! - Opening sockets (that is infrastructure)
//! - Byte-level framing (that is `hcp-core`)

pub mod bus;
pub mod client;
pub mod session;
pub mod state_machine;

pub use bus::{PacketBus, PacketFilter, PacketSubscription};
pub use client::HcpClient;
pub use session::HcpSession;
pub use state_machine::{ConnectionStateMachine, StateObserver};
