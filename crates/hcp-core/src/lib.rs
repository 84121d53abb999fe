//! # hcp-core
//!
//! Shared protocol library for HCP, the request/response and notification
//! protocol spoken between hardware-control clients and an HCP server over a
//! single WebSocket connection.
//!
//! This crate has zero dependencies on sockets, runtimes, or OS APIs.  It only
//! knows how packets look and how they travel as bytes.
//!
//! # Architecture overview (for beginners)
//!
//! Every unit of HCP traffic is a [`Packet`]:
//!
//! - an **address** (`"hw,control"`, `"meta,welcome"`, ...) made of a channel
//!   and an operation, used to route the packet;
//! - a **header**, a JSON object of metadata.  Requests carry a `requestId`
//!   that the server echoes back so responses can be matched to requests;
//! - a **body**, any JSON value specific to the operation.
//!
//! The crate is split into:
//!
//! - **`protocol::packet`** – the `Packet` and `Address` types.
//! - **`protocol::codec`** – turning packets into wire bytes and back.
//! - **`protocol::command`** – parsing caller-supplied hardware commands such
//!   as `"wiseXboard.digitalRead"` before they become request packets.
//! - **`protocol::request_id`** – generating unique request ids.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `hcp_core::Packet` instead of `hcp_core::protocol::packet::Packet`.
pub use protocol::codec::{decode, encode, CodecError, DecodeError};
pub use protocol::command::{CommandError, HwCommand, ParsedCommand, StructuredCommand};
pub use protocol::packet::{Address, AddressError, Header, Notification, Packet};
pub use protocol::request_id::{next_request_id, RequestIdGenerator};
