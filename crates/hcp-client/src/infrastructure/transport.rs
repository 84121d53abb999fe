//! The transport seam between the protocol engine and a concrete socket.
//!
//! A transport delivers four kinds of events, mirroring a WebSocket:
//!
//! | Event     | When                                   | Terminal? |
//! |-----------|----------------------------------------|-----------|
//! | `Open`    | once, after a successful connect       | no        |
//! | `Message` | once per inbound frame                 | no        |
//! | `Error`   | zero or more times, informational only | no        |
//! | `Close`   | at most once                           | yes       |
//!
//! Events are pushed onto an unbounded channel owned by the session, so the
//! transport never waits on the engine and the engine sees events in order.

use tokio::sync::mpsc;

/// An event reported by a transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open.
    Open,
    /// One complete inbound frame.
    Message(Vec<u8>),
    /// The connection is closed; no further events follow.
    Close,
    /// A non-fatal transport error, for diagnostics.
    Error(String),
}

/// An outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// The frame's payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }
}

/// Sender half handed to a transport when it opens a connection.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Factory for transport connections.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Starts opening a connection and returns immediately.
    ///
    /// Progress is reported on `events`: `Open` once connected, then
    /// `Message`s, and finally `Close` (also after a failed connect).
    fn open(&self, events: EventSender) -> Box<dyn TransportLink>;
}

/// Handle to one open (or opening) transport connection.
#[cfg_attr(test, mockall::automock)]
pub trait TransportLink: Send + Sync {
    /// Queues a frame for sending.  Never blocks; failures are reported as
    /// `TransportEvent::Error`.
    fn send(&self, frame: Frame);

    /// Closes the connection.  No events are delivered afterwards.
    fn close(&self);
}
