//! In-process transport for tests and demos.
//!
//! # Why an in-memory transport?
//!
//! The real [`WebSocketTransport`](super::websocket::WebSocketTransport) needs
//! a running HCP server.  `MemoryTransport` plays the server side inside the
//! test process instead:
//!
//! - the test decides when the connection opens, closes or errors;
//! - the test injects inbound frames (well-formed packets or garbage);
//! - every frame the client sends is recorded for assertions.
//!
//! # Usage in tests
//!
//! ```ignore
//! let server = MemoryTransport::new().auto_accept();
//! let client = HcpClient::with_transport(ClientConfig::default(), Arc::new(server.clone()));
//! client.connect()?;
//! client.wait_for_connected().await;
//!
//! let sent = server.wait_for_sent(2).await; // hello + the request
//! ```
//!
//! # `auto_accept` mode
//!
//! Without it, the connection stays in `Connecting` until the test calls
//! [`MemoryTransport::open_connection`].  With it, the connection opens at once
//! and every `meta,hello` is answered with `meta,welcome`.

use std::sync::{Arc, Mutex, MutexGuard};

use hcp_core::protocol::codec::{decode, encode};
use hcp_core::protocol::packet::{Address, Header, Packet, CHANNEL_META, OP_HELLO};
use tokio::sync::Notify;
use tracing::debug;

use crate::infrastructure::transport::{EventSender, Frame, Transport, TransportEvent, TransportLink};

#[derive(Default)]
struct MemoryState {
    /// Event channel of the current connection, `None` when closed.
    events: Option<EventSender>,
    /// Incremented on every `open`; links compare it to detect staleness.
    connection: u64,
    /// Raw frames sent by the client, across all connections.
    sent: Vec<Vec<u8>>,
    opens: usize,
    client_closes: usize,
    auto_accept: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<MemoryState>,
    sent_notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The server side of an in-process connection.  Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    /// A transport whose connections wait for [`Self::open_connection`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens connections immediately and answers `meta,hello` with
    /// `meta,welcome`.
    pub fn auto_accept(self) -> Self {
        self.shared.lock().auto_accept = true;
        self
    }

    /// Emits `Open` on the current connection.
    pub fn open_connection(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    /// Delivers raw bytes as one inbound frame.
    pub fn deliver(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.emit(TransportEvent::Message(bytes.into()))
    }

    /// Encodes and delivers a packet.
    pub fn deliver_packet(&self, packet: &Packet) -> bool {
        match encode(packet) {
            Ok(bytes) => self.deliver(bytes),
            Err(e) => {
                debug!("memory transport could not encode {packet}: {e}");
                false
            }
        }
    }

    /// Delivers the `meta,welcome` handshake reply.
    pub fn deliver_welcome(&self) -> bool {
        self.deliver_packet(&Packet::new(Address::welcome(), Header::new(), None))
    }

    /// Reports a non-fatal transport error.
    pub fn emit_error(&self, reason: &str) -> bool {
        self.emit(TransportEvent::Error(reason.to_string()))
    }

    /// Closes the connection from the server side (emits `Close`).
    pub fn close_connection(&self) -> bool {
        let events = self.shared.lock().events.take();
        match events {
            Some(events) => events.send(TransportEvent::Close).is_ok(),
            None => false,
        }
    }

    /// Returns `true` while a connection is open or opening.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().events.is_some()
    }

    /// Number of connections the client opened.
    pub fn open_count(&self) -> usize {
        self.shared.lock().opens
    }

    /// Number of times the client closed a connection.
    pub fn client_close_count(&self) -> usize {
        self.shared.lock().client_closes
    }

    /// Raw frames sent by the client so far.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent.clone()
    }

    /// Decodable packets sent by the client so far.
    pub fn sent_packets(&self) -> Vec<Packet> {
        self.sent_frames()
            .iter()
            .filter_map(|bytes| decode(bytes).ok())
            .collect()
    }

    /// Waits until the client has sent at least `count` packets, then
    /// returns all of them.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<Packet> {
        loop {
            let notified = self.shared.sent_notify.notified();
            tokio::pin!(notified);
            // Register before checking so a send in between is not missed.
            notified.as_mut().enable();

            let packets = self.sent_packets();
            if packets.len() >= count {
                return packets;
            }
            notified.await;
        }
    }

    fn emit(&self, event: TransportEvent) -> bool {
        match &self.shared.lock().events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }
}

impl Transport for MemoryTransport {
    fn open(&self, events: EventSender) -> Box<dyn TransportLink> {
        let mut state = self.shared.lock();
        state.connection += 1;
        state.opens += 1;
        if state.auto_accept {
            let _ = events.send(TransportEvent::Open);
        }
        state.events = Some(events);
        Box::new(MemoryLink {
            shared: Arc::clone(&self.shared),
            connection: state.connection,
        })
    }
}

/// Client-side handle of one in-memory connection.
struct MemoryLink {
    shared: Arc<Shared>,
    connection: u64,
}

impl TransportLink for MemoryLink {
    fn send(&self, frame: Frame) {
        {
            let mut state = self.shared.lock();
            if state.connection != self.connection || state.events.is_none() {
                debug!("memory transport: send on closed connection ignored");
                return;
            }
            let bytes = frame.as_bytes().to_vec();
            let is_hello = decode(&bytes)
                .map(|p| p.channel() == CHANNEL_META && p.operation() == OP_HELLO)
                .unwrap_or(false);
            state.sent.push(bytes);

            if is_hello && state.auto_accept {
                if let Ok(welcome) = encode(&Packet::new(Address::welcome(), Header::new(), None)) {
                    if let Some(events) = &state.events {
                        let _ = events.send(TransportEvent::Message(welcome));
                    }
                }
            }
        }
        self.shared.sent_notify.notify_waiters();
    }

    fn close(&self) {
        let mut state = self.shared.lock();
        if state.connection == self.connection && state.events.take().is_some() {
            state.client_closes += 1;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
