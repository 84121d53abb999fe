//! Session: owns one transport connection at a time and pumps its events.
//!
//! # How a connection runs
//!
//! ```text
//!  start() ──▶ Transport::open(events_tx) ──▶ TransportLink (kept for sends)
//!                         │
//!                         ▼ events_rx
//!                  ┌─────────────┐
//!                  │  event pump │  one task per connection
//!                  └─────────────┘
//!     Open ──▶ Preparing + send meta,hello
//!     Message ──▶ decode ──▶ welcome? Connected ──▶ PacketBus::publish
//!     Error ──▶ log
//!     Close ──▶ stop()
//! ```
//!
//! Every transport event of a connection goes through the same pump task, so
//! state changes and packet dispatch happen in arrival order.
//!
//! # Generations
//!
//! Each `start()` gets a new generation number.  `stop()` clears the active
//! connection and aborts its pump; a pump that still wakes up afterwards sees
//! that its generation is no longer current and exits without touching the
//! state, the bus, or a newer connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use hcp_core::protocol::codec::{decode, encode, hello_packet};
use hcp_core::Packet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::application::bus::{PacketBus, PacketFilter, PacketSubscription};
use crate::application::state_machine::{ConnectionStateMachine, StateObserver};
use crate::domain::{ConnectionState, HcpError};
use crate::infrastructure::transport::{Frame, Transport, TransportEvent, TransportLink};

struct ActiveConnection {
    generation: u64,
    link: Arc<dyn TransportLink>,
    pump: JoinHandle<()>,
}

struct SessionShared {
    transport: Arc<dyn Transport>,
    state: ConnectionStateMachine,
    bus: PacketBus,
    active: Mutex<Option<ActiveConnection>>,
    generation: AtomicU64,
}

impl SessionShared {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Handles one event.  Returns `false` when the pump must stop.
    fn handle_event(&self, generation: u64, link: &dyn TransportLink, event: TransportEvent) -> bool {
        // Held until the event is fully applied, so a concurrent stop/start
        // cannot let this connection touch the next one's state or views.
        let active = self.lock_active();
        if !active.as_ref().is_some_and(|c| c.generation == generation) {
            debug!("event for stale connection #{generation} ignored");
            return false;
        }
        match event {
            TransportEvent::Open => {
                if self.state.on_transport_open() {
                    match encode(&hello_packet()) {
                        Ok(bytes) => link.send(Frame::Binary(bytes)),
                        Err(e) => warn!("could not encode meta,hello: {e}"),
                    }
                }
                true
            }
            TransportEvent::Message(bytes) => {
                self.dispatch(&bytes);
                true
            }
            TransportEvent::Error(reason) => {
                warn!("transport error on connection #{generation}: {reason}");
                true
            }
            TransportEvent::Close => {
                debug!("transport closed connection #{generation}");
                false
            }
        }
    }

    fn dispatch(&self, bytes: &[u8]) {
        let packet = match decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("dropping malformed packet ({} bytes): {e}", bytes.len());
                return;
            }
        };
        trace!(
            "inbound {packet} requestId={:?}",
            packet.request_id().unwrap_or("-")
        );
        if packet.is_welcome() {
            self.state.on_welcome();
        }
        self.bus.publish(&packet);
    }

    /// Tears down the active connection.  With `Some(generation)` only that
    /// connection is torn down.  Returns `true` if a connection was ended.
    fn teardown(&self, generation: Option<u64>) -> bool {
        let connection = {
            let mut active = self.lock_active();
            let matches = match (active.as_ref(), generation) {
                (Some(c), Some(g)) => c.generation == g,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !matches {
                return false;
            }
            let connection = active.take();
            let ended = self.bus.close_all();
            self.state.reset();
            debug!("connection torn down, {ended} views ended");
            connection
        };
        if let Some(connection) = connection {
            connection.link.close();
            connection.pump.abort();
        }
        true
    }
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(connection) = active.take() {
            connection.link.close();
            connection.pump.abort();
        }
    }
}

/// Exclusive owner of the transport, the lifecycle state and the packet bus
/// of one client.
///
/// Cheap to clone; clones control the same session.  Dropping the last clone
/// closes any open connection.
#[derive(Clone)]
pub struct HcpSession {
    shared: Arc<SessionShared>,
}

impl HcpSession {
    /// Creates an idle session that will connect through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                transport,
                state: ConnectionStateMachine::new(),
                bus: PacketBus::new(),
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Opens the transport and starts the event pump.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`HcpError::AlreadyStarted`] if a connection is connecting, preparing
    /// or connected.
    pub fn start(&self) -> Result<(), HcpError> {
        let shared = &self.shared;
        let mut active = shared.lock_active();
        shared.state.begin_connect()?;

        let generation = shared.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link: Arc<dyn TransportLink> = Arc::from(shared.transport.open(events_tx));
        let pump = tokio::spawn(run_pump(
            Arc::downgrade(shared),
            generation,
            Arc::clone(&link),
            events_rx,
        ));
        debug!("connection #{generation} opening");

        *active = Some(ActiveConnection {
            generation,
            link,
            pump,
        });
        Ok(())
    }

    /// Closes the connection, ends every bus view and resets the state to
    /// `Disconnected`.  Safe to call in any state, any number of times.
    pub fn stop(&self) {
        self.shared.teardown(None);
    }

    /// Encodes and sends `packet`.  Without an active connection the packet
    /// is dropped (debug log) and `Ok(())` is returned.
    ///
    /// # Errors
    ///
    /// [`HcpError::Codec`] if the packet cannot be encoded.
    pub fn send(&self, packet: &Packet) -> Result<(), HcpError> {
        let bytes = encode(packet)?;
        let link = self
            .shared
            .lock_active()
            .as_ref()
            .map(|c| Arc::clone(&c.link));
        match link {
            Some(link) => link.send(Frame::Binary(bytes)),
            None => debug!("send of {packet} ignored: not connected"),
        }
        Ok(())
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.current()
    }

    /// Replay-latest stream of lifecycle states.
    pub fn observe_state(&self) -> StateObserver {
        self.shared.state.observe()
    }

    /// Resolves once the session is in `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) {
        self.shared.state.wait_for(target).await;
    }

    /// Returns `true` while a connection is connecting, preparing or connected.
    pub fn is_active(&self) -> bool {
        self.shared.lock_active().is_some()
    }

    /// Attaches a view to the inbound packet sequence.
    pub fn subscribe(&self, filter: PacketFilter) -> PacketSubscription {
        self.shared.bus.subscribe(filter)
    }

    /// The session's packet bus.
    pub fn bus(&self) -> &PacketBus {
        &self.shared.bus
    }
}

impl std::fmt::Debug for HcpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HcpSession")
            .field("state", &self.state())
            .field("subscribers", &self.shared.bus.subscriber_count())
            .finish()
    }
}

async fn run_pump(
    shared: Weak<SessionShared>,
    generation: u64,
    link: Arc<dyn TransportLink>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(session) = shared.upgrade() else {
            return;
        };
        if !session.handle_event(generation, link.as_ref(), event) {
            session.teardown(Some(generation));
            return;
        }
    }
    // The transport dropped its sender without reporting `Close`.
    if let Some(session) = shared.upgrade() {
        debug!("event channel of connection #{generation} ended");
        session.teardown(Some(generation));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::MemoryTransport;
    use crate::infrastructure::transport::{EventSender, MockTransport, MockTransportLink};
    use hcp_core::protocol::packet::{Address, Header};
    use serde_json::json;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn connected_session() -> (HcpSession, MemoryTransport) {
        let server = MemoryTransport::new().auto_accept();
        let session = HcpSession::new(Arc::new(server.clone()));
        session.start().unwrap();
        tokio::time::timeout(
            Duration::from_secs(1),
            session.wait_for_state(ConnectionState::Connected),
        )
        .await
        .expect("handshake completes");
        (session, server)
    }

    fn hw_packet(operation: &str, value: i64) -> Packet {
        Packet::new(
            Address::new("hw", operation).unwrap(),
            Header::new(),
            Some(json!({ "type": operation, "value": value })),
        )
    }

    #[tokio::test]
    async fn test_open_sends_hello_once() {
        // Arrange: a mocked link that expects exactly one hello frame.
        let mut link = MockTransportLink::new();
        link.expect_send()
            .withf(|frame| {
                decode(frame.as_bytes())
                    .map(|p| p.channel() == "meta" && p.operation() == "hello")
                    .unwrap_or(false)
            })
            .times(1)
            .return_const(());
        link.expect_close().times(1).return_const(());

        let events_slot: Arc<Mutex<Option<EventSender>>> = Arc::default();
        let slot = Arc::clone(&events_slot);
        let mut transport = MockTransport::new();
        transport.expect_open().times(1).return_once(move |events| {
            *slot.lock().unwrap() = Some(events);
            Box::new(link)
        });

        let session = HcpSession::new(Arc::new(transport));

        // Act
        session.start().unwrap();
        assert_eq!(session.state(), ConnectionState::Connecting);
        let events = events_slot.lock().unwrap().clone().unwrap();
        events.send(TransportEvent::Open).unwrap();
        settle().await;

        // Assert
        assert_eq!(session.state(), ConnectionState::Preparing);
        session.stop();
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_welcome_completes_handshake() {
        let (session, server) = connected_session().await;

        let sent = server.sent_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address(), &Address::hello());
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_second_start_fails_with_already_started() {
        let server = MemoryTransport::new();
        let session = HcpSession::new(Arc::new(server.clone()));
        session.start().unwrap();

        let second = session.start();

        assert!(matches!(second, Err(HcpError::AlreadyStarted)));
        assert_eq!(server.open_count(), 1);
    }

    #[tokio::test]
    async fn test_inbound_packets_reach_bus_in_order() {
        let (session, server) = connected_session().await;
        let mut hw = session.subscribe(PacketFilter::Channel("hw".into()));

        for value in 0..3 {
            server.deliver_packet(&hw_packet("firmata-value", value));
        }

        for expected in 0..3 {
            let packet = hw.recv().await.unwrap();
            assert_eq!(packet.body().unwrap()["value"], json!(expected));
        }
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (session, server) = connected_session().await;
        let mut all = session.subscribe(PacketFilter::All);

        server.deliver(b"garbage".to_vec());
        server.deliver(b"hw,control\n{not json".to_vec());
        server.deliver(vec![0xff, 0xfe]);
        server.deliver_packet(&hw_packet("control", 1));

        let packet = all.recv().await.unwrap();
        assert_eq!(packet.operation(), "control");
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_end_session() {
        let (session, server) = connected_session().await;

        server.emit_error("hiccup");
        settle().await;

        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_server_close_resets_state_and_ends_views() {
        let (session, server) = connected_session().await;
        let mut view = session.subscribe(PacketFilter::All);

        server.close_connection();

        assert!(view.recv().await.is_none());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.is_active());
        assert_eq!(session.bus().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_safe_when_never_started() {
        let server = MemoryTransport::new();
        let session = HcpSession::new(Arc::new(server.clone()));

        session.stop();
        session.start().unwrap();
        session.stop();
        session.stop();

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(server.client_close_count(), 1);
    }

    #[tokio::test]
    async fn test_send_while_closed_is_ignored() {
        let server = MemoryTransport::new();
        let session = HcpSession::new(Arc::new(server.clone()));

        session.send(&hw_packet("control", 1)).unwrap();

        assert!(server.sent_frames().is_empty());
    }

    #[tokio::test]
    async fn test_restart_after_stop_opens_new_connection() {
        let (session, server) = connected_session().await;
        session.stop();

        session.start().unwrap();
        session.wait_for_state(ConnectionState::Connected).await;

        assert_eq!(server.open_count(), 2);
        assert_eq!(server.sent_packets().len(), 2, "one hello per connection");
    }

    #[tokio::test]
    async fn test_events_from_stale_connection_are_ignored() {
        // Arrange: capture the event sender of each connection.
        let senders: Arc<Mutex<Vec<EventSender>>> = Arc::default();
        let captured = Arc::clone(&senders);
        let mut transport = MockTransport::new();
        transport.expect_open().times(2).returning(move |events| {
            captured.lock().unwrap().push(events);
            let mut link = MockTransportLink::new();
            link.expect_send().return_const(());
            link.expect_close().return_const(());
            Box::new(link)
        });
        let session = HcpSession::new(Arc::new(transport));

        session.start().unwrap();
        session.stop();
        session.start().unwrap();

        // Act: the first connection reports late events.
        let old = senders.lock().unwrap()[0].clone();
        let _ = old.send(TransportEvent::Open);
        let _ = old.send(TransportEvent::Close);
        settle().await;

        // Assert
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_stale_welcome_cannot_reach_new_connection() {
        // Arrange: connection #1 is replaced by #2, which is still preparing.
        let server = MemoryTransport::new();
        let session = HcpSession::new(Arc::new(server.clone()));
        session.start().unwrap();
        session.stop();
        session.start().unwrap();
        server.open_connection();
        server.wait_for_sent(1).await;
        assert_eq!(session.state(), ConnectionState::Preparing);
        let mut all = session.subscribe(PacketFilter::All);
        let welcome = encode(&Packet::new(Address::welcome(), Header::new(), None)).unwrap();
        let stale_link = MockTransportLink::new();

        // Act: connection #1 reports a welcome after the restart.
        let keep_running = session
            .shared
            .handle_event(1, &stale_link, TransportEvent::Message(welcome));

        // Assert
        assert!(!keep_running);
        assert_eq!(session.state(), ConnectionState::Preparing);
        assert!(all.try_recv().is_none(), "stale packet must not be published");
    }

    #[tokio::test]
    async fn test_dropping_session_closes_connection() {
        let (session, server) = connected_session().await;

        drop(session);

        assert_eq!(server.client_close_count(), 1);
    }
}
