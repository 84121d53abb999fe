//! Message bus: live, filtered views over the inbound packet sequence.
//!
//! Every decoded inbound packet is published once to the [`PacketBus`], which
//! hands a clone to each subscriber whose [`PacketFilter`] matches.  The bus is
//! a broadcast, not a queue:
//!
//! - a packet reaches exactly the subscribers attached when it is published;
//! - every subscriber sees its packets in publish order, independently of the
//!   others;
//! - a subscriber attached later never sees earlier packets.
//!
//! Subscribers are unbounded channels, so a slow consumer never causes another
//! consumer to miss packets.  Dropping a [`PacketSubscription`] unregisters it
//! immediately; [`PacketBus::close_all`] ends every view at connection
//! teardown.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use hcp_core::Packet;
use tokio::sync::mpsc;

/// Selects which packets a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketFilter {
    /// Every packet.
    All,
    /// Packets on one channel, e.g. `"hw"`.
    Channel(String),
    /// Packets on one channel with one operation, e.g. `hw,firmata-value`.
    Operation { channel: String, operation: String },
    /// Packets whose header `requestId` equals the given id.
    RequestId(String),
}

impl PacketFilter {
    /// Returns `true` if `packet` passes the filter.
    pub fn matches(&self, packet: &Packet) -> bool {
        match self {
            PacketFilter::All => true,
            PacketFilter::Channel(channel) => packet.channel() == channel,
            PacketFilter::Operation { channel, operation } => {
                packet.channel() == channel && packet.operation() == operation
            }
            PacketFilter::RequestId(id) => packet.request_id() == Some(id.as_str()),
        }
    }
}

struct Subscriber {
    id: u64,
    filter: PacketFilter,
    tx: mpsc::UnboundedSender<Packet>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// In attach order.
    subscribers: Vec<Subscriber>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fan-out point for inbound packets.  Cheap to clone; clones share the
/// same subscriber registry.
#[derive(Clone, Default)]
pub struct PacketBus {
    registry: Arc<Mutex<Registry>>,
}

impl PacketBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new subscriber.
    pub fn subscribe(&self, filter: PacketFilter) -> PacketSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push(Subscriber {
            id,
            filter: filter.clone(),
            tx,
        });
        PacketSubscription {
            id,
            filter,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// All packets on `channel`.
    pub fn by_channel(&self, channel: &str) -> PacketSubscription {
        self.subscribe(PacketFilter::Channel(channel.to_string()))
    }

    /// All packets on `channel` with `operation`.
    pub fn by_operation(&self, channel: &str, operation: &str) -> PacketSubscription {
        self.subscribe(PacketFilter::Operation {
            channel: channel.to_string(),
            operation: operation.to_string(),
        })
    }

    /// All packets whose header `requestId` is `request_id`.
    pub fn by_request_id(&self, request_id: &str) -> PacketSubscription {
        self.subscribe(PacketFilter::RequestId(request_id.to_string()))
    }

    /// Delivers `packet` to every matching subscriber and returns how many
    /// received it.  Subscribers whose receiver is gone are pruned.
    pub fn publish(&self, packet: &Packet) -> usize {
        let mut delivered = 0;
        lock(&self.registry).subscribers.retain(|s| {
            if !s.filter.matches(packet) {
                return !s.tx.is_closed();
            }
            match s.tx.send(packet.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    /// Ends every current subscription and returns how many were ended.
    ///
    /// Packets already delivered stay readable; afterwards `recv` yields
    /// `None`.
    pub fn close_all(&self) -> usize {
        let ended = std::mem::take(&mut lock(&self.registry).subscribers);
        ended.len()
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

/// A live, filtered view of the inbound packet sequence.
///
/// Receive with [`recv`](Self::recv) or use it as a [`Stream`].  Dropping it
/// (or calling [`cancel`](Self::cancel)) unregisters it from the bus.
pub struct PacketSubscription {
    id: u64,
    filter: PacketFilter,
    rx: mpsc::UnboundedReceiver<Packet>,
    registry: Weak<Mutex<Registry>>,
}

impl PacketSubscription {
    /// Waits for the next matching packet.  Returns `None` once the view has
    /// ended (connection teardown) and all delivered packets were read.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Returns an already delivered packet without waiting.
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.rx.try_recv().ok()
    }

    /// The filter this view was created with.
    pub fn filter(&self) -> &PacketFilter {
        &self.filter
    }

    /// Unregisters the view.  Equivalent to dropping it.
    pub fn cancel(self) {}
}

impl std::fmt::Debug for PacketSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSubscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}

impl Stream for PacketSubscription {
    type Item = Packet;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Packet>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for PacketSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.retain(|s| s.id != self.id);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
