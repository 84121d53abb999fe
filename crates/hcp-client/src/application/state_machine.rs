//! Connection lifecycle state machine.
//!
//! # Transitions
//!
//! | From           | Trigger              | To             |
//! |----------------|----------------------|----------------|
//! | `Disconnected` | `begin_connect()`    | `Connecting`   |
//! | `Connecting`   | transport `Open`     | `Preparing`    |
//! | `Preparing`    | `meta,welcome`       | `Connected`    |
//! | any            | `reset()`            | `Disconnected` |
//!
//! `begin_connect()` in any other state fails with
//! [`HcpError::AlreadyStarted`].  An open or welcome arriving in the wrong
//! state is logged and ignored.
//!
//! # Observing the state (for beginners)
//!
//! The state is a *replay-latest* signal.  [`ConnectionStateMachine::observe`]
//! returns a [`StateObserver`] that first yields the current state and then
//! every later change, in order.  Changes are never coalesced: an observer that
//! falls behind still sees `Connecting`, `Preparing` and `Connected` one by
//! one.  This is why the machine keeps its own observer list instead of using
//! `tokio::sync::watch`, which only keeps the latest value.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{ConnectionState, HcpError};

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    observers: Vec<mpsc::UnboundedSender<ConnectionState>>,
}

impl Inner {
    fn transition(&mut self, to: ConnectionState) {
        debug!("connection state {} -> {}", self.state, to);
        self.state = to;
        self.observers.retain(|tx| tx.send(to).is_ok());
    }
}

/// Shared lifecycle state of one client.  Clones share the same state.
#[derive(Clone, Default)]
pub struct ConnectionStateMachine {
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionStateMachine {
    /// A machine in `Disconnected`.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The current state.
    pub fn current(&self) -> ConnectionState {
        self.lock().state
    }

    /// Returns an observer that yields the current state, then every change.
    pub fn observe(&self) -> StateObserver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // Same critical section as the registration: no change can slip in
        // between the replayed value and the first live one.
        let _ = tx.send(inner.state);
        inner.observers.retain(|observer| !observer.is_closed());
        inner.observers.push(tx);
        StateObserver { rx }
    }

    /// `Disconnected → Connecting`.
    pub fn begin_connect(&self) -> Result<(), HcpError> {
        let mut inner = self.lock();
        if inner.state.is_active() {
            return Err(HcpError::AlreadyStarted);
        }
        inner.transition(ConnectionState::Connecting);
        Ok(())
    }

    /// `Connecting → Preparing`.  Returns `true` if the transition happened.
    pub fn on_transport_open(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Connecting {
            warn!("transport opened in state {}; ignored", inner.state);
            return false;
        }
        inner.transition(ConnectionState::Preparing);
        true
    }

    /// `Preparing → Connected`.  Returns `true` if the transition happened.
    pub fn on_welcome(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Preparing {
            warn!("unexpected meta,welcome in state {}; ignored", inner.state);
            return false;
        }
        inner.transition(ConnectionState::Connected);
        true
    }

    /// Any state → `Disconnected`.  No change is emitted when already there.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Disconnected {
            inner.transition(ConnectionState::Disconnected);
        }
    }

    /// Resolves once the machine is in `target` (immediately if it already is).
    pub async fn wait_for(&self, target: ConnectionState) {
        let mut observer = self.observe();
        // The machine is alive for the duration of this call, so the observer
        // never ends before `target` is seen.
        observer.wait_for(target).await;
    }
}

/// A replay-latest stream of connection states.
#[derive(Debug)]
pub struct StateObserver {
    rx: mpsc::UnboundedReceiver<ConnectionState>,
}

impl StateObserver {
    /// The next state, or `None` once the machine is gone.
    pub async fn recv(&mut self) -> Option<ConnectionState> {
        self.rx.recv().await
    }

    /// Consumes states until `target` is seen.  Returns `false` if the machine
    /// was dropped first.
    pub async fn wait_for(&mut self, target: ConnectionState) -> bool {
        while let Some(state) = self.rx.recv().await {
            if state == target {
                return true;
            }
        }
        false
    }
}

impl Stream for StateObserver {
    type Item = ConnectionState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ConnectionState>> {
        self.rx.poll_recv(cx)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
