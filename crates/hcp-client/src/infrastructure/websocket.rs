//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each call to [`Transport::open`] spawns one socket task that:
//!
//! 1. Performs the WebSocket handshake with the HCP server.
//! 2. Reports `Open`, then multiplexes two directions with `tokio::select!`:
//!    - **Server → engine**: text and binary frames become `Message` events.
//!    - **Engine → server**: frames queued by [`WebSocketLink::send`] are
//!      written to the socket.
//! 3. Reports `Close` when the server closes the socket or the stream ends.
//!
//! WebSocket ping/pong is answered by tungstenite itself and never reaches the
//! engine.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, warn};

use crate::infrastructure::transport::{EventSender, Frame, Transport, TransportEvent, TransportLink};

/// Commands from the link handle to the socket task.
#[derive(Debug)]
enum Outgoing {
    Frame(Frame),
    Close,
}

/// Opens WebSocket connections to one server URL.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Creates a transport for `url` (e.g. `ws://127.0.0.1:13997`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The server URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, events: EventSender) -> Box<dyn TransportLink> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(self.url.clone(), events, outgoing_rx));
        Box::new(WebSocketLink {
            outgoing: outgoing_tx,
        })
    }
}

/// Handle to one socket task.
///
/// Frames sent before the handshake completes are queued and written once the
/// socket is open.
#[derive(Debug)]
pub struct WebSocketLink {
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl TransportLink for WebSocketLink {
    fn send(&self, frame: Frame) {
        if self.outgoing.send(Outgoing::Frame(frame)).is_err() {
            debug!("websocket send ignored: socket task has exited");
        }
    }

    fn close(&self) {
        // The task may already be gone after a server-side close.
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

impl From<Frame> for WsMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => WsMessage::Text(text),
            Frame::Binary(bytes) => WsMessage::Binary(bytes),
        }
    }
}

/// Drives one WebSocket connection until either side closes it.
async fn run_socket(
    url: String,
    events: EventSender,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            warn!("websocket connect to {url} failed: {e}");
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Close);
            return;
        }
    };

    debug!("websocket connected to {url}");
    let _ = events.send(TransportEvent::Open);

    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.into_bytes()));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    let _ = events.send(TransportEvent::Message(bytes));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("websocket closed by server: {frame:?}");
                    let _ = events.send(TransportEvent::Close);
                    break;
                }
                // Ping/Pong/raw frames are handled by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    // Reported, not terminal: a fatal error ends the stream and
                    // the next poll yields `None`.
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                }
                None => {
                    debug!("websocket stream to {url} ended");
                    let _ = events.send(TransportEvent::Close);
                    break;
                }
            },
            command = outgoing.recv() => match command {
                Some(Outgoing::Frame(frame)) => {
                    if let Err(e) = sink.send(frame.into()).await {
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                    }
                }
                // Local close: the session has already detached, so no `Close`
                // event is reported.
                Some(Outgoing::Close) | None => {
                    if let Err(e) = sink.close().await {
                        debug!("websocket close to {url} failed: {e}");
                    }
                    break;
                }
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_frame_converts_to_matching_ws_message() {
        assert_eq!(
            WsMessage::from(Frame::Text("hi".into())),
            WsMessage::Text("hi".into())
        );
        assert_eq!(
            WsMessage::from(Frame::Binary(vec![1, 2])),
            WsMessage::Binary(vec![1, 2])
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_error_then_close() {
        // Arrange: port 1 refuses connections immediately on loopback.
        let transport = WebSocketTransport::new("ws://127.0.0.1:1");
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Act
        let _link = transport.open(tx);

        // Assert
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event must arrive");
        assert!(matches!(first, Some(TransportEvent::Error(_))));
        let second = rx.recv().await;
        assert_eq!(second, Some(TransportEvent::Close));
    }

    #[tokio::test]
    async fn test_invalid_url_reports_close() {
        let transport = WebSocketTransport::new("not-a-url");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _link = transport.open(tx);

        let mut saw_close = false;
        while let Some(event) = rx.recv().await {
            if event == TransportEvent::Close {
                saw_close = true;
                break;
            }
        }
        assert!(saw_close);
    }

    #[tokio::test]
    async fn test_send_after_task_exit_is_ignored() {
        let transport = WebSocketTransport::new("ws://127.0.0.1:1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = transport.open(tx);

        // Wait for the task to give up.
        while let Some(event) = rx.recv().await {
            if event == TransportEvent::Close {
                break;
            }
        }

        // Must not panic.
        link.send(Frame::Text("late".into()));
        link.close();
    }
}
