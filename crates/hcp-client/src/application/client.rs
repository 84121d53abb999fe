//! Request/response coordinator: the public face of the engine.
//!
//! # Request lifecycle (for beginners)
//!
//! HCP multiplexes many requests over one socket.  The client tags every
//! request with a unique `requestId` header; the server echoes it back in the
//! response header.  A request therefore runs as:
//!
//! 1. **Validate** – the command is parsed first.  An invalid command returns
//!    [`HcpError::InvalidCommand`] and nothing is sent.
//! 2. **Subscribe** – a bus view filtered on the new request id is attached
//!    *before* sending, so a fast response cannot slip past.
//! 3. **Send** – the request packet is written to the session.
//! 4. **Race** – the first packet on the view wins against the request
//!    timeout (`ClientConfig::request_timeout_ms`, 7 s by default).
//! 5. **Release** – the view is dropped on every exit path, including when the
//!    caller drops the future.
//!
//! Later packets with the same id are not an error; they simply reach any
//! other subscriptions that match them.

use std::future::Future;
use std::sync::Arc;

use hcp_core::protocol::command::parse_meta_command;
use hcp_core::protocol::packet::{
    Address, Header, Packet, CHANNEL_HW, HEADER_HW_ID, HEADER_REQUEST_ID,
};
use hcp_core::{next_request_id, HwCommand};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::application::bus::{PacketFilter, PacketSubscription};
use crate::application::session::HcpSession;
use crate::application::state_machine::StateObserver;
use crate::domain::{ClientConfig, ConnectionState, HcpError};
use crate::infrastructure::transport::Transport;
use crate::infrastructure::websocket::WebSocketTransport;

/// An HCP client.  Cheap to clone; clones share one connection.
#[derive(Clone, Debug)]
pub struct HcpClient {
    config: ClientConfig,
    session: HcpSession,
}

impl HcpClient {
    /// A client that connects to `config.server_url` over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        let transport = WebSocketTransport::new(config.server_url.clone());
        Self::with_transport(config, Arc::new(transport))
    }

    /// A client that connects through `transport`.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            session: HcpSession::new(transport),
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying session.
    pub fn session(&self) -> &HcpSession {
        &self.session
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Starts connecting.  Returns once the transport is opening; use
    /// [`wait_for_connected`](Self::wait_for_connected) for the handshake.
    ///
    /// # Errors
    ///
    /// [`HcpError::AlreadyStarted`] if a connection is already active.
    pub fn connect(&self) -> Result<(), HcpError> {
        self.session.start()
    }

    /// Starts connecting and closes the client once `cancel` resolves.
    ///
    /// The watcher task ends by itself when the connection closes first.
    pub fn connect_until<F>(&self, cancel: F) -> Result<JoinHandle<()>, HcpError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.session.start()?;
        let mut states = self.session.observe_state();
        let client = self.clone();
        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = cancel => {
                    debug!("connect_until: cancelled, closing client");
                    client.close();
                }
                _ = states.wait_for(ConnectionState::Disconnected) => {}
            }
        }))
    }

    /// Closes the connection.  Idempotent.
    pub fn close(&self) {
        self.session.stop();
    }

    /// Returns `true` once the handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// The current lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Replay-latest stream of lifecycle states.
    pub fn observe_connection_state(&self) -> StateObserver {
        self.session.observe_state()
    }

    /// Resolves once the client is `Connected`.
    pub async fn wait_for_connected(&self) {
        self.session.wait_for_state(ConnectionState::Connected).await;
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    /// Sends a `hw,control` request and waits for its response.
    ///
    /// `command` is a dotted string (`"wiseXboard.digitalRead"`) or a
    /// [`StructuredCommand`](hcp_core::StructuredCommand), whose own `args`
    /// replace `args`.
    ///
    /// # Errors
    ///
    /// - [`HcpError::InvalidCommand`] before anything is sent.
    /// - [`HcpError::Timeout`] if no response arrives in time.
    /// - [`HcpError::ConnectionClosed`] if the connection closes first and
    ///   `fail_pending_on_close` is set.
    pub async fn request_hw_control(
        &self,
        command: impl Into<HwCommand>,
        args: Vec<Value>,
    ) -> Result<Packet, HcpError> {
        let parsed = command.into().parse(args)?;
        let request_id = next_request_id();

        let mut header = Header::new();
        header.insert(HEADER_HW_ID.to_string(), json!(parsed.target));
        header.insert(HEADER_REQUEST_ID.to_string(), json!(request_id));
        let body = json!({
            "hwId": parsed.target,
            "cmd": parsed.command,
            "args": parsed.args,
        });

        self.request(Packet::new(Address::hw_control(), header, Some(body)), request_id)
            .await
    }

    /// Sends a `meta,cmd` request and waits for its response.
    ///
    /// # Errors
    ///
    /// Same as [`request_hw_control`](Self::request_hw_control); an empty
    /// `command` is an invalid command.
    pub async fn request_meta_cmd(&self, command: &str, args: Vec<Value>) -> Result<Packet, HcpError> {
        let command = parse_meta_command(command)?;
        let request_id = next_request_id();

        let mut header = Header::new();
        header.insert(HEADER_REQUEST_ID.to_string(), json!(request_id));
        let body = json!({ "cmd": command, "args": args });

        self.request(Packet::new(Address::meta_cmd(), header, Some(body)), request_id)
            .await
    }

    /// Runs hardware commands one after another and collects the responses.
    ///
    /// Each command is sent only after the previous response arrived.
    /// Stops at the first error.
    pub async fn request_hw_batch(&self, commands: Vec<HwCommand>) -> Result<Vec<Packet>, HcpError> {
        let mut responses = Vec::with_capacity(commands.len());
        for command in commands {
            responses.push(self.request_hw_control(command, Vec::new()).await?);
        }
        Ok(responses)
    }

    async fn request(&self, packet: Packet, request_id: String) -> Result<Packet, HcpError> {
        let mut response = self
            .session
            .subscribe(PacketFilter::RequestId(request_id.clone()));
        debug!("request {request_id}: sending {packet}");
        self.session.send(&packet)?;

        let timeout = self.config.request_timeout();
        let fail_on_close = self.config.fail_pending_on_close;
        let outcome = tokio::time::timeout(timeout, async {
            match response.recv().await {
                Some(packet) => Some(packet),
                None if fail_on_close => None,
                // View ended by teardown: keep the uniform timeout failure.
                None => std::future::pending().await,
            }
        })
        .await;

        match outcome {
            Ok(Some(packet)) => Ok(packet),
            Ok(None) => Err(HcpError::ConnectionClosed { request_id }),
            Err(_) => {
                debug!("request {request_id}: timed out after {timeout:?}");
                Err(HcpError::Timeout {
                    request_id,
                    timeout,
                })
            }
        }
    }

    // ── Views ─────────────────────────────────────────────────────────────────

    /// Every inbound packet on the `hw` channel: notifications and responses.
    pub fn observe_hw_notifications(&self) -> PacketSubscription {
        self.observe_channel(CHANNEL_HW)
    }

    /// Every inbound packet on `channel`.
    pub fn observe_channel(&self, channel: &str) -> PacketSubscription {
        self.session.bus().by_channel(channel)
    }

    /// Every inbound packet on `channel` with `operation`.
    pub fn observe_operation(&self, channel: &str, operation: &str) -> PacketSubscription {
        self.session.bus().by_operation(channel, operation)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
