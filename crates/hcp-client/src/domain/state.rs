//! Connection lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one client connection.
///
/// ```text
/// Disconnected ──start()──▶ Connecting ──open──▶ Preparing ──welcome──▶ Connected
///      ▲                                                                    │
///      └──────────────────── stop() / close (from any state) ───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No transport is active.
    #[default]
    Disconnected,
    /// The transport is being opened.
    Connecting,
    /// The transport is open and the `meta,hello` handshake was sent.
    Preparing,
    /// The server answered with `meta,welcome`; requests may be issued.
    Connected,
}

impl ConnectionState {
    /// Returns `true` while a transport is active (any state but `Disconnected`).
    pub fn is_active(self) -> bool {
        self != ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Preparing => "PREPARING",
            ConnectionState::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}
