//! Domain layer for hcp-client.
//!
//! Plain types with no I/O: the client configuration, the connection state
//! enum, and the error types callers see.  Everything here can be built and
//! inspected in tests without a runtime or a socket.

pub mod config;
pub mod error;
pub mod state;

pub use config::{ClientConfig, ConfigError};
pub use error::HcpError;
pub use state::ConnectionState;
