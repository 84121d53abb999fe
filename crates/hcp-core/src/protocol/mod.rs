//! Protocol module containing the packet model, wire codec, and command parsing.

pub mod codec;
pub mod command;
pub mod packet;
pub mod request_id;

pub use codec::{decode, encode, CodecError, DecodeError};
pub use packet::*;
pub use request_id::RequestIdGenerator;
