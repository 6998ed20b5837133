//! Interledger packet codec.
//!
//! ILP packets are OER-encoded: a one-byte type, then the packet body as a
//! variable-length octet string. Three types are understood:
//! - `Prepare` (12): amount, expiry, execution condition, destination, data
//! - `Fulfill` (13): fulfillment and data
//! - `Reject` (14): error code, triggering address, message and data
//!
//! [`Packet::decode`] accepts arbitrary bytes and reports malformed input as
//! a [`ParseError`]; it never panics.

pub mod address;
pub mod oer;
mod packet;

pub use address::{Address, AddressError};
pub use packet::{ErrorCode, Fulfill, Packet, PacketType, Prepare, Reject};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  #[error("unexpected end of input: needed {needed} more byte(s)")]
  UnexpectedEof { needed: usize },

  #[error("unknown packet type {0}")]
  UnknownType(u8),

  #[error("length prefix of {0} bytes is not supported")]
  LengthTooLong(usize),

  #[error("{0} trailing byte(s) after packet body")]
  TrailingBytes(usize),

  #[error("invalid timestamp: {0}")]
  InvalidTimestamp(String),

  #[error("invalid error code")]
  InvalidErrorCode,

  #[error(transparent)]
  Address(#[from] AddressError),
}
