//! STREAM packets and in-order reassembly of stream data.
//!
//! A [`StreamPacket`] carries a list of [`Frame`]s. Data frames for one
//! stream can arrive in any order; [`StreamAssembler`] buffers them by
//! offset and releases bytes once they are contiguous, refusing data that
//! lies beyond its receive window.

mod assembler;
mod frame;
mod packet;

pub use assembler::{AssembleError, StreamAssembler};
pub use frame::{ErrorCode, Frame, FrameType};
pub use packet::{STREAM_VERSION, StreamPacket};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
  #[error(transparent)]
  Oer(#[from] ilp_packet::ParseError),

  #[error("unsupported STREAM version {0}")]
  UnsupportedVersion(u8),

  #[error("frame count {declared} exceeds what the packet can hold")]
  TooManyFrames { declared: u64 },

  #[error("frame message is not UTF-8")]
  InvalidMessage,
}
