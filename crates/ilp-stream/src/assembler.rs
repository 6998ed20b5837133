use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
  #[error("data ending at offset {end} exceeds the receive window ending at {limit}")]
  WindowExceeded { end: u64, limit: u64 },

  #[error("offset {offset} plus {len} bytes overflows")]
  OffsetOverflow { offset: u64, len: usize },
}

/// Reassembles one stream's data from frames that may arrive out of order,
/// duplicated or overlapping.
///
/// At most `window` bytes past the read position are accepted, so buffered
/// data never exceeds the window.
#[derive(Debug, Clone)]
pub struct StreamAssembler {
  read_offset: u64,
  window: u64,
  /// Non-overlapping chunks keyed by start offset, all at or after `read_offset`.
  pending: BTreeMap<u64, Bytes>,
  buffered: u64,
}

impl StreamAssembler {
  pub fn new(window: u64) -> Self {
    Self {
      read_offset: 0,
      window,
      pending: BTreeMap::new(),
      buffered: 0,
    }
  }

  /// Bytes released so far.
  pub fn read_offset(&self) -> u64 {
    self.read_offset
  }

  /// Bytes held that cannot be released yet.
  pub fn buffered(&self) -> u64 {
    self.buffered
  }

  /// Highest offset the peer may send up to, as advertised in `StreamMaxData`.
  pub fn max_offset(&self) -> u64 {
    self.read_offset.saturating_add(self.window)
  }

  pub fn push(&mut self, offset: u64, data: Bytes) -> Result<(), AssembleError> {
    let end = offset
      .checked_add(data.len() as u64)
      .ok_or(AssembleError::OffsetOverflow {
        offset,
        len: data.len(),
      })?;
    if end <= self.read_offset {
      return Ok(());
    }
    let limit = self.max_offset();
    if end > limit {
      return Err(AssembleError::WindowExceeded { end, limit });
    }

    let start = offset.max(self.read_offset);
    let data = data.slice((start - offset) as usize..);

    let covered: Vec<(u64, u64)> = self
      .pending
      .range(..end)
      .map(|(chunk_start, chunk)| (*chunk_start, chunk_start + chunk.len() as u64))
      .filter(|(_, chunk_end)| *chunk_end > start)
      .collect();

    let mut cursor = start;
    for (chunk_start, chunk_end) in covered {
      if cursor < chunk_start {
        self.insert(cursor, data.slice((cursor - start) as usize..(chunk_start - start) as usize));
      }
      cursor = cursor.max(chunk_end);
    }
    if cursor < end {
      self.insert(cursor, data.slice((cursor - start) as usize..));
    }
    Ok(())
  }

  /// Take every byte that is now contiguous with the read position.
  pub fn read(&mut self) -> Bytes {
    let mut out = BytesMut::new();
    while let Some(chunk) = self.pending.remove(&self.read_offset) {
      self.read_offset += chunk.len() as u64;
      self.buffered -= chunk.len() as u64;
      out.extend_from_slice(&chunk);
    }
    out.freeze()
  }

  fn insert(&mut self, offset: u64, chunk: Bytes) {
    self.buffered += chunk.len() as u64;
    self.pending.insert(offset, chunk);
  }
}
