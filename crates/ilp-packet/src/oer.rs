//! Octet Encoding Rules primitives.
//!
//! Lengths below 128 are a single byte. Longer lengths are `0x80 | n`
//! followed by `n` big-endian length bytes.

use bytes::{BufMut, BytesMut};

use crate::ParseError;

/// Largest length-of-length accepted when reading.
const MAX_LENGTH_BYTES: usize = 8;

/// A cursor over borrowed input.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
  buf: &'a [u8],
}

impl<'a> Reader<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    Self { buf }
  }

  pub fn remaining(&self) -> usize {
    self.buf.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buf.is_empty()
  }

  pub fn read_u8(&mut self) -> Result<u8, ParseError> {
    Ok(self.read_bytes(1)?[0])
  }

  pub fn read_u64(&mut self) -> Result<u64, ParseError> {
    let bytes = self.read_bytes(8)?;
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(out))
  }

  pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
    if self.buf.len() < len {
      return Err(ParseError::UnexpectedEof {
        needed: len - self.buf.len(),
      });
    }
    let (head, tail) = self.buf.split_at(len);
    self.buf = tail;
    Ok(head)
  }

  pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
    let mut out = [0u8; N];
    out.copy_from_slice(self.read_bytes(N)?);
    Ok(out)
  }

  pub fn read_length(&mut self) -> Result<usize, ParseError> {
    let first = self.read_u8()?;
    if first & 0x80 == 0 {
      return Ok(first as usize);
    }
    let count = (first & 0x7f) as usize;
    if count == 0 || count > MAX_LENGTH_BYTES {
      return Err(ParseError::LengthTooLong(count));
    }
    let mut length: u64 = 0;
    for byte in self.read_bytes(count)? {
      length = (length << 8) | u64::from(*byte);
    }
    usize::try_from(length).map_err(|_| ParseError::LengthTooLong(count))
  }

  pub fn read_var_octet_string(&mut self) -> Result<&'a [u8], ParseError> {
    let len = self.read_length()?;
    self.read_bytes(len)
  }

  /// Variable-length unsigned integer: a length-prefixed big-endian value of
  /// at most eight bytes.
  pub fn read_var_uint(&mut self) -> Result<u64, ParseError> {
    let bytes = self.read_var_octet_string()?;
    if bytes.is_empty() || bytes.len() > 8 {
      return Err(ParseError::LengthTooLong(bytes.len()));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
  }
}

pub fn write_length(buf: &mut BytesMut, len: usize) {
  if len < 128 {
    buf.put_u8(len as u8);
    return;
  }
  let bytes = (len as u64).to_be_bytes();
  let skip = bytes.iter().take_while(|b| **b == 0).count();
  buf.put_u8(0x80 | (8 - skip) as u8);
  buf.put_slice(&bytes[skip..]);
}

pub fn write_var_octet_string(buf: &mut BytesMut, data: &[u8]) {
  write_length(buf, data.len());
  buf.put_slice(data);
}

pub fn write_var_uint(buf: &mut BytesMut, value: u64) {
  let bytes = value.to_be_bytes();
  let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
  write_var_octet_string(buf, &bytes[skip..]);
}
