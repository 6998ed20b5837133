//! ILP addresses.
//!
//! An address is a dot-separated list of segments, starting with a known
//! allocation scheme (`g.alice.wallet`). Segments use `[A-Za-z0-9_~-]` and
//! the whole address is at most 1023 bytes.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const MAX_ADDRESS_LEN: usize = 1023;

const SCHEMES: &[&str] = &[
  "g", "private", "example", "peer", "self", "test", "test1", "test2", "test3", "local",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
  #[error("address is {0} bytes, longer than {MAX_ADDRESS_LEN}")]
  TooLong(usize),

  #[error("address is not UTF-8")]
  NotUtf8,

  #[error("unknown allocation scheme {0:?}")]
  UnknownScheme(String),

  #[error("address needs at least two segments")]
  TooFewSegments,

  #[error("invalid segment {0:?}")]
  InvalidSegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
    let s = std::str::from_utf8(bytes).map_err(|_| AddressError::NotUtf8)?;
    s.parse()
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn scheme(&self) -> &str {
    self.0.split('.').next().unwrap_or_default()
  }

  /// Segments after the scheme.
  pub fn segments(&self) -> impl Iterator<Item = &str> {
    self.0.split('.').skip(1)
  }
}

impl FromStr for Address {
  type Err = AddressError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.len() > MAX_ADDRESS_LEN {
      return Err(AddressError::TooLong(s.len()));
    }
    let mut parts = s.split('.');
    let scheme = parts.next().unwrap_or_default();
    if !SCHEMES.contains(&scheme) {
      return Err(AddressError::UnknownScheme(scheme.to_string()));
    }
    let mut count = 0;
    for segment in parts {
      if segment.is_empty()
        || !segment
          .bytes()
          .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'~' || b == b'-')
      {
        return Err(AddressError::InvalidSegment(segment.to_string()));
      }
      count += 1;
    }
    if count == 0 {
      return Err(AddressError::TooFewSegments);
    }
    Ok(Self(s.to_string()))
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
