//! Host platform detection and Rust target triples.

pub mod arch;
pub mod os;
pub mod paths;

use std::fmt;

use arch::Arch;
use os::Os;
use serde::{Deserialize, Serialize};

/// Platform identifier combining architecture and OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Returns the Rust target triple for this platform (e.g., "x86_64-unknown-linux-gnu")
  pub fn target_triple(&self) -> TargetTriple {
    TargetTriple(format!("{}-{}", self.arch, self.os.triple_suffix()))
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.arch, self.os)
  }
}

/// A Rust target triple: architecture, vendor and OS ABI a harness is compiled for.
///
/// The triple is part of the artifact path convention
/// (`fuzz/target/<triple>/release/<name>`), so it is always passed to the fuzz
/// driver explicitly rather than left to the driver's host default.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetTriple(pub String);

impl TargetTriple {
  /// Triple of the machine running fuzzpack, if the platform is supported.
  pub fn host() -> Option<Self> {
    Platform::current().map(|p| p.target_triple())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// A triple must have at least `arch-vendor-os` and only path-safe characters.
  pub fn is_well_formed(&self) -> bool {
    self.0.split('-').count() >= 3
      && self
        .0
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
  }
}

impl fmt::Display for TargetTriple {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Returns the platform string for the current system (e.g., "x86_64-linux")
///
/// Returns `None` if the current platform is not supported
pub fn platform_string() -> Option<String> {
  Platform::current().map(|p| p.to_string())
}
