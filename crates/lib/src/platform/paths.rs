//! Cache and work directory resolution.
//!
//! Every location can be overridden through an environment variable so tests
//! and CI runners can isolate runs from one another.

use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the cache directory for the application.
///
/// Checks `FUZZPACK_CACHE_DIR` first, then the platform cache location.
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("FUZZPACK_CACHE_DIR") {
    return PathBuf::from(dir);
  }
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
    .join("Cache")
}

/// Returns the cache directory for the application.
///
/// Checks `FUZZPACK_CACHE_DIR` first, then `XDG_CACHE_HOME`, then `~/.cache`.
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("FUZZPACK_CACHE_DIR") {
    return PathBuf::from(dir);
  }
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the directory fresh build environments are created under.
///
/// Checks `FUZZPACK_WORK_DIR` first, then `<cache>/work`.
pub fn work_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("FUZZPACK_WORK_DIR") {
    return PathBuf::from(dir);
  }
  cache_dir().join("work")
}

/// Content-addressed download cache (`<cache>/downloads/<sha256>/<file>`).
pub fn downloads_dir() -> PathBuf {
  cache_dir().join("downloads")
}
