//! FetchUrl step implementation.
//!
//! Downloads go through a content-addressed cache shared across runs
//! (`<downloads>/<sha256>/<file>`). A cached file is re-hashed before use, so
//! a corrupted cache entry is replaced rather than trusted. The verified file
//! is then copied into the environment's own `downloads/` directory.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::SignatureConfig;
use crate::execute::actions::signature::verify_signature;
use crate::execute::types::ExecuteError;

/// Execute a FetchUrl step.
///
/// # Arguments
///
/// * `url` - The URL to download from
/// * `expected_sha256` - The expected SHA256 hash (hex, any case)
/// * `signature` - Optional detached signature over the file
/// * `executable` - Mark the file executable in the environment
/// * `env_downloads` - The environment's `downloads/` directory
/// * `cache_dir` - The shared download cache
///
/// # Returns
///
/// The path to the file inside the environment.
pub async fn execute_fetch(
  url: &str,
  expected_sha256: &str,
  signature: Option<&SignatureConfig>,
  executable: bool,
  env_downloads: &Path,
  cache_dir: &Path,
) -> Result<PathBuf, ExecuteError> {
  info!(url = %url, "fetching URL");

  let expected = expected_sha256.to_ascii_lowercase();
  let filename = url_to_filename(url);
  let cache_entry = cache_dir.join(&expected);
  let cached_path = cache_entry.join(&filename);

  let bytes = match read_cached(&cached_path, &expected).await {
    Some(bytes) => {
      info!(path = ?cached_path, "using cached file");
      bytes
    }
    None => {
      let bytes = download(url).await?;
      let actual = hex::encode(Sha256::digest(&bytes));
      if actual != expected {
        return Err(ExecuteError::HashMismatch {
          url: url.to_string(),
          expected,
          actual,
        });
      }

      fs::create_dir_all(&cache_entry).await?;
      // Write then rename so a concurrent reader never sees a partial file.
      let partial = cache_entry.join(format!(".{filename}.partial"));
      let mut file = fs::File::create(&partial).await?;
      file.write_all(&bytes).await?;
      file.flush().await?;
      drop(file);
      fs::rename(&partial, &cached_path).await?;

      info!(path = ?cached_path, size = bytes.len(), "download complete");
      bytes
    }
  };

  if let Some(signature) = signature {
    verify_signature(url, &bytes, signature).await?;
  }

  fs::create_dir_all(env_downloads).await?;
  let dest_path = env_downloads.join(&filename);
  fs::write(&dest_path, &bytes).await?;
  if executable {
    set_executable(&dest_path).await?;
  }

  debug!(path = ?dest_path, executable, "placed download in environment");
  Ok(dest_path)
}

async fn read_cached(path: &Path, expected: &str) -> Option<Vec<u8>> {
  let bytes = fs::read(path).await.ok()?;
  let actual = hex::encode(Sha256::digest(&bytes));
  if actual == expected {
    Some(bytes)
  } else {
    debug!(expected = %expected, actual = %actual, "cached file hash mismatch, re-downloading");
    None
  }
}

async fn download(url: &str) -> Result<Vec<u8>, ExecuteError> {
  let failed = |message: String| ExecuteError::FetchFailed {
    url: url.to_string(),
    message,
  };

  let response = reqwest::get(url).await.map_err(|e| failed(e.to_string()))?;
  if !response.status().is_success() {
    return Err(failed(format!("HTTP {}", response.status())));
  }
  let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
  Ok(bytes.to_vec())
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;

  let mut permissions = fs::metadata(path).await?.permissions();
  permissions.set_mode(permissions.mode() | 0o755);
  fs::set_permissions(path, permissions).await
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> std::io::Result<()> {
  Ok(())
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to a hash of
/// the URL if no suitable filename can be extracted.
pub(crate) fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split('?').next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  format!("download_{}", &hex::encode(Sha256::digest(url.as_bytes()))[..16])
}
