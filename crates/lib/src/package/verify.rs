//! Tamper check for a written image.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{IMAGE_MANIFEST_FILENAME, ROOTFS_DIRNAME};
use crate::util::hash::{DirHashError, hash_directory, hash_file, is_executable};

use super::manifest::{ImageManifest, MANIFEST_VERSION};

#[derive(Debug, Error)]
pub enum VerifyError {
  #[error("no image manifest at {}", .0.display())]
  ManifestMissing(PathBuf),

  #[error("failed to read {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("failed to parse {}: {source}", path.display())]
  Parse { path: PathBuf, source: serde_json::Error },

  #[error("unsupported manifest version {0}")]
  UnsupportedVersion(u32),

  #[error("image has no rootfs at {}", .0.display())]
  RootfsMissing(PathBuf),

  #[error("unexpected entry in rootfs: /{0}")]
  UnexpectedEntry(String),

  #[error("artifact /{0} listed in the manifest is missing")]
  MissingArtifact(String),

  #[error("/{0} is not a regular file")]
  NotRegularFile(String),

  #[error("/{0} is not executable")]
  NotExecutable(String),

  #[error("/{0} was packaged without an exec bit but is now executable")]
  BecameExecutable(String),

  #[error("/{name} does not match the manifest: expected {expected}, got {actual}")]
  HashMismatch {
    name: String,
    expected: String,
    actual: String,
  },

  #[error("rootfs hash mismatch: expected {expected}, got {actual}")]
  RootfsHashMismatch { expected: String, actual: String },

  #[error(transparent)]
  Hash(#[from] DirHashError),
}

/// Read `image.json` from an image directory.
pub fn load_manifest(image_dir: &Path) -> Result<ImageManifest, VerifyError> {
  let path = image_dir.join(IMAGE_MANIFEST_FILENAME);
  if !path.is_file() {
    return Err(VerifyError::ManifestMissing(path));
  }
  let content = fs::read_to_string(&path).map_err(|source| VerifyError::Read {
    path: path.clone(),
    source,
  })?;
  let manifest: ImageManifest = serde_json::from_str(&content).map_err(|source| VerifyError::Parse {
    path: path.clone(),
    source,
  })?;
  if manifest.version != MANIFEST_VERSION {
    return Err(VerifyError::UnsupportedVersion(manifest.version));
  }
  Ok(manifest)
}

/// Check that an image's rootfs holds exactly the manifest's artifacts.
///
/// Every root entry must be listed, be a regular file with the recorded exec
/// bit and match its recorded sha256. Every listed artifact must be present,
/// and the whole tree must match the recorded rootfs hash.
pub fn verify_image(image_dir: &Path) -> Result<ImageManifest, VerifyError> {
  let manifest = load_manifest(image_dir)?;
  let rootfs = image_dir.join(ROOTFS_DIRNAME);
  if !rootfs.is_dir() {
    return Err(VerifyError::RootfsMissing(rootfs));
  }

  let read_err = |source: std::io::Error| VerifyError::Read {
    path: rootfs.clone(),
    source,
  };

  let mut present = BTreeSet::new();
  for entry in fs::read_dir(&rootfs).map_err(read_err)? {
    let entry = entry.map_err(read_err)?;
    let name = entry.file_name().to_string_lossy().to_string();
    let Some(expected) = manifest.artifact(&name) else {
      return Err(VerifyError::UnexpectedEntry(name));
    };

    let path = entry.path();
    let metadata = fs::symlink_metadata(&path).map_err(read_err)?;
    if !metadata.file_type().is_file() {
      return Err(VerifyError::NotRegularFile(name));
    }
    match (expected.executable, is_executable(&path)) {
      (true, false) => return Err(VerifyError::NotExecutable(name)),
      (false, true) => return Err(VerifyError::BecameExecutable(name)),
      _ => {}
    }

    let actual = hash_file(&path)?;
    if actual.0 != expected.sha256 {
      return Err(VerifyError::HashMismatch {
        name,
        expected: expected.sha256.clone(),
        actual: actual.0,
      });
    }
    debug!(name = %name, "artifact verified");
    present.insert(name);
  }

  if let Some(missing) = manifest.artifacts.iter().find(|a| !present.contains(&a.name)) {
    return Err(VerifyError::MissingArtifact(missing.name.clone()));
  }

  let actual = hash_directory(&rootfs, &[])?;
  if actual.0 != manifest.rootfs_hash {
    return Err(VerifyError::RootfsHashMismatch {
      expected: manifest.rootfs_hash.clone(),
      actual: actual.0,
    });
  }

  info!(image = %image_dir.display(), artifacts = manifest.artifacts.len(), "image verified");
  Ok(manifest)
}
