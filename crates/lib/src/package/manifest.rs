use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::platform::TargetTriple;

use super::PackageError;

pub const MANIFEST_VERSION: u32 = 1;

/// Description of a finished image, written next to its rootfs as `image.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageManifest {
  pub version: u32,
  pub name: String,
  /// Pinned base image reference.
  pub base: String,
  pub pipeline_hash: String,
  pub target_triple: TargetTriple,
  /// Sorted by name.
  pub artifacts: Vec<ManifestArtifact>,
  /// [`hash_directory`](crate::util::hash::hash_directory) of the rootfs.
  pub rootfs_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestArtifact {
  pub name: String,
  pub component: String,
  /// Absolute path inside the image (`/<name>`).
  pub path: String,
  pub sha256: String,
  pub size: u64,
  /// Whether the entry carries an exec bit. Dep-info files packaged under
  /// the `glob` selection do not.
  pub executable: bool,
}

impl ImageManifest {
  pub fn artifact(&self, name: &str) -> Option<&ManifestArtifact> {
    self.artifacts.iter().find(|a| a.name == name)
  }

  pub fn write(&self, path: &Path) -> Result<(), PackageError> {
    let mut content = serde_json::to_string_pretty(self)?;
    content.push('\n');
    fs::write(path, content).map_err(|source| PackageError::Io {
      path: path.to_path_buf(),
      source,
    })
  }
}
