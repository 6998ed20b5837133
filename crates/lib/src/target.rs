//! Fuzz target descriptors.
//!
//! A component declares its harnesses as `[[bin]]` tables in
//! `<component>/fuzz/Cargo.toml`. Each table becomes one [`FuzzTarget`], and
//! each target yields exactly one binary at a fixed path:
//!
//! ```text
//! <root>/crates/<component>/fuzz/target/<triple>/release/<name>
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::platform::TargetTriple;

#[derive(Debug, Error)]
pub enum TargetError {
  #[error("component {component} has no fuzz directory at {}", path.display())]
  FuzzDirMissing { component: String, path: PathBuf },

  #[error("component {component} has no fuzz manifest at {}", path.display())]
  ManifestMissing { component: String, path: PathBuf },

  #[error("failed to read {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("failed to parse {}: {source}", path.display())]
  Parse { path: PathBuf, source: toml::de::Error },

  #[error("component {component} declares no fuzz targets")]
  NoTargets { component: String },

  #[error("component {component} declares fuzz target {name} twice")]
  DuplicateTarget { component: String, name: String },
}

/// A harness entry point declared by a component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FuzzTarget {
  pub component: String,
  pub name: String,
  /// Entry-point source, relative to the fuzz directory.
  pub source: PathBuf,
}

#[derive(Deserialize)]
struct FuzzManifest {
  #[serde(default)]
  bin: Vec<BinTable>,
}

#[derive(Deserialize)]
struct BinTable {
  name: String,
  path: Option<PathBuf>,
}

/// Read the descriptors of a component rooted at `component_dir`.
///
/// Targets are returned in declaration order.
pub fn discover(component_dir: &Path, component: &str) -> Result<Vec<FuzzTarget>, TargetError> {
  let fuzz_dir = component_dir.join("fuzz");
  if !fuzz_dir.is_dir() {
    return Err(TargetError::FuzzDirMissing {
      component: component.to_string(),
      path: fuzz_dir,
    });
  }

  let manifest_path = fuzz_dir.join("Cargo.toml");
  if !manifest_path.is_file() {
    return Err(TargetError::ManifestMissing {
      component: component.to_string(),
      path: manifest_path,
    });
  }

  let content = fs::read_to_string(&manifest_path).map_err(|source| TargetError::Read {
    path: manifest_path.clone(),
    source,
  })?;
  let manifest: FuzzManifest = toml::from_str(&content).map_err(|source| TargetError::Parse {
    path: manifest_path.clone(),
    source,
  })?;

  if manifest.bin.is_empty() {
    return Err(TargetError::NoTargets {
      component: component.to_string(),
    });
  }

  let mut targets: Vec<FuzzTarget> = Vec::with_capacity(manifest.bin.len());
  for bin in manifest.bin {
    if targets.iter().any(|t| t.name == bin.name) {
      return Err(TargetError::DuplicateTarget {
        component: component.to_string(),
        name: bin.name,
      });
    }
    let source = bin
      .path
      .unwrap_or_else(|| PathBuf::from(format!("fuzz_targets/{}.rs", bin.name)));
    targets.push(FuzzTarget {
      component: component.to_string(),
      name: bin.name,
      source,
    });
  }

  debug!(component, count = targets.len(), "discovered fuzz targets");
  Ok(targets)
}

/// `<root>/crates/<component>` for a project or environment source root.
pub fn component_dir(root: &Path, component: &str) -> PathBuf {
  root.join("crates").join(component)
}

/// Directory the driver writes a component's release harnesses to.
pub fn artifact_dir(root: &Path, component: &str, triple: &TargetTriple) -> PathBuf {
  component_dir(root, component)
    .join("fuzz")
    .join("target")
    .join(triple.as_str())
    .join("release")
}

pub fn artifact_path(root: &Path, target: &FuzzTarget, triple: &TargetTriple) -> PathBuf {
  artifact_dir(root, &target.component, triple).join(&target.name)
}
