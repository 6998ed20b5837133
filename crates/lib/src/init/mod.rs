//! Initialize a fuzzpack project.
//!
//! This module provides the core logic for the `fuzzpack init` command,
//! which writes a `fuzzpack.toml` template at the project root. Components
//! that already carry a `fuzz/Cargo.toml` under `crates/` are listed in it.

mod templates;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::CONFIG_FILENAME;

pub use templates::CONFIG_TEMPLATE;

/// Errors that can occur during initialization.
#[derive(Debug, Error)]
pub enum InitError {
  #[error("file already exists: {}", path.display())]
  PathExists { path: PathBuf },

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },

  #[error("failed to canonicalize path {}: {source}", path.display())]
  Canonicalize { path: PathBuf, source: std::io::Error },
}

/// Options for initializing a project.
pub struct InitOptions {
  /// Project root the config is written to
  pub project_dir: PathBuf,
  /// Image name; defaults to the directory name
  pub name: Option<String>,
}

/// Result of a successful initialization.
#[derive(Debug)]
pub struct InitResult {
  /// The project directory (canonicalized)
  pub project_dir: PathBuf,
  /// Path to the created config
  pub config_path: PathBuf,
  /// Components found under `crates/` with a fuzz manifest
  pub components: Vec<String>,
}

/// Write a `fuzzpack.toml` template into a project directory.
///
/// # Errors
///
/// Returns an error if:
/// - `fuzzpack.toml` already exists
/// - Directory creation fails
/// - File writing fails
pub fn init(options: &InitOptions) -> Result<InitResult, InitError> {
  let project_dir = &options.project_dir;

  fs::create_dir_all(project_dir).map_err(|e| InitError::CreateDir {
    path: project_dir.clone(),
    source: e,
  })?;

  let project_dir = dunce::canonicalize(project_dir).map_err(|e| InitError::Canonicalize {
    path: options.project_dir.clone(),
    source: e,
  })?;

  let config_path = project_dir.join(CONFIG_FILENAME);
  if config_path.exists() {
    return Err(InitError::PathExists { path: config_path });
  }

  let components = find_components(&project_dir);
  let name = options.name.clone().unwrap_or_else(|| {
    project_dir
      .file_name()
      .map(|n| format!("{}-fuzz", n.to_string_lossy()))
      .unwrap_or_else(|| "fuzz".to_string())
  });

  let listed = components
    .iter()
    .map(|c| format!("\"{c}\""))
    .collect::<Vec<_>>()
    .join(", ");
  let content = CONFIG_TEMPLATE
    .replace("{name}", &name)
    .replace("{components}", &listed);

  fs::write(&config_path, content).map_err(|e| InitError::WriteFile {
    path: config_path.clone(),
    source: e,
  })?;

  info!(path = %config_path.display(), components = components.len(), "wrote config template");
  Ok(InitResult {
    project_dir,
    config_path,
    components,
  })
}

/// Directories under `crates/` that contain `fuzz/Cargo.toml`, sorted.
fn find_components(project_dir: &Path) -> Vec<String> {
  let Ok(entries) = fs::read_dir(project_dir.join("crates")) else {
    debug!("no crates directory, template lists no components");
    return Vec::new();
  };

  let mut components: Vec<String> = entries
    .filter_map(Result::ok)
    .filter(|entry| entry.path().join("fuzz").join("Cargo.toml").is_file())
    .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
    .collect();
  components.sort();
  components
}
