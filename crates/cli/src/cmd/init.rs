//! Implementation of the `fuzzpack init` command.
//!
//! Writes a `fuzzpack.toml` template listing the components that already
//! have a `fuzz/` crate.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use fuzzpack_lib::init::{InitOptions, init};

use crate::output::{Mark, field, status};

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if `fuzzpack.toml` already exists or cannot be written.
pub fn cmd_init(path: &Path, name: Option<String>) -> Result<()> {
  let options = InitOptions {
    project_dir: path.to_path_buf(),
    name,
  };

  let result = init(&options).context("Failed to initialize project")?;

  status(Mark::Done, "Initialized fuzzpack project!");
  field("Project", result.project_dir.display());
  field("Config", result.config_path.display());
  if result.components.is_empty() {
    status(
      Mark::Finding,
      "No crates/<name>/fuzz/Cargo.toml found; add components to [harness] by hand",
    );
  } else {
    field("Components", result.components.join(", "));
  }
  println!();
  println!("{}", "Next steps:".bold());
  println!("  1. Pin [toolchain.installer] and [image] digest in {}", result.config_path.display().to_string().cyan());
  println!("  2. Run: {}", "fuzzpack plan".cyan());
  println!("  3. Run: {}", "fuzzpack build".cyan());

  Ok(())
}
