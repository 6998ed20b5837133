//! Implementation of the `fuzzpack render` command.

use std::path::Path;

use anyhow::{Context, Result};

use fuzzpack_lib::plan::discover_all;
use fuzzpack_lib::render::{render_dockerfile, render_dockerignore};

use crate::output::{Mark, status};

/// Print the pipeline as a two-stage Dockerfile, or write it to `output`.
pub fn cmd_render(config: &Path, output: Option<&Path>, dockerignore: bool) -> Result<()> {
  let (project, def) = super::load_pipeline(config)?;

  let content = if dockerignore {
    render_dockerignore(&def)
  } else {
    let targets = discover_all(&def, &project.root).context("Failed to discover fuzz targets")?;
    render_dockerfile(&def, &targets).context("Failed to render Dockerfile")?
  };

  match output {
    Some(path) => {
      std::fs::write(path, &content).with_context(|| format!("Failed to write {}", path.display()))?;
      status(Mark::Done, format_args!("Wrote {}", path.display()));
    }
    None => print!("{content}"),
  }
  Ok(())
}
