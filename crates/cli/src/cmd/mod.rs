mod build;
mod info;
mod init;
mod plan;
mod render;
mod smoke;
mod verify;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use fuzzpack_lib::config::Project;
use fuzzpack_lib::pipeline::PipelineDef;

pub use build::{BuildArgs, cmd_build};
pub use info::cmd_info;
pub use init::cmd_init;
pub use plan::cmd_plan;
pub use render::cmd_render;
pub use smoke::cmd_smoke;
pub use verify::cmd_verify;

/// Load the project at `config` and lower it to a pipeline definition.
fn load_pipeline(config: &Path) -> Result<(Project, PipelineDef)> {
  let project = Project::load(config).with_context(|| format!("Failed to load {}", config.display()))?;
  let def = PipelineDef::from_config(&project.config).context("Failed to lower pipeline")?;
  debug!(root = %project.root.display(), pipeline = %def.name, "loaded project");
  Ok((project, def))
}

/// The image directory given on the command line, or the configured output.
fn image_dir(config: &Path, image: Option<&Path>) -> Result<PathBuf> {
  match image {
    Some(dir) => Ok(dir.to_path_buf()),
    None => {
      let project = Project::load(config).with_context(|| format!("Failed to load {}", config.display()))?;
      Ok(project.output_dir())
    }
  }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
