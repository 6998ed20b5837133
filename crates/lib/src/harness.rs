//! Harness compilation.
//!
//! Each component is compiled by the fuzz driver from its own directory in
//! the builder's source copy. Success is judged by the artifacts, not the
//! driver's exit code alone: every declared target must exist at its
//! artifact path afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::execute::actions::execute_cmd;
use crate::execute::types::ExecuteError;
use crate::platform::TargetTriple;
use crate::target::{self, FuzzTarget};

/// Everything a component build needs, owned so it can move into a task.
#[derive(Debug, Clone)]
pub struct HarnessBuild {
  pub component: String,
  /// Fully resolved driver command.
  pub command: String,
  /// The builder environment's `src` directory.
  pub src_root: PathBuf,
  pub triple: TargetTriple,
  pub vars: BTreeMap<String, String>,
}

/// Outcome of compiling one component.
#[derive(Debug, Clone)]
pub struct BuiltHarnesses {
  pub component: String,
  pub artifact_dir: PathBuf,
  pub targets: Vec<FuzzTarget>,
}

impl HarnessBuild {
  pub async fn run(self) -> Result<BuiltHarnesses, ExecuteError> {
    let component_dir = target::component_dir(&self.src_root, &self.component);
    let targets = target::discover(&component_dir, &self.component)?;

    info!(
      component = %self.component,
      targets = targets.len(),
      triple = %self.triple,
      "compiling fuzz targets"
    );
    execute_cmd(&self.command, None, None, &self.vars, &component_dir).await?;

    for fuzz_target in &targets {
      let path = target::artifact_path(&self.src_root, fuzz_target, &self.triple);
      if !path.is_file() {
        warn!(path = %path.display(), "expected artifact not produced");
        return Err(ExecuteError::ArtifactMissing {
          component: fuzz_target.component.clone(),
          name: fuzz_target.name.clone(),
          path,
        });
      }
    }

    let artifact_dir = target::artifact_dir(&self.src_root, &self.component, &self.triple);
    info!(component = %self.component, dir = %artifact_dir.display(), "fuzz targets compiled");
    Ok(BuiltHarnesses {
      component: self.component,
      artifact_dir,
      targets,
    })
  }
}
