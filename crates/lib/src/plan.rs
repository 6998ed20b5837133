//! Dry-run planning.
//!
//! A [`Plan`] describes what [`run_pipeline`](crate::execute::run_pipeline)
//! would do for a definition and a source tree, without creating an
//! environment or running a step: the pipeline hash, the numbered steps of
//! each stage, the discovered fuzz targets with the exact paths their
//! binaries will be compiled to, and the entries of the final image.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::SelectionPolicy;
use crate::pipeline::{PipelineDef, PipelineError, StageKind, Step};
use crate::platform::TargetTriple;
use crate::target::{self, FuzzTarget, TargetError};
use crate::util::hash::{Hashable, ObjectHash};

#[derive(Debug, Error)]
pub enum PlanError {
  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  #[error(transparent)]
  Target(#[from] TargetError),

  #[error("failed to hash pipeline: {0}")]
  Hash(#[from] serde_json::Error),

  #[error("fuzz target {name} is declared by both {first} and {second}")]
  DuplicateTarget {
    name: String,
    first: String,
    second: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
  pub index: usize,
  pub kind: &'static str,
  pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStage {
  pub stage: StageKind,
  pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTarget {
  pub component: String,
  pub name: String,
  /// Harness source, relative to the component's `fuzz/` directory.
  pub source: String,
  /// Compiled binary, relative to the source root.
  pub artifact: String,
  /// Location in the image.
  pub image_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
  pub name: String,
  pub base: String,
  pub pipeline_hash: ObjectHash,
  pub target_triple: TargetTriple,
  pub stages: Vec<PlannedStage>,
  pub targets: Vec<PlannedTarget>,
  /// Entries expected at the image root, sorted.
  pub image: Vec<String>,
}

impl Plan {
  pub fn step_count(&self) -> usize {
    self.stages.iter().map(|s| s.steps.len()).sum()
  }
}

/// Plan a pipeline against the source tree at `project_root`.
pub fn plan(def: &PipelineDef, project_root: &Path) -> Result<Plan, PlanError> {
  def.validate()?;
  let pipeline_hash = def.compute_hash()?;

  let stages = [StageKind::Builder, StageKind::Package]
    .into_iter()
    .map(|stage| PlannedStage {
      stage,
      steps: def
        .stage(stage)
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| PlannedStep {
          index,
          kind: step.kind(),
          description: step.describe(),
        })
        .collect(),
    })
    .collect();

  let declared = discover_all(def, project_root)?;

  let mut owners: BTreeMap<String, String> = BTreeMap::new();
  let mut targets = Vec::with_capacity(declared.len());
  for fuzz_target in &declared {
    if let Some(first) = owners.insert(fuzz_target.name.clone(), fuzz_target.component.clone()) {
      return Err(PlanError::DuplicateTarget {
        name: fuzz_target.name.clone(),
        first,
        second: fuzz_target.component.clone(),
      });
    }
    targets.push(PlannedTarget {
      component: fuzz_target.component.clone(),
      name: fuzz_target.name.clone(),
      source: fuzz_target.source.to_string_lossy().replace('\\', "/"),
      artifact: relative_artifact(fuzz_target, &def.target_triple),
      image_path: format!("/{}", fuzz_target.name),
    });
  }

  let packaged: Vec<&str> = def
    .package
    .steps
    .iter()
    .filter_map(|step| match step {
      Step::CopyArtifacts { component, .. } => Some(component.as_str()),
      _ => None,
    })
    .collect();
  let mut image: Vec<String> = targets
    .iter()
    .filter(|t| packaged.contains(&t.component.as_str()))
    .map(|t| t.image_path.clone())
    .collect();
  image.sort();

  if def.package.steps.iter().any(
    |step| matches!(step, Step::CopyArtifacts { selection, .. } if *selection == SelectionPolicy::Glob),
  ) {
    debug!("glob selection may package files beyond the declared targets");
  }

  Ok(Plan {
    name: def.name.clone(),
    base: def.base.pinned(),
    pipeline_hash,
    target_triple: def.target_triple.clone(),
    stages,
    targets,
    image,
  })
}

/// Discover the fuzz targets of every component built by the pipeline, in
/// build order.
pub fn discover_all(def: &PipelineDef, project_root: &Path) -> Result<Vec<FuzzTarget>, TargetError> {
  let mut all = Vec::new();
  for component in &def.components {
    all.extend(target::discover(&target::component_dir(project_root, component), component)?);
  }
  Ok(all)
}

fn relative_artifact(fuzz_target: &FuzzTarget, triple: &TargetTriple) -> String {
  target::artifact_path(Path::new(""), fuzz_target, triple)
    .to_string_lossy()
    .replace('\\', "/")
}
