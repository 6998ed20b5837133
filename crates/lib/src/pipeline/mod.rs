//! Pipeline definition and lowering.
//!
//! A [`PipelineConfig`] is lowered into a [`PipelineDef`]: two ordered step
//! lists, one per stage, that fully describe how the image is produced.
//!
//! ```text
//! builder: provision toolchain -> copy source -> fuzz_build per component
//! package: copy_artifacts per component -> rootfs/
//! ```

mod types;

pub use types::*;

use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, PipelineConfig};
use crate::placeholder::{self, EnvPath, PlaceholderError};
use crate::provision::provision_steps;

/// Errors raised while lowering or validating a pipeline definition.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("{stage} step {index}: {source}")]
  Placeholder {
    stage: StageKind,
    index: usize,
    source: PlaceholderError,
  },

  #[error("{stage} step {index} references the output of step {referenced}, which has not run yet")]
  ForwardReference {
    stage: StageKind,
    index: usize,
    referenced: usize,
  },

  #[error("{stage} step {index} ({kind}) cannot run in the {stage} stage")]
  MisplacedStep {
    stage: StageKind,
    index: usize,
    kind: &'static str,
  },

  #[error("{stage} step {index} uses $${{path:{path}}}, which does not exist in the {stage} environment")]
  ForeignPath {
    stage: StageKind,
    index: usize,
    path: EnvPath,
  },
}

/// Inter-stage contract: where a component's harness binaries are expected.
pub fn artifact_pattern(component: &str) -> String {
  format!("$${{path:src}}/crates/{component}/fuzz/target/$${{triple}}/release/*")
}

impl PipelineDef {
  /// Lower a validated configuration into its step lists.
  pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
    let target_triple = config.target_triple()?;

    let mut builder = StepCtx::new();
    provision_steps(&mut builder, config);
    builder.copy_source(&config.source.exclude);
    let build_command = format!("{} --target $${{triple}}", config.harness.build_command.trim());
    for component in &config.harness.components {
      builder.fuzz_build(component, &build_command);
    }

    let mut package = StepCtx::new();
    for component in &config.harness.components {
      package.copy_artifacts(component, &artifact_pattern(component), config.packaging.selection);
    }

    let def = PipelineDef {
      name: config.image.name.clone(),
      base: BaseImage {
        reference: config.image.base.clone(),
        digest: config.image.digest.clone(),
      },
      target_triple,
      system_path: config.system.path.clone(),
      components: config.harness.components.clone(),
      builder: builder.into_stage(),
      package: package.into_stage(),
    };
    def.validate()?;

    debug!(
      builder_steps = def.builder.steps.len(),
      package_steps = def.package.steps.len(),
      "lowered pipeline"
    );
    Ok(def)
  }

  /// Check each step runs in a stage that supports it, and that each
  /// placeholder parses, refers to an earlier step and names a directory of
  /// its stage.
  pub fn validate(&self) -> Result<(), PipelineError> {
    for stage in [StageKind::Builder, StageKind::Package] {
      for (index, step) in self.stage(stage).steps.iter().enumerate() {
        if !step.allowed_in(stage) {
          return Err(PipelineError::MisplacedStep {
            stage,
            index,
            kind: step.kind(),
          });
        }
        for template in step.templates() {
          let segments =
            placeholder::parse(template).map_err(|source| PipelineError::Placeholder { stage, index, source })?;

          for segment in &segments {
            match segment {
              placeholder::Segment::Placeholder(placeholder::Placeholder::Action(referenced))
                if *referenced >= index =>
              {
                return Err(PipelineError::ForwardReference {
                  stage,
                  index,
                  referenced: *referenced,
                });
              }
              placeholder::Segment::Placeholder(placeholder::Placeholder::Path(path))
                if !stage_has_path(stage, *path) =>
              {
                return Err(PipelineError::ForeignPath {
                  stage,
                  index,
                  path: *path,
                });
              }
              _ => {}
            }
          }
        }
      }
    }
    Ok(())
  }
}

/// Directories addressable from each stage. The package stage sees the
/// builder's `src` read-only, the way a multi-stage recipe copies from the
/// builder image.
pub fn stage_has_path(stage: StageKind, path: EnvPath) -> bool {
  match stage {
    StageKind::Builder => path != EnvPath::Rootfs,
    StageKind::Package => matches!(path, EnvPath::Root | EnvPath::Rootfs | EnvPath::Src | EnvPath::Tmp),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::SelectionPolicy;
  use crate::config::tests::minimal;
  use crate::util::hash::Hashable;

  #[test]
  fn lowering_orders_stages() {
    let def = PipelineDef::from_config(&minimal()).unwrap();

    let kinds: Vec<&str> = def.builder.steps.iter().map(Step::kind).collect();
    assert_eq!(
      kinds,
      vec!["fetch_url", "cmd", "cmd", "cmd", "cmd", "cmd", "copy_source", "fuzz_build", "fuzz_build"]
    );

    assert_eq!(def.package.steps.len(), 2);
    assert_eq!(
      def.package.steps[0],
      Step::CopyArtifacts {
        component: "ilp-packet".to_string(),
        pattern: "$${path:src}/crates/ilp-packet/fuzz/target/$${triple}/release/*".to_string(),
        selection: SelectionPolicy::Declared,
      }
    );
  }

  #[test]
  fn build_command_targets_triple() {
    let def = PipelineDef::from_config(&minimal()).unwrap();
    let Some(Step::FuzzBuild { component, command }) = def.builder.steps.last() else {
      panic!("expected fuzz_build");
    };
    assert_eq!(component, "ilp-stream");
    assert_eq!(command, "cargo fuzz build -O --target $${triple}");
  }

  #[test]
  fn same_config_same_hash() {
    let a = PipelineDef::from_config(&minimal()).unwrap();
    let b = PipelineDef::from_config(&minimal()).unwrap();
    assert_eq!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
  }

  #[test]
  fn changed_channel_changes_hash() {
    let mut config = minimal();
    let a = PipelineDef::from_config(&config).unwrap();
    config.toolchain.channel = "nightly-2025-06-01".to_string();
    let b = PipelineDef::from_config(&config).unwrap();
    assert_ne!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
  }

  #[test]
  fn rejects_forward_reference() {
    let mut def = PipelineDef::from_config(&minimal()).unwrap();
    def.builder.steps.insert(
      0,
      Step::Cmd {
        cmd: "$${action:3}".to_string(),
        env: None,
        cwd: None,
      },
    );
    assert!(matches!(
      def.validate(),
      Err(PipelineError::ForwardReference {
        index: 0,
        referenced: 3,
        ..
      })
    ));
  }

  #[test]
  fn rejects_rootfs_in_builder() {
    let mut def = PipelineDef::from_config(&minimal()).unwrap();
    def.builder.steps.push(Step::Cmd {
      cmd: "ls $${path:rootfs}".to_string(),
      env: None,
      cwd: None,
    });
    assert!(matches!(
      def.validate(),
      Err(PipelineError::ForeignPath {
        path: EnvPath::Rootfs,
        ..
      })
    ));
  }

  #[test]
  fn rejects_cargo_in_package() {
    let mut def = PipelineDef::from_config(&minimal()).unwrap();
    def.package.steps.push(Step::Cmd {
      cmd: "$${path:cargo}/bin/cargo --version".to_string(),
      env: None,
      cwd: None,
    });
    assert!(matches!(def.validate(), Err(PipelineError::ForeignPath { .. })));
  }

  #[test]
  fn rejects_fuzz_build_in_package() {
    let mut def = PipelineDef::from_config(&minimal()).unwrap();
    let step = def.builder.steps.pop().unwrap();
    def.package.steps.push(step);
    assert!(matches!(
      def.validate(),
      Err(PipelineError::MisplacedStep {
        stage: StageKind::Package,
        kind: "fuzz_build",
        ..
      })
    ));
  }

  #[test]
  fn rejects_malformed_placeholder() {
    let mut def = PipelineDef::from_config(&minimal()).unwrap();
    def.builder.steps.push(Step::Cmd {
      cmd: "echo $${action:0".to_string(),
      env: None,
      cwd: None,
    });
    assert!(matches!(def.validate(), Err(PipelineError::Placeholder { .. })));
  }
}
