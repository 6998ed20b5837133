//! Step execution.
//!
//! This module provides the dispatch logic for executing pipeline steps.
//! Placeholders in a step are resolved immediately before it runs.

pub mod cmd;
pub mod copy;
pub mod fetch;
pub mod signature;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::SelectionPolicy;
use crate::env::Environment;
use crate::execute::types::ExecuteError;
use crate::harness::HarnessBuild;
use crate::package::Packager;
use crate::pipeline::{PipelineError, StageKind, Step};
use crate::placeholder::{self, EnvPath, PlaceholderError, Resolver};
use crate::platform::TargetTriple;
use crate::target;

pub use cmd::execute_cmd;
pub use copy::execute_copy_source;
pub use fetch::execute_fetch;

/// What a step may touch while it runs.
pub struct StepContext<'a> {
  pub stage: StageKind,
  /// The environment the stage runs in.
  pub env: &'a Environment,
  /// The builder environment; the package stage reads its `src`.
  pub builder: &'a Environment,
  /// Isolated variables for commands in `env`.
  pub vars: &'a BTreeMap<String, String>,
  pub triple: &'a TargetTriple,
  pub project_root: &'a Path,
  pub downloads_cache: &'a Path,
  /// Present in the package stage only.
  pub packager: Option<&'a mut Packager>,
}

impl StepContext<'_> {
  fn env_path(&self, key: EnvPath) -> Result<PathBuf, ExecuteError> {
    self
      .env
      .path(key)
      .ok_or(ExecuteError::Placeholder(PlaceholderError::UnresolvedPath(key)))
  }

  fn builder_src(&self) -> Result<PathBuf, ExecuteError> {
    self
      .builder
      .path(EnvPath::Src)
      .ok_or(ExecuteError::Placeholder(PlaceholderError::UnresolvedPath(EnvPath::Src)))
  }

  /// Owned description of a component build, ready to move into a task.
  pub fn harness_build(
    &self,
    component: &str,
    command: &str,
    resolver: &impl Resolver,
  ) -> Result<HarnessBuild, ExecuteError> {
    Ok(HarnessBuild {
      component: component.to_string(),
      command: placeholder::substitute(command, resolver)?,
      src_root: self.builder_src()?,
      triple: self.triple.clone(),
      vars: self.vars.clone(),
    })
  }
}

/// Execute a single step.
///
/// # Returns
///
/// The step's output, available to later steps as `$${action:N}`.
pub async fn execute_step(
  index: usize,
  step: &Step,
  resolver: &impl Resolver,
  ctx: &mut StepContext<'_>,
) -> Result<String, ExecuteError> {
  match step {
    Step::Cmd { cmd, env, cwd } => {
      let resolved_cmd = placeholder::substitute(cmd, resolver)?;

      let resolved_env = if let Some(env) = env {
        let mut resolved = BTreeMap::new();
        for (key, value) in env {
          resolved.insert(key.clone(), placeholder::substitute(value, resolver)?);
        }
        Some(resolved)
      } else {
        None
      };

      let resolved_cwd = if let Some(cwd) = cwd {
        Some(placeholder::substitute(cwd, resolver)?)
      } else {
        None
      };

      execute_cmd(
        &resolved_cmd,
        resolved_env.as_ref(),
        resolved_cwd.as_deref(),
        ctx.vars,
        ctx.env.root(),
      )
      .await
    }

    Step::FetchUrl {
      url,
      sha256,
      signature,
      executable,
    } => {
      let resolved_url = placeholder::substitute(url, resolver)?;
      let resolved_sha256 = placeholder::substitute(sha256, resolver)?;
      let downloads = ctx.env_path(EnvPath::Downloads)?;

      let path = execute_fetch(
        &resolved_url,
        &resolved_sha256,
        signature.as_ref(),
        *executable,
        &downloads,
        ctx.downloads_cache,
      )
      .await?;
      Ok(path.to_string_lossy().to_string())
    }

    Step::CopySource { exclude } => {
      let dest = ctx.env_path(EnvPath::Src)?;
      execute_copy_source(ctx.project_root, &dest, exclude).await?;
      Ok(dest.to_string_lossy().to_string())
    }

    Step::FuzzBuild { component, command } => {
      let built = ctx.harness_build(component, command, resolver)?.run().await?;
      Ok(built.artifact_dir.to_string_lossy().to_string())
    }

    Step::CopyArtifacts {
      component,
      pattern,
      selection,
    } => {
      let resolved_pattern = placeholder::substitute(pattern, resolver)?;
      let declared = match selection {
        SelectionPolicy::Declared => {
          let src = ctx.builder_src()?;
          target::discover(&target::component_dir(&src, component), component)?
        }
        SelectionPolicy::Glob => Vec::new(),
      };

      let stage = ctx.stage;
      let packager = ctx.packager.as_deref_mut().ok_or(PipelineError::MisplacedStep {
        stage,
        index,
        kind: step.kind(),
      })?;
      let copied = packager.copy_artifacts(component, &resolved_pattern, *selection, &declared)?;
      Ok(copied.join(" "))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::execute::resolver::StageResolver;
  use crate::util::testutil::{fake_driver, write_project};
  use tempfile::TempDir;

  struct Fixture {
    _work: TempDir,
    project: TempDir,
    cache: TempDir,
    builder: Environment,
    package: Environment,
    triple: TargetTriple,
  }

  fn fixture() -> Fixture {
    let work = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    write_project(project.path(), &[("ilp-packet", "fuzz_packet_decode")]);
    Fixture {
      builder: Environment::create(StageKind::Builder, work.path()).unwrap(),
      package: Environment::create(StageKind::Package, work.path()).unwrap(),
      _work: work,
      project,
      cache: TempDir::new().unwrap(),
      triple: TargetTriple("x86_64-unknown-linux-gnu".to_string()),
    }
  }

  fn resolver(env: &Environment, builder: &Environment, triple: &TargetTriple) -> StageResolver {
    StageResolver::new(crate::env::stage_paths(env, builder), triple.as_str())
  }

  #[tokio::test]
  async fn cmd_resolves_env_paths() {
    let f = fixture();
    let vars = f.builder.command_vars("/usr/bin:/bin", &f.triple);
    let resolver = resolver(&f.builder, &f.builder, &f.triple);
    let mut ctx = StepContext {
      stage: StageKind::Builder,
      env: &f.builder,
      builder: &f.builder,
      vars: &vars,
      triple: &f.triple,
      project_root: f.project.path(),
      downloads_cache: f.cache.path(),
      packager: None,
    };

    let step = Step::Cmd {
      cmd: "echo $${path:cargo} $CARGO_HOME".to_string(),
      env: None,
      cwd: Some("$${path:tmp}".to_string()),
    };
    let output = execute_step(0, &step, &resolver, &mut ctx).await.unwrap();

    let cargo = f.builder.root().join("toolchain/cargo");
    assert_eq!(output, format!("{} {}", cargo.display(), cargo.display()));
  }

  #[tokio::test]
  async fn build_then_package_one_component() {
    let f = fixture();
    let tools = TempDir::new().unwrap();
    let driver = fake_driver(tools.path());
    let builder_vars = f.builder.command_vars("/usr/bin:/bin", &f.triple);
    let builder_resolver = resolver(&f.builder, &f.builder, &f.triple);

    let mut ctx = StepContext {
      stage: StageKind::Builder,
      env: &f.builder,
      builder: &f.builder,
      vars: &builder_vars,
      triple: &f.triple,
      project_root: f.project.path(),
      downloads_cache: f.cache.path(),
      packager: None,
    };
    let copy = Step::CopySource {
      exclude: vec!["target".to_string()],
    };
    execute_step(0, &copy, &builder_resolver, &mut ctx).await.unwrap();

    let build = Step::FuzzBuild {
      component: "ilp-packet".to_string(),
      command: format!("{} build -O --target $${{triple}}", driver.display()),
    };
    let artifact_dir = execute_step(1, &build, &builder_resolver, &mut ctx).await.unwrap();
    assert!(artifact_dir.ends_with("crates/ilp-packet/fuzz/target/x86_64-unknown-linux-gnu/release"));

    let rootfs = f.package.path(EnvPath::Rootfs).unwrap();
    let mut packager = Packager::new(&rootfs);
    let package_vars = f.package.command_vars("/usr/bin:/bin", &f.triple);
    let package_resolver = resolver(&f.package, &f.builder, &f.triple);
    let mut ctx = StepContext {
      stage: StageKind::Package,
      env: &f.package,
      builder: &f.builder,
      vars: &package_vars,
      triple: &f.triple,
      project_root: f.project.path(),
      downloads_cache: f.cache.path(),
      packager: Some(&mut packager),
    };
    let step = Step::CopyArtifacts {
      component: "ilp-packet".to_string(),
      pattern: crate::pipeline::artifact_pattern("ilp-packet"),
      selection: SelectionPolicy::Declared,
    };
    let copied = execute_step(0, &step, &package_resolver, &mut ctx).await.unwrap();

    assert_eq!(copied, "fuzz_packet_decode");
    assert!(rootfs.join("fuzz_packet_decode").is_file());
    assert!(!rootfs.join("fuzz_packet_decode.d").exists());
  }

  #[tokio::test]
  async fn copy_artifacts_without_packager_is_misplaced() {
    let f = fixture();
    let vars = f.builder.command_vars("/usr/bin:/bin", &f.triple);
    let resolver = resolver(&f.builder, &f.builder, &f.triple);
    let mut ctx = StepContext {
      stage: StageKind::Builder,
      env: &f.builder,
      builder: &f.builder,
      vars: &vars,
      triple: &f.triple,
      project_root: f.project.path(),
      downloads_cache: f.cache.path(),
      packager: None,
    };

    let step = Step::CopyArtifacts {
      component: "ilp-packet".to_string(),
      pattern: "/nowhere/*".to_string(),
      selection: SelectionPolicy::Glob,
    };
    let err = execute_step(4, &step, &resolver, &mut ctx).await.unwrap_err();
    assert!(matches!(
      err,
      ExecuteError::Pipeline(PipelineError::MisplacedStep { index: 4, .. })
    ));
  }
}
