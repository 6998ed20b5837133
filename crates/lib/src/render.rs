//! Container recipe rendering.
//!
//! Renders a pipeline as an equivalent two-stage Dockerfile for build farms
//! that consume container images. Environment directories map to fixed
//! locations inside the builder image:
//!
//! ```text
//! $${path:src}        /src
//! $${path:cargo}      /opt/fuzzpack/cargo
//! $${path:rustup}     /opt/fuzzpack/rustup
//! $${path:downloads}  /opt/fuzzpack/downloads
//! $${path:home}       /root
//! $${path:tmp}        /tmp
//! ```
//!
//! Step outputs are only known statically for `fetch_url`, `copy_source` and
//! `fuzz_build`; a reference to the stdout of a `cmd` cannot be rendered.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::SelectionPolicy;
use crate::consts::SOURCE_DATE_EPOCH;
use crate::execute::actions::fetch::url_to_filename;
use crate::pipeline::{PipelineDef, PipelineError, StageKind, Step};
use crate::placeholder::{self, EnvPath, Placeholder, PlaceholderError, Resolver, Segment};
use crate::target::{self, FuzzTarget};
use crate::util::hash::Hashable;

const BUILDER_STAGE: &str = "builder";
const PREFIX: &str = "/opt/fuzzpack";
const SRC: &str = "/src";

#[derive(Debug, Error)]
pub enum RenderError {
  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  #[error("{stage} step {index}: {source}")]
  Placeholder {
    stage: StageKind,
    index: usize,
    source: PlaceholderError,
  },

  #[error("{stage} step {index} uses the output of step {referenced} ({kind}), which is only known at run time")]
  RuntimeOutput {
    stage: StageKind,
    index: usize,
    referenced: usize,
    kind: &'static str,
  },

  #[error("failed to hash pipeline: {0}")]
  Hash(#[from] serde_json::Error),
}

fn container_path(key: EnvPath) -> String {
  match key {
    EnvPath::Root | EnvPath::Rootfs => "/".to_string(),
    EnvPath::Home => "/root".to_string(),
    EnvPath::Src => SRC.to_string(),
    EnvPath::Cargo => format!("{PREFIX}/cargo"),
    EnvPath::Rustup => format!("{PREFIX}/rustup"),
    EnvPath::Downloads => format!("{PREFIX}/downloads"),
    EnvPath::Tmp => "/tmp".to_string(),
  }
}

/// Resolves placeholders to their location inside the container.
struct ContainerResolver {
  /// Static output of each step so far; `None` when only known at run time.
  outputs: Vec<Option<String>>,
  paths: BTreeMap<EnvPath, String>,
  triple: String,
}

impl Resolver for ContainerResolver {
  fn resolve_action(&self, index: usize) -> Result<&str, PlaceholderError> {
    self
      .outputs
      .get(index)
      .and_then(|o| o.as_deref())
      .ok_or(PlaceholderError::UnresolvedAction(index))
  }

  fn resolve_path(&self, key: EnvPath) -> Result<&str, PlaceholderError> {
    self
      .paths
      .get(&key)
      .map(String::as_str)
      .ok_or(PlaceholderError::UnresolvedPath(key))
  }

  fn resolve_triple(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.triple)
  }
}

/// Render `def` as a two-stage Dockerfile.
///
/// `targets` are the declared fuzz targets of every component; the package
/// stage copies each of them out of the builder by its artifact path.
pub fn render_dockerfile(def: &PipelineDef, targets: &[FuzzTarget]) -> Result<String, RenderError> {
  def.validate()?;
  let hash = def.compute_hash()?;
  let triple = def.target_triple.as_str();
  let base = def.base.pinned();

  let mut out = String::new();
  out.push_str("# syntax=docker/dockerfile:1.7\n");
  out.push_str(&format!("# Generated by fuzzpack for pipeline {} ({hash}). Do not edit.\n", def.name));
  out.push('\n');
  out.push_str(&format!("FROM {base} AS {BUILDER_STAGE}\n"));
  out.push_str(&format!("ENV CARGO_HOME={PREFIX}/cargo \\\n"));
  out.push_str(&format!("    RUSTUP_HOME={PREFIX}/rustup \\\n"));
  out.push_str(&format!("    PATH={PREFIX}/cargo/bin:{} \\\n", def.system_path));
  out.push_str("    LANG=C \\\n");
  out.push_str("    LC_ALL=C \\\n");
  out.push_str(&format!("    SOURCE_DATE_EPOCH={SOURCE_DATE_EPOCH} \\\n"));
  out.push_str(&format!("    FUZZPACK_TARGET_TRIPLE={triple}\n"));
  out.push_str("WORKDIR /\n");

  let mut resolver = stage_resolver(StageKind::Builder, triple);
  for (index, step) in def.builder.steps.iter().enumerate() {
    check_references(def, StageKind::Builder, index, step)?;
    let resolve = |template: &str| {
      placeholder::substitute(template, &resolver).map_err(|source| RenderError::Placeholder {
        stage: StageKind::Builder,
        index,
        source,
      })
    };

    out.push('\n');
    out.push_str(&format!("# {index}: {}\n", step.kind()));
    let output = match step {
      Step::Cmd { cmd, env, cwd } => {
        let mut env_resolved = BTreeMap::new();
        for (key, value) in env.iter().flatten() {
          env_resolved.insert(key.clone(), resolve(value)?);
        }
        let cwd = cwd.as_deref().map(resolve).transpose()?;
        out.push_str(&run_instruction(&resolve(cmd)?, &env_resolved, cwd.as_deref()));
        None
      }
      Step::FetchUrl {
        url,
        sha256,
        signature,
        executable,
      } => {
        let url = resolve(url)?;
        let dest = format!("{}/{}", container_path(EnvPath::Downloads), url_to_filename(&url));
        if signature.is_some() {
          out.push_str("# The detached signature is only checked by `fuzzpack build`.\n");
        }
        out.push_str(&format!("ADD --checksum=sha256:{} {url} {dest}\n", resolve(sha256)?.to_ascii_lowercase()));
        if *executable {
          out.push_str(&format!("RUN chmod 0755 {dest}\n"));
        }
        Some(dest)
      }
      Step::CopySource { .. } => {
        out.push_str(&format!("COPY . {SRC}\n"));
        Some(SRC.to_string())
      }
      Step::FuzzBuild { component, command } => {
        let dir = target::component_dir(std::path::Path::new(SRC), component);
        out.push_str(&format!("WORKDIR {}\n", dir.display()));
        out.push_str(&run_instruction(&resolve(command)?, &BTreeMap::new(), None));
        out.push_str("WORKDIR /\n");
        Some(
          target::artifact_dir(std::path::Path::new(SRC), component, &def.target_triple)
            .display()
            .to_string(),
        )
      }
      // Placement is validated above.
      Step::CopyArtifacts { .. } => None,
    };
    resolver.outputs.push(output);
  }

  out.push('\n');
  out.push_str(&format!("FROM {base}\n"));
  let resolver = stage_resolver(StageKind::Package, triple);
  for (index, step) in def.package.steps.iter().enumerate() {
    check_references(def, StageKind::Package, index, step)?;
    match step {
      Step::CopyArtifacts {
        component,
        pattern,
        selection,
      } => match selection {
        SelectionPolicy::Declared => {
          for fuzz_target in targets.iter().filter(|t| t.component == *component) {
            let from = target::artifact_path(std::path::Path::new(SRC), fuzz_target, &def.target_triple);
            out.push_str(&format!("COPY --from={BUILDER_STAGE} {} /{}\n", from.display(), fuzz_target.name));
          }
        }
        SelectionPolicy::Glob => {
          let from = placeholder::substitute(pattern, &resolver).map_err(|source| RenderError::Placeholder {
            stage: StageKind::Package,
            index,
            source,
          })?;
          out.push_str(&format!("COPY --from={BUILDER_STAGE} {from} /\n"));
        }
      },
      Step::Cmd { cmd, env, cwd } => {
        let resolve = |template: &str| {
          placeholder::substitute(template, &resolver).map_err(|source| RenderError::Placeholder {
            stage: StageKind::Package,
            index,
            source,
          })
        };
        let mut env_resolved = BTreeMap::new();
        for (key, value) in env.iter().flatten() {
          env_resolved.insert(key.clone(), resolve(value)?);
        }
        let cwd = cwd.as_deref().map(resolve).transpose()?;
        out.push_str(&run_instruction(&resolve(cmd)?, &env_resolved, cwd.as_deref()));
      }
      // Placement is validated above.
      Step::FetchUrl { .. } | Step::CopySource { .. } | Step::FuzzBuild { .. } => {}
    }
  }

  Ok(out)
}

/// `.dockerignore` matching the source copy's exclude list.
pub fn render_dockerignore(def: &PipelineDef) -> String {
  let mut out = String::from("# Generated by fuzzpack. Do not edit.\n");
  for step in &def.builder.steps {
    if let Step::CopySource { exclude } = step {
      for name in exclude {
        out.push_str(&format!("**/{name}\n"));
      }
    }
  }
  out
}

fn stage_resolver(stage: StageKind, triple: &str) -> ContainerResolver {
  let keys: &[EnvPath] = match stage {
    StageKind::Builder => &[
      EnvPath::Root,
      EnvPath::Home,
      EnvPath::Src,
      EnvPath::Cargo,
      EnvPath::Rustup,
      EnvPath::Downloads,
      EnvPath::Tmp,
    ],
    StageKind::Package => &[EnvPath::Root, EnvPath::Rootfs, EnvPath::Src, EnvPath::Tmp],
  };
  ContainerResolver {
    outputs: Vec::new(),
    paths: keys.iter().map(|key| (*key, container_path(*key))).collect(),
    triple: triple.to_string(),
  }
}

/// Reject references to outputs that only exist at run time.
fn check_references(def: &PipelineDef, stage: StageKind, index: usize, step: &Step) -> Result<(), RenderError> {
  for template in step.templates() {
    let segments = placeholder::parse(template).map_err(|source| RenderError::Placeholder { stage, index, source })?;
    for segment in segments {
      if let Segment::Placeholder(Placeholder::Action(referenced)) = segment {
        let kind = def
          .stage(stage)
          .steps
          .get(referenced)
          .map(Step::kind)
          .unwrap_or("unknown");
        if matches!(kind, "cmd" | "copy_artifacts" | "unknown") {
          return Err(RenderError::RuntimeOutput {
            stage,
            index,
            referenced,
            kind,
          });
        }
      }
    }
  }
  Ok(())
}

/// A `RUN` instruction; multi-line commands, step env and cwd use a heredoc.
fn run_instruction(cmd: &str, env: &BTreeMap<String, String>, cwd: Option<&str>) -> String {
  let cmd = cmd.trim();
  if env.is_empty() && cwd.is_none() && !cmd.contains('\n') {
    return format!("RUN {cmd}\n");
  }

  let mut out = String::from("RUN <<'FUZZPACK_EOF'\nset -e\n");
  for (key, value) in env {
    out.push_str(&format!("export {key}={}\n", shell_quote(value)));
  }
  if let Some(cwd) = cwd {
    out.push_str(&format!("cd {}\n", shell_quote(cwd)));
  }
  out.push_str(cmd);
  out.push_str("\nFUZZPACK_EOF\n");
  out
}

fn shell_quote(value: &str) -> String {
  format!("'{}'", value.replace('\'', r"'\''"))
}
