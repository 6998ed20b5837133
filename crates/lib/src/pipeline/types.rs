use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{SelectionPolicy, SignatureConfig};
use crate::platform::TargetTriple;
use crate::util::hash::Hashable;

/// A single operation of a stage.
///
/// Steps are declarative: every string may contain placeholders that are only
/// resolved when the step runs (see [`crate::placeholder`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
  /// Run a shell command in the isolated environment. Output is trimmed stdout.
  Cmd {
    cmd: String,
    env: Option<BTreeMap<String, String>>,
    cwd: Option<String>,
  },

  /// Download a pinned artifact into the environment. Output is its path.
  ///
  /// Built in so that bootstrapping the toolchain does not depend on a
  /// downloader already being present.
  FetchUrl {
    url: String,
    sha256: String,
    signature: Option<SignatureConfig>,
    executable: bool,
  },

  /// Copy the project tree into `$${path:src}`. Output is the destination.
  CopySource { exclude: Vec<String> },

  /// Compile every fuzz target declared by a component. Output is the
  /// component's artifact directory.
  FuzzBuild { component: String, command: String },

  /// Copy a component's compiled harnesses into the image rootfs. Output is
  /// the space-separated list of copied names.
  CopyArtifacts {
    component: String,
    pattern: String,
    selection: SelectionPolicy,
  },
}

impl Step {
  pub fn kind(&self) -> &'static str {
    match self {
      Step::Cmd { .. } => "cmd",
      Step::FetchUrl { .. } => "fetch_url",
      Step::CopySource { .. } => "copy_source",
      Step::FuzzBuild { .. } => "fuzz_build",
      Step::CopyArtifacts { .. } => "copy_artifacts",
    }
  }

  /// Whether the step can run in a stage's environment. Only the builder
  /// has a toolchain and a source copy; only the package stage has a rootfs.
  pub fn allowed_in(&self, stage: StageKind) -> bool {
    match self {
      Step::Cmd { .. } => true,
      Step::FetchUrl { .. } | Step::CopySource { .. } | Step::FuzzBuild { .. } => stage == StageKind::Builder,
      Step::CopyArtifacts { .. } => stage == StageKind::Package,
    }
  }

  /// One-line human description, placeholders left unresolved.
  pub fn describe(&self) -> String {
    match self {
      Step::Cmd { cmd, .. } => cmd.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("").to_string(),
      Step::FetchUrl { url, .. } => url.clone(),
      Step::CopySource { exclude } => format!("copy source (exclude {})", exclude.join(", ")),
      Step::FuzzBuild { component, .. } => format!("build fuzz targets of {component}"),
      Step::CopyArtifacts { component, pattern, .. } => format!("{component}: {pattern} -> /"),
    }
  }

  /// Every string field that may carry placeholders.
  pub(crate) fn templates(&self) -> Vec<&str> {
    match self {
      Step::Cmd { cmd, env, cwd } => {
        let mut out = vec![cmd.as_str()];
        if let Some(env) = env {
          out.extend(env.values().map(String::as_str));
        }
        if let Some(cwd) = cwd {
          out.push(cwd);
        }
        out
      }
      Step::FetchUrl { url, sha256, .. } => vec![url, sha256],
      Step::CopySource { .. } => Vec::new(),
      Step::FuzzBuild { command, .. } => vec![command],
      Step::CopyArtifacts { pattern, .. } => vec![pattern],
    }
  }
}

/// Which environment a stage runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
  Builder,
  Package,
}

impl StageKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      StageKind::Builder => "builder",
      StageKind::Package => "package",
    }
  }
}

impl std::fmt::Display for StageKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageDef {
  pub steps: Vec<Step>,
}

/// Base image both stages conceptually start from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseImage {
  pub reference: String,
  pub digest: Option<String>,
}

impl BaseImage {
  /// `reference@digest` when pinned, the bare reference otherwise.
  pub fn pinned(&self) -> String {
    match &self.digest {
      Some(digest) => format!("{}@{}", self.reference, digest),
      None => self.reference.clone(),
    }
  }
}

/// The lowered, hashable pipeline.
///
/// Two definitions that serialize identically produce the same image, so the
/// JSON form is the pipeline's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub name: String,
  pub base: BaseImage,
  pub target_triple: TargetTriple,
  /// Search path appended after the toolchain's own `bin` directory.
  pub system_path: String,
  pub components: Vec<String>,
  pub builder: StageDef,
  pub package: StageDef,
}

impl Hashable for PipelineDef {}

impl PipelineDef {
  pub fn stage(&self, kind: StageKind) -> &StageDef {
    match kind {
      StageKind::Builder => &self.builder,
      StageKind::Package => &self.package,
    }
  }
}

/// Options for a [`StepCtx::cmd`] step.
pub struct CmdOptions {
  pub cmd: String,
  pub env: Option<BTreeMap<String, String>>,
  pub cwd: Option<String>,
}

impl CmdOptions {
  pub fn new(cmd: &str) -> Self {
    Self {
      cmd: cmd.to_string(),
      env: None,
      cwd: None,
    }
  }

  pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
    self.env = if env.is_empty() { None } else { Some(env) };
    self
  }
}

impl From<&str> for CmdOptions {
  fn from(cmd: &str) -> Self {
    CmdOptions::new(cmd)
  }
}

impl From<String> for CmdOptions {
  fn from(cmd: String) -> Self {
    CmdOptions::new(&cmd)
  }
}

/// Options for a [`StepCtx::fetch_url`] step.
pub struct FetchOptions {
  pub url: String,
  pub sha256: String,
  pub signature: Option<SignatureConfig>,
  pub executable: bool,
}

impl FetchOptions {
  pub fn new(url: &str, sha256: &str) -> Self {
    Self {
      url: url.to_string(),
      sha256: sha256.to_string(),
      signature: None,
      executable: false,
    }
  }

  pub fn with_signature(mut self, signature: Option<SignatureConfig>) -> Self {
    self.signature = signature;
    self
  }

  pub fn executable(mut self) -> Self {
    self.executable = true;
    self
  }
}

/// Records the steps of one stage.
///
/// Every recording method returns the `$${action:N}` placeholder of the step it
/// added, so later steps can consume earlier outputs.
#[derive(Default)]
pub struct StepCtx {
  steps: Vec<Step>,
}

impl StepCtx {
  pub fn new() -> Self {
    Self { steps: Vec::new() }
  }

  fn push(&mut self, step: Step) -> String {
    let output = format!("$${{action:{}}}", self.steps.len());
    self.steps.push(step);
    output
  }

  pub fn cmd(&mut self, opts: impl Into<CmdOptions>) -> String {
    let opts = opts.into();
    self.push(Step::Cmd {
      cmd: opts.cmd,
      env: opts.env,
      cwd: opts.cwd,
    })
  }

  pub fn fetch_url(&mut self, opts: FetchOptions) -> String {
    self.push(Step::FetchUrl {
      url: opts.url,
      sha256: opts.sha256,
      signature: opts.signature,
      executable: opts.executable,
    })
  }

  pub fn copy_source(&mut self, exclude: &[String]) -> String {
    self.push(Step::CopySource {
      exclude: exclude.to_vec(),
    })
  }

  pub fn fuzz_build(&mut self, component: &str, command: &str) -> String {
    self.push(Step::FuzzBuild {
      component: component.to_string(),
      command: command.to_string(),
    })
  }

  pub fn copy_artifacts(&mut self, component: &str, pattern: &str, selection: SelectionPolicy) -> String {
    self.push(Step::CopyArtifacts {
      component: component.to_string(),
      pattern: pattern.to_string(),
      selection,
    })
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn into_stage(self) -> StageDef {
    StageDef { steps: self.steps }
  }
}
