//! Smoke test of a packaged image.
//!
//! Each harness in the image is run once on an empty input and once on a
//! pseudo-random input derived from a seed. A crash of the code under test
//! is reported by the harness itself (a libFuzzer or sanitizer report on
//! stderr) and counts as a finding; anything else that keeps the harness
//! from finishing cleanly is a harness defect.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::consts::ROOTFS_DIRNAME;
use crate::package::{VerifyError, verify_image};

/// Markers a harness prints when the code under test crashed.
const FINDING_MARKERS: &[&str] = &[
  "ERROR: libFuzzer",
  "ERROR: AddressSanitizer",
  "ERROR: MemorySanitizer",
  "ERROR: LeakSanitizer",
  "runtime error:",
  "panicked at",
];

const DETAIL_LINES: usize = 5;

#[derive(Debug, Error)]
pub enum SmokeError {
  #[error(transparent)]
  Verify(#[from] VerifyError),

  #[error("io error at {}: {source}", path.display())]
  Io { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone)]
pub struct SmokeOptions {
  pub seed: u64,
  /// Length of the random input in bytes.
  pub random_len: usize,
  /// Upper bound for a single harness run.
  pub timeout: Duration,
}

impl Default for SmokeOptions {
  fn default() -> Self {
    Self {
      seed: 0,
      random_len: 4096,
      timeout: Duration::from_secs(30),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
  Empty,
  Random,
}

impl fmt::Display for InputKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InputKind::Empty => f.write_str("empty"),
      InputKind::Random => f.write_str("random"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Clean,
  /// The code under test crashed and the harness reported it.
  Finding,
  /// The harness could not run, hung, or died without a report.
  HarnessDefect,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmokeRun {
  pub artifact: String,
  pub input: InputKind,
  pub outcome: Outcome,
  pub exit_code: Option<i32>,
  /// Tail of stderr, or why the harness could not run.
  pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SmokeReport {
  pub runs: Vec<SmokeRun>,
}

impl SmokeReport {
  /// No harness defects. Findings do not fail a smoke test.
  pub fn passed(&self) -> bool {
    self.runs.iter().all(|r| r.outcome != Outcome::HarnessDefect)
  }

  pub fn count(&self, outcome: Outcome) -> usize {
    self.runs.iter().filter(|r| r.outcome == outcome).count()
  }
}

/// Deterministic pseudo-random bytes: SHA-256 of `seed || counter`, concatenated.
pub fn random_input(seed: u64, len: usize) -> Vec<u8> {
  let mut out = Vec::with_capacity(len);
  let mut counter: u64 = 0;
  while out.len() < len {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(counter.to_le_bytes());
    out.extend_from_slice(&hasher.finalize());
    counter += 1;
  }
  out.truncate(len);
  out
}

/// Verify the image, then run every harness on the empty and random inputs.
pub async fn smoke(image_dir: &Path, options: &SmokeOptions) -> Result<SmokeReport, SmokeError> {
  let manifest = verify_image(image_dir)?;
  let rootfs = image_dir.join(ROOTFS_DIRNAME);

  let scratch = tempfile::tempdir().map_err(|source| SmokeError::Io {
    path: std::env::temp_dir(),
    source,
  })?;
  let inputs = [
    (InputKind::Empty, Vec::new()),
    (InputKind::Random, random_input(options.seed, options.random_len)),
  ];
  let mut input_paths = Vec::with_capacity(inputs.len());
  for (kind, bytes) in &inputs {
    let path = scratch.path().join(format!("input-{kind}"));
    tokio::fs::write(&path, bytes).await.map_err(|source| SmokeError::Io {
      path: path.clone(),
      source,
    })?;
    input_paths.push((*kind, path));
  }

  let mut report = SmokeReport::default();
  for artifact in &manifest.artifacts {
    if !artifact.executable {
      debug!(artifact = %artifact.name, "not a harness, skipping");
      continue;
    }
    let binary = rootfs.join(&artifact.name);
    for (kind, input) in &input_paths {
      let run = run_harness(&binary, &artifact.name, *kind, input, scratch.path(), options.timeout).await;
      match run.outcome {
        Outcome::Clean => info!(artifact = %run.artifact, input = %kind, "clean"),
        Outcome::Finding => warn!(artifact = %run.artifact, input = %kind, "harness reported a finding"),
        Outcome::HarnessDefect => warn!(artifact = %run.artifact, input = %kind, detail = %run.detail, "harness defect"),
      }
      report.runs.push(run);
    }
  }
  Ok(report)
}

async fn run_harness(
  binary: &Path,
  name: &str,
  kind: InputKind,
  input: &Path,
  cwd: &Path,
  timeout: Duration,
) -> SmokeRun {
  let defect = |detail: String| SmokeRun {
    artifact: name.to_string(),
    input: kind,
    outcome: Outcome::HarnessDefect,
    exit_code: None,
    detail,
  };

  let mut command = Command::new(binary);
  command
    .arg(input)
    .current_dir(cwd)
    .env_clear()
    .env("PATH", "/usr/local/bin:/usr/bin:/bin")
    .env("HOME", cwd)
    .env("LC_ALL", "C")
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  debug!(binary = %binary.display(), input = %input.display(), "running harness");
  let output = match tokio::time::timeout(timeout, command.output()).await {
    Ok(Ok(output)) => output,
    Ok(Err(err)) => return defect(format!("failed to execute: {err}")),
    Err(_) => return defect(format!("timed out after {}", humantime::format_duration(timeout))),
  };

  let stderr = String::from_utf8_lossy(&output.stderr);
  let outcome = classify(output.status.success(), &stderr);
  SmokeRun {
    artifact: name.to_string(),
    input: kind,
    outcome,
    exit_code: output.status.code(),
    detail: tail(&stderr),
  }
}

fn classify(success: bool, stderr: &str) -> Outcome {
  if FINDING_MARKERS.iter().any(|marker| stderr.contains(marker)) {
    Outcome::Finding
  } else if success {
    Outcome::Clean
  } else {
    Outcome::HarnessDefect
  }
}

fn tail(stderr: &str) -> String {
  let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
  lines[lines.len().saturating_sub(DETAIL_LINES)..].join("\n")
}
