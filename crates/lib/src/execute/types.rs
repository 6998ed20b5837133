//! Types for pipeline execution.
//!
//! This module defines the error type, the per-step records and the options
//! for running a [`PipelineDef`](crate::pipeline::PipelineDef).

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::package::{ImageManifest, PackageError};
use crate::pipeline::{PipelineError, StageKind};
use crate::placeholder::PlaceholderError;
use crate::target::TargetError;
use crate::util::hash::ObjectHash;

/// Errors that can occur while running a pipeline.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// A placeholder could not be resolved.
  #[error("placeholder error: {0}")]
  Placeholder(#[from] PlaceholderError),

  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  /// HTTP request failed during a FetchUrl step.
  #[error("fetch failed for {url}: {message}")]
  FetchFailed { url: String, message: String },

  /// SHA256 hash mismatch after download.
  #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  /// The detached signature does not verify against the pinned key.
  #[error("signature verification failed for {url}: {message}")]
  SignatureInvalid { url: String, message: String },

  /// Command exited unsuccessfully. `stderr` holds the tail of its output.
  #[error("command failed with exit code {code:?}: {cmd}{}", format_tail(stderr))]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  /// A step exceeded the configured step timeout.
  #[error("step timed out after {}: {step}", humantime::format_duration(*after))]
  Timeout { step: String, after: Duration },

  /// Fuzz target discovery failed.
  #[error(transparent)]
  Target(#[from] TargetError),

  /// The driver reported success but a declared harness was not produced.
  #[error("fuzz target {component}/{name} was not produced at {}", path.display())]
  ArtifactMissing {
    component: String,
    name: String,
    path: PathBuf,
  },

  #[error(transparent)]
  Package(#[from] PackageError),

  /// A parallel task ended without producing a result.
  #[error("task failed: {0}")]
  Task(String),

  #[error("failed to serialize pipeline: {0}")]
  Serialize(#[from] serde_json::Error),

  /// I/O error during execution.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

fn format_tail(stderr: &str) -> String {
  if stderr.is_empty() {
    String::new()
  } else {
    format!("\n{stderr}")
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Succeeded,
  Failed,
  /// Not run because an earlier step failed.
  Skipped,
}

/// What happened to one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
  pub stage: StageKind,
  pub index: usize,
  pub kind: &'static str,
  pub description: String,
  #[serde(serialize_with = "serialize_duration")]
  pub duration: Duration,
  pub status: StepStatus,
}

fn serialize_duration<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64(value.as_secs_f64())
}

/// Result of a pipeline run.
///
/// A run stops at the first failing step; that step and its error are kept in
/// `failed` and every step after it is recorded as skipped.
#[derive(Debug)]
pub struct RunReport {
  pub pipeline_hash: ObjectHash,
  pub steps: Vec<StepRecord>,
  pub failed: Option<((StageKind, usize), ExecuteError)>,
  /// Present once the image has been written.
  pub manifest: Option<ImageManifest>,
  pub image_dir: PathBuf,
  /// Location of the builder environment when it was kept.
  pub kept_env: Option<PathBuf>,
  pub duration: Duration,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_none() && self.manifest.is_some()
  }

  pub fn count(&self, status: StepStatus) -> usize {
    self.steps.iter().filter(|s| s.status == status).count()
  }
}

/// Options for running a pipeline.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
  /// Source tree copied into the builder environment.
  pub project_root: PathBuf,
  /// Where `rootfs/`, the manifest and the archive are written.
  pub output_dir: PathBuf,
  /// Parent of the per-run environment directories.
  pub work_dir: PathBuf,
  /// Content-addressed download cache.
  pub downloads_dir: PathBuf,
  /// Compile consecutive fuzz builds concurrently.
  pub parallel: bool,
  pub step_timeout: Option<Duration>,
  /// Keep the builder environment after the run for inspection.
  pub keep_env: bool,
}

impl ExecuteOptions {
  pub fn new(project_root: PathBuf, output_dir: PathBuf) -> Self {
    Self {
      project_root,
      output_dir,
      work_dir: crate::platform::paths::work_dir(),
      downloads_dir: crate::platform::paths::downloads_dir(),
      parallel: false,
      step_timeout: None,
      keep_env: false,
    }
  }
}
