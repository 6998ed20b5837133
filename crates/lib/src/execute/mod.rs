//! Pipeline execution.
//!
//! This module provides the main entry point for running a lowered pipeline.
//! It handles:
//! - Fresh builder and package environments per run
//! - Ordered step execution with fail-fast skip tracking
//! - Optional concurrent compilation of consecutive fuzz builds
//! - Publishing the packaged rootfs as an image

pub mod actions;
pub mod resolver;
pub mod types;

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::env::{self, Environment};
use crate::harness::BuiltHarnesses;
use crate::package::{ImageInfo, Packager, write_image};
use crate::pipeline::{PipelineDef, StageKind, Step};
use crate::placeholder::{EnvPath, PlaceholderError};
use crate::util::hash::Hashable;

use actions::{StepContext, execute_step};
use resolver::StageResolver;

pub use types::{ExecuteError, ExecuteOptions, RunReport, StepRecord, StepStatus};

/// Run a pipeline from a fresh builder environment to a written image.
///
/// Step failures do not produce an `Err`: they end the run and are reported
/// in [`RunReport::failed`], with every later step recorded as skipped.
/// `Err` is reserved for problems outside any step, such as an invalid
/// definition or an unwritable output directory.
pub async fn run_pipeline(def: &PipelineDef, options: &ExecuteOptions) -> Result<RunReport, ExecuteError> {
  let started = Instant::now();
  def.validate()?;
  let pipeline_hash = def.compute_hash()?;

  info!(
    pipeline = %def.name,
    hash = %pipeline_hash,
    triple = %def.target_triple,
    builder_steps = def.builder.steps.len(),
    package_steps = def.package.steps.len(),
    "starting pipeline"
  );

  let mut report = RunReport {
    pipeline_hash: pipeline_hash.clone(),
    steps: Vec::new(),
    failed: None,
    manifest: None,
    image_dir: options.output_dir.clone(),
    kept_env: None,
    duration: Duration::ZERO,
  };

  let builder = Environment::create(StageKind::Builder, &options.work_dir)?;
  let builder_vars = builder.command_vars(&def.system_path, &def.target_triple);
  let mut builder_ctx = StepContext {
    stage: StageKind::Builder,
    env: &builder,
    builder: &builder,
    vars: &builder_vars,
    triple: &def.target_triple,
    project_root: &options.project_root,
    downloads_cache: &options.downloads_dir,
    packager: None,
  };
  run_stage(def, &mut builder_ctx, options, &mut report).await;

  if report.failed.is_none() {
    let package = Environment::create(StageKind::Package, &options.work_dir)?;
    let rootfs = package
      .path(EnvPath::Rootfs)
      .ok_or(ExecuteError::Placeholder(PlaceholderError::UnresolvedPath(EnvPath::Rootfs)))?;
    let mut packager = Packager::new(&rootfs);
    let package_vars = package.command_vars(&def.system_path, &def.target_triple);
    let mut package_ctx = StepContext {
      stage: StageKind::Package,
      env: &package,
      builder: &builder,
      vars: &package_vars,
      triple: &def.target_triple,
      project_root: &options.project_root,
      downloads_cache: &options.downloads_dir,
      packager: Some(&mut packager),
    };
    run_stage(def, &mut package_ctx, options, &mut report).await;

    if report.failed.is_none() {
      let image = ImageInfo {
        name: def.name.clone(),
        base: def.base.pinned(),
        pipeline_hash: pipeline_hash.0.clone(),
        target_triple: def.target_triple.clone(),
      };
      report.manifest = Some(write_image(&rootfs, packager.artifacts(), &options.output_dir, &image)?);
    }
    package.discard()?;
  }

  if options.keep_env {
    report.kept_env = Some(builder.keep());
  } else {
    builder.discard()?;
  }

  report.duration = started.elapsed();
  if let Some(((stage, index), err)) = &report.failed {
    error!(stage = %stage, index, error = %err, "pipeline failed");
  } else {
    info!(
      succeeded = report.count(StepStatus::Succeeded),
      duration = ?report.duration,
      image = %report.image_dir.display(),
      "pipeline complete"
    );
  }
  Ok(report)
}

/// Run every step of the context's stage, stopping at the first failure.
async fn run_stage(def: &PipelineDef, ctx: &mut StepContext<'_>, options: &ExecuteOptions, report: &mut RunReport) {
  let stage = ctx.stage;
  let steps = &def.stage(stage).steps;
  let mut resolver = StageResolver::new(env::stage_paths(ctx.env, ctx.builder), def.target_triple.as_str());

  debug!(stage = %stage, steps = steps.len(), "running stage");
  let mut index = 0;
  while index < steps.len() {
    let group = if options.parallel {
      steps[index..]
        .iter()
        .take_while(|s| matches!(s, Step::FuzzBuild { .. }))
        .count()
    } else {
      0
    };

    if group > 1 {
      let batch = run_parallel_builds(&steps[index..index + group], index, &resolver, ctx, options.step_timeout).await;
      report.steps.extend(batch.records);
      if let Some((failed_index, err)) = batch.failure {
        report.failed = Some(((stage, failed_index), err));
        skip_from(def, stage, index + group, report);
        return;
      }
      for output in batch.outputs {
        resolver.push_action_result(output);
      }
      index += group;
      continue;
    }

    let step = &steps[index];
    info!(stage = %stage, index, kind = step.kind(), "{}", step.describe());
    let step_started = Instant::now();
    let result = with_timeout(step, options.step_timeout, execute_step(index, step, &resolver, ctx)).await;
    let duration = step_started.elapsed();

    match result {
      Ok(output) => {
        debug!(stage = %stage, index, output = %output, "step succeeded");
        report.steps.push(record(stage, index, step, duration, StepStatus::Succeeded));
        resolver.push_action_result(output);
      }
      Err(err) => {
        error!(stage = %stage, index, error = %err, "step failed");
        report.steps.push(record(stage, index, step, duration, StepStatus::Failed));
        report.failed = Some(((stage, index), err));
        skip_from(def, stage, index + 1, report);
        return;
      }
    }
    index += 1;
  }
}

/// Outcome of a group of fuzz builds compiled concurrently.
struct BuildBatch {
  records: Vec<StepRecord>,
  outputs: Vec<String>,
  failure: Option<(usize, ExecuteError)>,
}

/// Compile consecutive `fuzz_build` steps concurrently.
///
/// The first failure aborts the builds still running; those are recorded as
/// skipped. When several builds fail, the lowest step index is reported.
async fn run_parallel_builds(
  steps: &[Step],
  first: usize,
  resolver: &StageResolver,
  ctx: &StepContext<'_>,
  timeout: Option<Duration>,
) -> BuildBatch {
  let stage = ctx.stage;
  let mut join_set = JoinSet::new();

  for (offset, step) in steps.iter().enumerate() {
    let Step::FuzzBuild { component, command } = step else {
      continue;
    };
    let build = match ctx.harness_build(component, command, resolver) {
      Ok(build) => build,
      Err(err) => {
        join_set.abort_all();
        let records = steps
          .iter()
          .enumerate()
          .map(|(i, s)| {
            let status = if i == offset {
              StepStatus::Failed
            } else {
              StepStatus::Skipped
            };
            record(stage, first + i, s, Duration::ZERO, status)
          })
          .collect();
        return BuildBatch {
          records,
          outputs: Vec::new(),
          failure: Some((first + offset, err)),
        };
      }
    };

    info!(stage = %stage, index = first + offset, kind = step.kind(), "{}", step.describe());
    let span = info_span!("fuzz_build", component = %build.component);
    let step = step.clone();
    join_set.spawn(
      async move {
        let started = Instant::now();
        let result = with_timeout(&step, timeout, build.run()).await;
        (offset, started.elapsed(), result)
      }
      .instrument(span),
    );
  }

  let mut outcomes: Vec<Option<(Duration, Result<BuiltHarnesses, ExecuteError>)>> =
    steps.iter().map(|_| None).collect();
  let mut panicked: Option<String> = None;

  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok((offset, elapsed, result)) => {
        if let Err(err) = &result {
          error!(index = first + offset, error = %err, "fuzz build failed, aborting the rest");
          join_set.abort_all();
        }
        outcomes[offset] = Some((elapsed, result));
      }
      Err(join_err) if join_err.is_cancelled() => {}
      Err(join_err) => {
        error!(error = %join_err, "fuzz build task panicked");
        join_set.abort_all();
        panicked.get_or_insert(join_err.to_string());
      }
    }
  }

  let mut batch = BuildBatch {
    records: Vec::with_capacity(steps.len()),
    outputs: Vec::with_capacity(steps.len()),
    failure: None,
  };
  for (offset, (step, outcome)) in steps.iter().zip(outcomes).enumerate() {
    let index = first + offset;
    match outcome {
      Some((elapsed, Ok(built))) => {
        batch.records.push(record(stage, index, step, elapsed, StepStatus::Succeeded));
        batch.outputs.push(built.artifact_dir.to_string_lossy().to_string());
      }
      Some((elapsed, Err(err))) => {
        batch.records.push(record(stage, index, step, elapsed, StepStatus::Failed));
        if batch.failure.is_none() {
          batch.failure = Some((index, err));
        }
      }
      None => match panicked.take() {
        Some(message) if batch.failure.is_none() => {
          batch.records.push(record(stage, index, step, Duration::ZERO, StepStatus::Failed));
          batch.failure = Some((index, ExecuteError::Task(message)));
        }
        _ => batch.records.push(record(stage, index, step, Duration::ZERO, StepStatus::Skipped)),
      },
    }
  }
  batch
}

async fn with_timeout<T>(
  step: &Step,
  timeout: Option<Duration>,
  fut: impl Future<Output = Result<T, ExecuteError>>,
) -> Result<T, ExecuteError> {
  match timeout {
    Some(after) => tokio::time::timeout(after, fut)
      .await
      .map_err(|_| ExecuteError::Timeout {
        step: step.describe(),
        after,
      })?,
    None => fut.await,
  }
}

fn record(stage: StageKind, index: usize, step: &Step, duration: Duration, status: StepStatus) -> StepRecord {
  StepRecord {
    stage,
    index,
    kind: step.kind(),
    description: step.describe(),
    duration,
    status,
  }
}

/// Record the steps of `stage` from `start` on, and of every later stage, as skipped.
fn skip_from(def: &PipelineDef, stage: StageKind, start: usize, report: &mut RunReport) {
  let stages: &[StageKind] = match stage {
    StageKind::Builder => &[StageKind::Builder, StageKind::Package],
    StageKind::Package => &[StageKind::Package],
  };
  for kind in stages {
    let from = if *kind == stage { start } else { 0 };
    for (index, step) in def.stage(*kind).steps.iter().enumerate().skip(from) {
      warn!(stage = %kind, index, kind = step.kind(), "skipping step after failure");
      report.steps.push(record(*kind, index, step, Duration::ZERO, StepStatus::Skipped));
    }
  }
}
