//! Implementation of the `fuzzpack build` command.
//!
//! Runs the builder and package stages in fresh environment directories and
//! writes the image to the configured output directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::Stream;

use fuzzpack_lib::execute::{ExecuteOptions, RunReport, StepRecord, StepStatus, run_pipeline};

use crate::output::{Mark, elapsed, faint, field, human_size, short_hash, status};

/// Flags of `fuzzpack build`.
pub struct BuildArgs {
  pub parallel: bool,
  pub timeout: Option<Duration>,
  pub keep_env: bool,
  pub output: Option<PathBuf>,
}

/// Execute the build command.
///
/// Exits non-zero when a step fails. The failing step's error carries the
/// tail of the underlying tool's stderr.
pub fn cmd_build(config: &Path, args: &BuildArgs) -> Result<ExitCode> {
  let (project, def) = super::load_pipeline(config)?;

  let output_dir = args.output.clone().unwrap_or_else(|| project.output_dir());
  let mut options = ExecuteOptions::new(project.root.clone(), output_dir);
  options.parallel = args.parallel || project.config.harness.parallel;
  options.step_timeout = match args.timeout {
    Some(timeout) => Some(timeout),
    None => project.config.execute.step_timeout().context("Invalid execute.step_timeout")?,
  };
  options.keep_env = args.keep_env;

  status(Mark::Note, format_args!("Building {} from {}", def.name, project.root.display()));

  let rt = super::runtime()?;
  let report = rt.block_on(run_pipeline(&def, &options)).context("Build failed")?;

  println!();
  for step in &report.steps {
    print_step(step);
  }
  println!();
  print_summary(&report);

  Ok(if report.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn print_step(step: &StepRecord) {
  let timing = match step.status {
    StepStatus::Skipped => "skipped".to_string(),
    _ => elapsed(step.duration),
  };
  println!(
    "  {} {}[{}] {} {}",
    Mark::from(step.status).paint(Stream::Stdout),
    step.stage,
    step.index,
    step.description,
    faint(&format!("({timing})"))
  );
}

fn print_summary(report: &RunReport) {
  if let Some(((stage, index), err)) = &report.failed {
    status(Mark::Failed, format_args!("Step {stage}[{index}] failed: {err}"));
    field("Skipped", report.count(StepStatus::Skipped));
  } else if let Some(manifest) = &report.manifest {
    status(
      Mark::Done,
      format_args!("Image {} written to {}", manifest.name, report.image_dir.display()),
    );
    field("Pipeline", short_hash(&report.pipeline_hash.0));
    field("Base", &manifest.base);
    field("Target", &manifest.target_triple);
    for artifact in &manifest.artifacts {
      field(
        &artifact.path,
        format_args!("{} sha256:{}", human_size(artifact.size), short_hash(&artifact.sha256)),
      );
    }
  }
  if let Some(env) = &report.kept_env {
    field("Builder environment kept at", env.display());
  }
  field("Duration", elapsed(report.duration));
}
