//! Implementation of the `fuzzpack smoke` command.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::Stream;

use fuzzpack_lib::smoke::{Outcome, SmokeOptions, smoke};

use crate::output::{Mark, faint, field, print_json, status};

/// Run each packaged harness once on an empty and once on a seeded random input.
///
/// Findings in the code under test are reported but pass; a harness that
/// cannot run cleanly fails the command.
pub fn cmd_smoke(config: &Path, image: Option<&Path>, seed: u64, timeout: Duration, json: bool) -> Result<ExitCode> {
  let dir = super::image_dir(config, image)?;
  let options = SmokeOptions {
    seed,
    timeout,
    ..SmokeOptions::default()
  };

  let rt = super::runtime()?;
  let report = rt.block_on(smoke(&dir, &options)).context("Smoke test failed")?;

  if json {
    print_json(&report)?;
  } else {
    for run in &report.runs {
      println!(
        "  {} /{} ({} input)",
        Mark::from(run.outcome).paint(Stream::Stdout),
        run.artifact,
        run.input
      );
      if run.outcome != Outcome::Clean {
        for line in run.detail.lines() {
          println!("      {}", faint(line));
        }
      }
    }
    println!();
    field("Clean", report.count(Outcome::Clean));
    field("Findings", report.count(Outcome::Finding));
    field("Harness defects", report.count(Outcome::HarnessDefect));
    if report.count(Outcome::Finding) > 0 {
      status(Mark::Finding, "Some harnesses reported crashes in the code under test");
    }
  }

  if report.passed() {
    if !json {
      status(Mark::Done, "All harnesses ran");
    }
    Ok(ExitCode::SUCCESS)
  } else {
    if !json {
      status(Mark::Failed, "Some harnesses could not run cleanly");
    }
    Ok(ExitCode::FAILURE)
  }
}
