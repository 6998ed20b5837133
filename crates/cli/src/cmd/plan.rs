//! Implementation of the `fuzzpack plan` command.
//!
//! Prints what `fuzzpack build` would do without creating an environment
//! or running a step.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use fuzzpack_lib::plan::plan;

use crate::output::{Mark, field, print_json, short_hash};

pub fn cmd_plan(config: &Path, json: bool) -> Result<()> {
  let (project, def) = super::load_pipeline(config)?;
  let plan = plan(&def, &project.root).context("Failed to plan pipeline")?;

  if json {
    return print_json(&plan);
  }

  println!("{}", format!("Plan for {}", plan.name).if_supports_color(Stream::Stdout, |s| s.bold()));
  field("Pipeline", short_hash(&plan.pipeline_hash.0));
  field("Base", &plan.base);
  field("Target", &plan.target_triple);

  for stage in &plan.stages {
    println!();
    println!("{} ({} steps):", stage.stage, stage.steps.len());
    for step in &stage.steps {
      println!(
        "  {:>2} {} {}",
        step.index,
        format!("{:<14}", step.kind).if_supports_color(Stream::Stdout, |s| s.cyan()),
        step.description
      );
    }
  }

  println!();
  println!("Fuzz targets:");
  for target in &plan.targets {
    println!(
      "  {} {}/{} → {}",
      Mark::Note.paint(Stream::Stdout),
      target.component,
      target.name,
      target.image_path
    );
    field("  artifact", &target.artifact);
  }

  println!();
  println!("Image root: {}", plan.image.join(" "));
  println!("{} step(s), {} target(s)", plan.step_count(), plan.targets.len());
  Ok(())
}
