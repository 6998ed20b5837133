mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::{Mark, status};

/// fuzzpack - Build minimal images of fuzz harness binaries
#[derive(Parser)]
#[command(name = "fuzzpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the pipeline configuration
  #[arg(short, long, global = true, env = "FUZZPACK_CONFIG", default_value = "fuzzpack.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the pipeline and write the image
  Build {
    /// Compile fuzz targets of different components concurrently
    #[arg(long)]
    parallel: bool,

    /// Upper bound for each step (e.g. "30m"), overrides execute.step_timeout
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<std::time::Duration>,

    /// Keep the builder environment for inspection
    #[arg(long)]
    keep_env: bool,

    /// Image output directory, overrides image.output
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Show the steps, fuzz targets and image contents without running anything
  Plan {
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
  },

  /// Check a written image against its manifest
  Verify {
    /// Image directory (defaults to image.output)
    image: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
  },

  /// Run every packaged harness on an empty and a random input
  Smoke {
    /// Image directory (defaults to image.output)
    image: Option<PathBuf>,

    /// Seed for the random input
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Upper bound for a single harness run
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    timeout: std::time::Duration,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
  },

  /// Render the pipeline as a two-stage Dockerfile
  Render {
    /// Write the Dockerfile here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the matching .dockerignore instead
    #[arg(long)]
    dockerignore: bool,
  },

  /// Write a fuzzpack.toml template
  Init {
    /// Project directory
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Image name (defaults to "<directory>-fuzz")
    #[arg(long)]
    name: Option<String>,
  },

  /// Show host platform and paths
  Info,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(code) => code,
    Err(err) => {
      status(Mark::Failed, format_args!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<ExitCode> {
  match cli.command {
    Commands::Build {
      parallel,
      timeout,
      keep_env,
      output,
    } => cmd::cmd_build(
      &cli.config,
      &cmd::BuildArgs {
        parallel,
        timeout,
        keep_env,
        output,
      },
    ),
    Commands::Plan { json } => cmd::cmd_plan(&cli.config, json).map(|()| ExitCode::SUCCESS),
    Commands::Verify { image, json } => cmd::cmd_verify(&cli.config, image.as_deref(), json),
    Commands::Smoke {
      image,
      seed,
      timeout,
      json,
    } => cmd::cmd_smoke(&cli.config, image.as_deref(), seed, timeout, json),
    Commands::Render { output, dockerignore } => {
      cmd::cmd_render(&cli.config, output.as_deref(), dockerignore).map(|()| ExitCode::SUCCESS)
    }
    Commands::Init { path, name } => cmd::cmd_init(&path, name).map(|()| ExitCode::SUCCESS),
    Commands::Info => {
      cmd::cmd_info();
      Ok(ExitCode::SUCCESS)
    }
  }
}
