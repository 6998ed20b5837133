//! Toolchain provisioning steps.
//!
//! Provisioning turns a bare builder environment into one where the fuzz
//! driver works without further setup: native prerequisites, a pinned rustup
//! bootstrap, the configured nightly toolchain and the driver itself. Every
//! tool lands inside the environment (`CARGO_HOME`/`RUSTUP_HOME`), so it is
//! discarded with it.

use crate::config::{InstallerConfig, PipelineConfig};
use crate::pipeline::{CmdOptions, FetchOptions, StepCtx};

/// Record the provisioning steps into the builder stage.
///
/// Returns the placeholder of the final probe step.
pub fn provision_steps(ctx: &mut StepCtx, config: &PipelineConfig) -> String {
  let system = &config.system;

  if let Some(refresh) = &system.refresh {
    ctx.cmd(CmdOptions::new(refresh).with_env(system.env.clone()));
  }

  if let Some(install) = &system.install
    && !system.packages.is_empty()
  {
    let cmd = format!("{} {}", install, system.packages.join(" "));
    ctx.cmd(CmdOptions::new(&cmd).with_env(system.env.clone()));
  }

  let installer = bootstrap_installer(ctx, &config.toolchain.installer);
  ctx.cmd(format!("{} {}", installer, config.toolchain.installer.args.join(" ")));

  let channel = &config.toolchain.channel;
  ctx.cmd(format!("rustup toolchain install {channel} --profile minimal"));
  ctx.cmd(format!("rustup default {channel}"));

  let driver = &config.toolchain.driver;
  let mut install = format!("cargo install {} --locked", driver.name);
  if let Some(version) = &driver.version {
    install.push_str(&format!(" --version {version}"));
  }
  ctx.cmd(install);

  ctx.cmd(driver.probe.as_str())
}

/// Fetch the installer as a verified, executable file.
fn bootstrap_installer(ctx: &mut StepCtx, installer: &InstallerConfig) -> String {
  ctx.fetch_url(
    FetchOptions::new(&installer.url, &installer.sha256)
      .with_signature(installer.signature.clone())
      .executable(),
  )
}
