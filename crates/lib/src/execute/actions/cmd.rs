//! Cmd step implementation.
//!
//! Commands run through `/bin/sh -c` with the environment cleared. The only
//! variables visible to a command are the environment's base variables (see
//! [`Environment::command_vars`](crate::env::Environment::command_vars)) and
//! the step's own `env`, so nothing leaks in from the machine running the
//! pipeline.
//!
//! Each command leads its own process group. When the step ends, times out or
//! is aborted, the whole group is killed so no driver subprocess keeps
//! writing into an environment that is about to be discarded.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::execute::types::ExecuteError;

const SHELL: &str = "/bin/sh";

/// Number of stderr lines kept in a [`ExecuteError::CmdFailed`].
const STDERR_TAIL_LINES: usize = 20;

/// Execute a shell command.
///
/// # Arguments
///
/// * `cmd` - The command string to execute
/// * `env` - Optional step-specific variables, applied over `base_vars`
/// * `cwd` - Optional working directory (defaults to `default_cwd`)
/// * `base_vars` - The environment's isolated variables
/// * `default_cwd` - Working directory when the step sets none
///
/// # Returns
///
/// The stdout of the command on success (trimmed).
pub async fn execute_cmd(
  cmd: &str,
  env: Option<&BTreeMap<String, String>>,
  cwd: Option<&str>,
  base_vars: &BTreeMap<String, String>,
  default_cwd: &Path,
) -> Result<String, ExecuteError> {
  info!(cmd = %cmd, "executing command");

  let working_dir = cwd.map(Path::new).unwrap_or(default_cwd);

  let mut command = Command::new(SHELL);
  command
    .arg("-c")
    .arg(cmd)
    .current_dir(working_dir)
    .env_clear()
    .envs(base_vars)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  #[cfg(unix)]
  command.process_group(0);

  if let Some(user_env) = env {
    command.envs(user_env);
  }

  debug!(shell = SHELL, working_dir = ?working_dir, "spawning process");

  let child = command.spawn()?;
  let _group = ProcessGroup::new(child.id());
  let output = child.wait_with_output().await?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(ExecuteError::CmdFailed {
      cmd: cmd.to_string(),
      code: output.status.code(),
      stderr: tail(&stderr, STDERR_TAIL_LINES),
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(stdout)
}

/// Kills the process group led by a spawned command when dropped.
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
  fn new(leader: Option<u32>) -> Self {
    Self(leader)
  }
}

impl Drop for ProcessGroup {
  #[cfg(unix)]
  fn drop(&mut self) {
    use rustix::process::{Pid, Signal, kill_process_group};

    let Some(pid) = self.0.and_then(|id| i32::try_from(id).ok()).and_then(Pid::from_raw) else {
      return;
    };
    // ESRCH once every member has exited.
    if kill_process_group(pid, Signal::KILL).is_ok() {
      debug!(pgid = pid.as_raw_nonzero().get(), "killed leftover processes");
    }
  }

  #[cfg(not(unix))]
  fn drop(&mut self) {}
}

/// The last `lines` non-empty lines of `text`.
fn tail(text: &str, lines: usize) -> String {
  let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
  let start = kept.len().saturating_sub(lines);
  kept[start..].join("\n")
}
