//! Terminal rendering shared by the subcommands.
//!
//! Every status line starts with a [`Mark`]. Colors are only emitted when the
//! stream the line goes to supports them.

use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream, Style};

use fuzzpack_lib::execute::StepStatus;
use fuzzpack_lib::smoke::Outcome;

/// Leading glyph of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
  Done,
  Failed,
  Skipped,
  Finding,
  Note,
}

impl Mark {
  pub fn glyph(self) -> &'static str {
    match self {
      Mark::Done => "✓",
      Mark::Failed => "✗",
      Mark::Skipped => "-",
      Mark::Finding => "⚠",
      Mark::Note => "•",
    }
  }

  fn colors(self) -> Style {
    match self {
      Mark::Done => Style::new().green(),
      Mark::Failed => Style::new().red(),
      Mark::Skipped => Style::new().dimmed(),
      Mark::Finding => Style::new().yellow(),
      Mark::Note => Style::new().cyan(),
    }
  }

  /// The glyph, colored when `stream` supports it.
  pub fn paint(self, stream: Stream) -> String {
    let colors = self.colors();
    self
      .glyph()
      .if_supports_color(stream, |glyph| glyph.style(colors))
      .to_string()
  }
}

impl From<StepStatus> for Mark {
  fn from(status: StepStatus) -> Self {
    match status {
      StepStatus::Succeeded => Mark::Done,
      StepStatus::Failed => Mark::Failed,
      StepStatus::Skipped => Mark::Skipped,
    }
  }
}

impl From<Outcome> for Mark {
  fn from(outcome: Outcome) -> Self {
    match outcome {
      Outcome::Clean => Mark::Done,
      Outcome::Finding => Mark::Finding,
      Outcome::HarnessDefect => Mark::Failed,
    }
  }
}

/// Print `message` after `mark`. Failures and findings go to stderr.
pub fn status(mark: Mark, message: impl Display) {
  match mark {
    Mark::Failed | Mark::Finding => eprintln!("{} {message}", mark.paint(Stream::Stderr)),
    _ => println!("{} {message}", mark.paint(Stream::Stdout)),
  }
}

/// An indented `label: value` line.
pub fn field(label: &str, value: impl Display) {
  println!("  {}: {value}", label.if_supports_color(Stream::Stdout, |l| l.dimmed()));
}

/// Dimmed when stdout supports it.
pub fn faint(text: &str) -> String {
  text.if_supports_color(Stream::Stdout, |t| t.dimmed()).to_string()
}

/// First 12 characters of a hex digest.
pub fn short_hash(hash: &str) -> &str {
  hash.get(..12).unwrap_or(hash)
}

pub fn human_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  if unit == 0 {
    format!("{bytes} B")
  } else {
    format!("{value:.1} {}", UNITS[unit])
  }
}

/// Milliseconds under a second, tenths of a second under a minute, then minutes.
pub fn elapsed(duration: Duration) -> String {
  let millis = duration.as_millis();
  match millis {
    0..1_000 => format!("{millis}ms"),
    1_000..60_000 => format!("{:.1}s", duration.as_secs_f64()),
    _ => {
      let secs = duration.as_secs();
      format!("{}m{:02}s", secs / 60, secs % 60)
    }
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
  println!("{json}");
  Ok(())
}
