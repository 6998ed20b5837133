//! Placeholder parsing and substitution for deferred value resolution.
//!
//! Pipeline steps are declared before any environment exists, so they cannot
//! contain concrete paths. Placeholders stand in for values that are only known
//! once a run has created its environment.
//!
//! # Placeholder Formats
//!
//! - `$${action:N}` - output of step N within the same stage
//! - `$${path:KEY}` - a directory of the current environment (see [`EnvPath`])
//! - `$${triple}` - the target triple harnesses are compiled for
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `$PATH` work naturally without any escaping.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use fuzzpack_lib::placeholder::{parse, EnvPath, Placeholder, Segment};
//!
//! let segments = parse("$${action:2} -y --default-toolchain none").unwrap();
//! assert_eq!(segments[0], Segment::Placeholder(Placeholder::Action(2)));
//!
//! let segments = parse("$${path:cargo}/bin").unwrap();
//! assert_eq!(segments[0], Segment::Placeholder(Placeholder::Path(EnvPath::Cargo)));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A directory of a build or package environment addressable from step strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvPath {
  /// Root of the environment.
  Root,
  /// `HOME` inside the environment.
  Home,
  /// Copy of the project source tree.
  Src,
  /// `CARGO_HOME` (toolchain binaries live in `cargo/bin`).
  Cargo,
  /// `RUSTUP_HOME`.
  Rustup,
  /// Verified downloads.
  Downloads,
  /// Scratch space, exported as `TMPDIR`.
  Tmp,
  /// Root filesystem of the final image (package stage only).
  Rootfs,
}

impl EnvPath {
  pub fn as_str(&self) -> &'static str {
    match self {
      EnvPath::Root => "root",
      EnvPath::Home => "home",
      EnvPath::Src => "src",
      EnvPath::Cargo => "cargo",
      EnvPath::Rustup => "rustup",
      EnvPath::Downloads => "downloads",
      EnvPath::Tmp => "tmp",
      EnvPath::Rootfs => "rootfs",
    }
  }
}

impl fmt::Display for EnvPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EnvPath {
  type Err = PlaceholderError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "root" => Ok(EnvPath::Root),
      "home" => Ok(EnvPath::Home),
      "src" => Ok(EnvPath::Src),
      "cargo" => Ok(EnvPath::Cargo),
      "rustup" => Ok(EnvPath::Rustup),
      "downloads" => Ok(EnvPath::Downloads),
      "tmp" => Ok(EnvPath::Tmp),
      "rootfs" => Ok(EnvPath::Rootfs),
      other => Err(PlaceholderError::UnknownPath(other.to_string())),
    }
  }
}

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  /// `$${action:N}` - output of step N
  Action(usize),

  /// `$${path:KEY}` - environment directory
  Path(EnvPath),

  /// `$${triple}` - harness target triple
  Triple,
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder to be resolved
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("unknown environment path: {0}")]
  UnknownPath(String),

  #[error("invalid action index: {0}")]
  InvalidActionIndex(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("unresolved action: index {0}")]
  UnresolvedAction(usize),

  #[error("environment path '{0}' is not available in this stage")]
  UnresolvedPath(EnvPath),
}

/// Trait for resolving placeholder values during execution.
pub trait Resolver {
  /// Resolve a step output by index.
  fn resolve_action(&self, index: usize) -> Result<&str, PlaceholderError>;

  /// Resolve an environment directory.
  fn resolve_path(&self, key: EnvPath) -> Result<&str, PlaceholderError>;

  /// Resolve the harness target triple.
  fn resolve_triple(&self) -> Result<&str, PlaceholderError>;
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is malformed (unclosed, unknown type, etc.)
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();

        match chars.peek() {
          Some((_, '$')) => {
            chars.next();

            match chars.peek() {
              Some((_, '{')) => {
                // $$${ -> literal $${
                literal.push_str("$${");
                chars.next();
              }
              _ => literal.push_str("$$$"),
            }
          }
          Some((_, '{')) => {
            chars.next();

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut content = String::new();
            let mut found_close = false;

            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              content.push(c);
            }

            if !found_close {
              return Err(PlaceholderError::Unclosed(pos));
            }

            segments.push(Segment::Placeholder(parse_placeholder_content(&content)?));
          }
          _ => literal.push_str("$$"),
        }
      }
      // A lone $ is a shell variable and passes through.
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Parse the content inside a placeholder (everything between `$${` and `}`).
fn parse_placeholder_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  if content == "triple" {
    return Ok(Placeholder::Triple);
  }

  let (kind, rest) = content
    .split_once(':')
    .ok_or_else(|| PlaceholderError::Malformed(format!("missing colon in '{content}'")))?;

  match kind {
    "action" => {
      let index = rest
        .parse::<usize>()
        .map_err(|_| PlaceholderError::InvalidActionIndex(rest.to_string()))?;
      Ok(Placeholder::Action(index))
    }
    "path" => Ok(Placeholder::Path(rest.parse()?)),
    _ => Err(PlaceholderError::UnknownType(kind.to_string())),
  }
}

/// Returns the highest `$${action:N}` index referenced in `input`, if any.
///
/// Used at definition time to reject steps that reference themselves or later
/// steps, which could never resolve.
pub fn max_action_reference(input: &str) -> Result<Option<usize>, PlaceholderError> {
  Ok(
    parse(input)?
      .into_iter()
      .filter_map(|segment| match segment {
        Segment::Placeholder(Placeholder::Action(index)) => Some(index),
        _ => None,
      })
      .max(),
  )
}

/// Substitute all placeholders in a string using the provided resolver.
///
/// # Errors
///
/// Returns an error if parsing fails or if any placeholder cannot be resolved.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(p) => {
        let value = match p {
          Placeholder::Action(index) => resolver.resolve_action(*index)?,
          Placeholder::Path(key) => resolver.resolve_path(*key)?,
          Placeholder::Triple => resolver.resolve_triple()?,
        };
        result.push_str(value);
      }
    }
  }

  Ok(result)
}
