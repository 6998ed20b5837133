//! Artifact path patterns.
//!
//! A pattern is a concrete directory followed by a file-name wildcard in the
//! last component only (`.../release/*`). `*` matches any run of characters
//! and `?` exactly one.

use std::path::{Path, PathBuf};

use super::PackageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPattern {
  pub dir: PathBuf,
  pub name: String,
}

impl ArtifactPattern {
  pub fn parse(pattern: &str) -> Result<Self, PackageError> {
    let path = Path::new(pattern);
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| PackageError::InvalidPattern(pattern.to_string()))?
      .to_string();
    let dir = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .ok_or_else(|| PackageError::InvalidPattern(pattern.to_string()))?
      .to_path_buf();

    if dir.to_string_lossy().contains(['*', '?']) {
      return Err(PackageError::InvalidPattern(pattern.to_string()));
    }
    Ok(Self { dir, name })
  }

  pub fn matches(&self, file_name: &str) -> bool {
    wildcard_match(&self.name, file_name)
  }
}

/// Match `name` against a `*`/`?` wildcard.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
  let p: Vec<char> = pattern.chars().collect();
  let n: Vec<char> = name.chars().collect();

  let (mut pi, mut ni) = (0, 0);
  // Position of the last `*` and the name index it was tried at.
  let mut star: Option<(usize, usize)> = None;

  while ni < n.len() {
    if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
      pi += 1;
      ni += 1;
    } else if pi < p.len() && p[pi] == '*' {
      star = Some((pi, ni));
      pi += 1;
    } else if let Some((star_pi, star_ni)) = star {
      pi = star_pi + 1;
      ni = star_ni + 1;
      star = Some((star_pi, star_ni + 1));
    } else {
      return false;
    }
  }

  p[pi..].iter().all(|c| *c == '*')
}
