//! Artifact packaging.
//!
//! The package stage copies compiled harnesses out of the builder's source
//! tree into a fresh rootfs, then [`write_image`] publishes the rootfs with
//! its manifest and a deterministic tarball:
//!
//! ```text
//! <out>/
//!   rootfs/<harness>...
//!   image.json
//!   rootfs.tar.gz
//! ```

mod archive;
mod manifest;
mod pattern;
mod verify;

pub use archive::write_rootfs_archive;
pub use manifest::{ImageManifest, MANIFEST_VERSION, ManifestArtifact};
pub use pattern::{ArtifactPattern, wildcard_match};
pub use verify::{VerifyError, load_manifest, verify_image};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::SelectionPolicy;
use crate::consts::{IMAGE_MANIFEST_FILENAME, ROOTFS_ARCHIVE_FILENAME, ROOTFS_DIRNAME};
use crate::platform::TargetTriple;
use crate::target::FuzzTarget;
use crate::util::hash::{DirHashError, hash_directory, hash_file, is_executable};

#[derive(Debug, Error)]
pub enum PackageError {
  #[error("invalid artifact pattern {0:?}: wildcards are only allowed in the file name")]
  InvalidPattern(String),

  #[error("no artifacts of {component} match {pattern}")]
  NoMatches { component: String, pattern: String },

  #[error("expected artifact {component}/{name} not found at {}", path.display())]
  ExpectedArtifactMissing {
    component: String,
    name: String,
    path: PathBuf,
  },

  #[error("expected artifact {component}/{name} at {} is not an executable file", path.display())]
  ExpectedArtifactNotExecutable {
    component: String,
    name: String,
    path: PathBuf,
  },

  #[error("artifact {name} is produced by both {first} and {second}")]
  DuplicateArtifact {
    name: String,
    first: String,
    second: String,
  },

  #[error("io error at {}: {source}", path.display())]
  Io { path: PathBuf, source: std::io::Error },

  #[error(transparent)]
  Hash(#[from] DirHashError),

  #[error("failed to serialize manifest: {0}")]
  Manifest(#[from] serde_json::Error),
}

/// A file placed at the rootfs root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
  pub name: String,
  pub component: String,
  pub source: PathBuf,
}

/// Copies artifacts into a rootfs, refusing duplicates across components.
#[derive(Debug)]
pub struct Packager {
  rootfs: PathBuf,
  artifacts: Vec<PackagedArtifact>,
}

impl Packager {
  pub fn new(rootfs: &Path) -> Self {
    Self {
      rootfs: rootfs.to_path_buf(),
      artifacts: Vec::new(),
    }
  }

  pub fn artifacts(&self) -> &[PackagedArtifact] {
    &self.artifacts
  }

  /// Copy one component's artifacts matching the resolved `pattern`.
  ///
  /// With [`SelectionPolicy::Declared`], `declared` lists the component's
  /// targets; each must match exactly one executable file. Returns the names
  /// copied, in order.
  pub fn copy_artifacts(
    &mut self,
    component: &str,
    pattern: &str,
    selection: SelectionPolicy,
    declared: &[FuzzTarget],
  ) -> Result<Vec<String>, PackageError> {
    let parsed = ArtifactPattern::parse(pattern)?;
    let candidates = list_matches(&parsed)?;

    let selected: Vec<(String, PathBuf)> = match selection {
      SelectionPolicy::Declared => {
        let mut selected = Vec::with_capacity(declared.len());
        for target in declared {
          let path = parsed.dir.join(&target.name);
          let matched = candidates.iter().any(|(name, _)| *name == target.name);
          if !matched {
            return Err(PackageError::ExpectedArtifactMissing {
              component: component.to_string(),
              name: target.name.clone(),
              path,
            });
          }
          if !is_executable(&path) {
            return Err(PackageError::ExpectedArtifactNotExecutable {
              component: component.to_string(),
              name: target.name.clone(),
              path,
            });
          }
          selected.push((target.name.clone(), path));
        }
        for (name, _) in &candidates {
          if !declared.iter().any(|t| t.name == *name) {
            debug!(component, name = %name, "skipping undeclared match");
          }
        }
        selected
      }
      SelectionPolicy::Glob => {
        if candidates.is_empty() {
          return Err(PackageError::NoMatches {
            component: component.to_string(),
            pattern: pattern.to_string(),
          });
        }
        candidates
      }
    };

    let mut copied = Vec::with_capacity(selected.len());
    for (name, source) in selected {
      if let Some(existing) = self.artifacts.iter().find(|a| a.name == name) {
        return Err(PackageError::DuplicateArtifact {
          name,
          first: existing.component.clone(),
          second: component.to_string(),
        });
      }

      let dest = self.rootfs.join(&name);
      fs::copy(&source, &dest).map_err(io_err(&dest))?;
      info!(component, name = %name, "packaged artifact");

      self.artifacts.push(PackagedArtifact {
        name: name.clone(),
        component: component.to_string(),
        source,
      });
      copied.push(name);
    }
    Ok(copied)
  }
}

/// Regular files in the pattern's directory whose names match, sorted.
/// A missing directory yields no matches.
fn list_matches(pattern: &ArtifactPattern) -> Result<Vec<(String, PathBuf)>, PackageError> {
  if !pattern.dir.is_dir() {
    return Ok(Vec::new());
  }

  let mut matches = Vec::new();
  for entry in fs::read_dir(&pattern.dir).map_err(io_err(&pattern.dir))? {
    let entry = entry.map_err(io_err(&pattern.dir))?;
    let Some(name) = entry.file_name().to_str().map(str::to_string) else {
      continue;
    };
    if !pattern.matches(&name) {
      continue;
    }
    if !entry.file_type().map_err(io_err(&pattern.dir))?.is_file() {
      debug!(name = %name, "skipping non-regular match");
      continue;
    }
    matches.push((name, entry.path()));
  }
  matches.sort();
  Ok(matches)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PackageError {
  let path = path.to_path_buf();
  move |source| PackageError::Io { path, source }
}

/// Identity recorded in the image manifest.
#[derive(Debug, Clone)]
pub struct ImageInfo {
  pub name: String,
  pub base: String,
  pub pipeline_hash: String,
  pub target_triple: TargetTriple,
}

/// Publish a packaged rootfs into `out_dir`.
///
/// Replaces any previous `rootfs/`, manifest and archive in `out_dir`; other
/// files there are left alone.
pub fn write_image(
  rootfs: &Path,
  artifacts: &[PackagedArtifact],
  out_dir: &Path,
  info: &ImageInfo,
) -> Result<ImageManifest, PackageError> {
  fs::create_dir_all(out_dir).map_err(io_err(out_dir))?;
  let out_rootfs = out_dir.join(ROOTFS_DIRNAME);
  let manifest_path = out_dir.join(IMAGE_MANIFEST_FILENAME);
  let archive_path = out_dir.join(ROOTFS_ARCHIVE_FILENAME);

  if out_rootfs.exists() {
    fs::remove_dir_all(&out_rootfs).map_err(io_err(&out_rootfs))?;
  }
  for stale in [&manifest_path, &archive_path] {
    if stale.exists() {
      fs::remove_file(stale).map_err(io_err(stale))?;
    }
  }
  fs::create_dir_all(&out_rootfs).map_err(io_err(&out_rootfs))?;

  let mut entries = Vec::with_capacity(artifacts.len());
  for artifact in artifacts {
    let from = rootfs.join(&artifact.name);
    let to = out_rootfs.join(&artifact.name);
    fs::copy(&from, &to).map_err(io_err(&to))?;
    let size = fs::metadata(&to).map_err(io_err(&to))?.len();
    entries.push(ManifestArtifact {
      name: artifact.name.clone(),
      component: artifact.component.clone(),
      path: format!("/{}", artifact.name),
      sha256: hash_file(&to)?.0,
      size,
      executable: is_executable(&to),
    });
  }
  entries.sort_by(|a, b| a.name.cmp(&b.name));

  let manifest = ImageManifest {
    version: MANIFEST_VERSION,
    name: info.name.clone(),
    base: info.base.clone(),
    pipeline_hash: info.pipeline_hash.clone(),
    target_triple: info.target_triple.clone(),
    artifacts: entries,
    rootfs_hash: hash_directory(&out_rootfs, &[])?.0,
  };

  write_rootfs_archive(&out_rootfs, &archive_path)?;
  manifest.write(&manifest_path)?;

  info!(
    image = %out_dir.display(),
    artifacts = manifest.artifacts.len(),
    rootfs_hash = %manifest.rootfs_hash,
    "image written"
  );
  Ok(manifest)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{FAKE_HARNESS, write_executable};
  use tempfile::TempDir;

  const TRIPLE: &str = "x86_64-unknown-linux-gnu";

  fn target(component: &str, name: &str) -> FuzzTarget {
    FuzzTarget {
      component: component.to_string(),
      name: name.to_string(),
      source: PathBuf::from(format!("fuzz_targets/{name}.rs")),
    }
  }

  /// Fake driver output: the harness plus dep-info and a build directory.
  fn release_dir(src: &Path, component: &str, name: &str) -> PathBuf {
    let dir = src.join(format!("crates/{component}/fuzz/target/{TRIPLE}/release"));
    fs::create_dir_all(dir.join("build")).unwrap();
    write_executable(&dir.join(name), FAKE_HARNESS);
    fs::write(dir.join(format!("{name}.d")), "deps").unwrap();
    dir
  }

  fn pattern(src: &Path, component: &str) -> String {
    format!("{}/crates/{component}/fuzz/target/{TRIPLE}/release/*", src.display())
  }

  fn info() -> ImageInfo {
    ImageInfo {
      name: "ilp-fuzz".to_string(),
      base: "ubuntu:22.04".to_string(),
      pipeline_hash: "0123456789abcdef0123".to_string(),
      target_triple: TargetTriple(TRIPLE.to_string()),
    }
  }

  struct Packaged {
    _temp: TempDir,
    rootfs: PathBuf,
    out: PathBuf,
    manifest: ImageManifest,
  }

  fn package_both() -> Packaged {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    let rootfs = temp.path().join("rootfs");
    fs::create_dir_all(&rootfs).unwrap();
    release_dir(&src, "ilp-packet", "fuzz_packet_decode");
    release_dir(&src, "ilp-stream", "fuzz_stream_assemble");

    let mut packager = Packager::new(&rootfs);
    packager
      .copy_artifacts(
        "ilp-packet",
        &pattern(&src, "ilp-packet"),
        SelectionPolicy::Declared,
        &[target("ilp-packet", "fuzz_packet_decode")],
      )
      .unwrap();
    packager
      .copy_artifacts(
        "ilp-stream",
        &pattern(&src, "ilp-stream"),
        SelectionPolicy::Declared,
        &[target("ilp-stream", "fuzz_stream_assemble")],
      )
      .unwrap();

    let out = temp.path().join("out");
    let manifest = write_image(&rootfs, packager.artifacts(), &out, &info()).unwrap();
    Packaged {
      _temp: temp,
      rootfs,
      out,
      manifest,
    }
  }

  fn root_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
      .collect();
    names.sort();
    names
  }

  #[test]
  fn declared_policy_copies_exactly_the_targets() {
    let packaged = package_both();
    assert_eq!(
      root_entries(&packaged.rootfs),
      vec!["fuzz_packet_decode", "fuzz_stream_assemble"]
    );
    assert!(is_executable(&packaged.rootfs.join("fuzz_packet_decode")));
  }

  #[test]
  fn image_has_rootfs_manifest_and_archive() {
    let packaged = package_both();
    assert_eq!(root_entries(&packaged.out), vec!["image.json", "rootfs", "rootfs.tar.gz"]);
    assert_eq!(
      root_entries(&packaged.out.join("rootfs")),
      vec!["fuzz_packet_decode", "fuzz_stream_assemble"]
    );

    let names: Vec<&str> = packaged.manifest.artifacts.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(names, vec!["/fuzz_packet_decode", "/fuzz_stream_assemble"]);
    assert_eq!(packaged.manifest.artifacts[0].size, FAKE_HARNESS.len() as u64);
  }

  #[test]
  fn written_image_verifies() {
    let packaged = package_both();
    assert_eq!(verify_image(&packaged.out).unwrap(), packaged.manifest);
  }

  #[test]
  fn verify_rejects_extra_entry() {
    let packaged = package_both();
    fs::write(packaged.out.join("rootfs/README"), "hi").unwrap();
    assert!(matches!(
      verify_image(&packaged.out),
      Err(VerifyError::UnexpectedEntry(name)) if name == "README"
    ));
  }

  #[test]
  fn verify_rejects_modified_binary() {
    let packaged = package_both();
    write_executable(&packaged.out.join("rootfs/fuzz_packet_decode"), "#!/bin/sh\nexit 1\n");
    assert!(matches!(
      verify_image(&packaged.out),
      Err(VerifyError::HashMismatch { .. })
    ));
  }

  #[test]
  fn verify_rejects_missing_binary() {
    let packaged = package_both();
    fs::remove_file(packaged.out.join("rootfs/fuzz_stream_assemble")).unwrap();
    assert!(matches!(
      verify_image(&packaged.out),
      Err(VerifyError::MissingArtifact(name)) if name == "fuzz_stream_assemble"
    ));
  }

  #[cfg(unix)]
  #[test]
  fn verify_rejects_lost_exec_bit() {
    use std::os::unix::fs::PermissionsExt;
    let packaged = package_both();
    let path = packaged.out.join("rootfs/fuzz_packet_decode");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    assert!(matches!(verify_image(&packaged.out), Err(VerifyError::NotExecutable(_))));
  }

  #[test]
  fn verify_requires_manifest() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(verify_image(temp.path()), Err(VerifyError::ManifestMissing(_))));
  }

  #[test]
  fn rewriting_image_replaces_previous_output() {
    let packaged = package_both();
    let rootfs = packaged.rootfs.clone();
    fs::write(packaged.out.join("rootfs/stale"), "old").unwrap();
    fs::write(packaged.out.join("notes.txt"), "keep me").unwrap();

    let artifacts = vec![PackagedArtifact {
      name: "fuzz_packet_decode".to_string(),
      component: "ilp-packet".to_string(),
      source: rootfs.join("fuzz_packet_decode"),
    }];
    write_image(&rootfs, &artifacts, &packaged.out, &info()).unwrap();

    assert_eq!(root_entries(&packaged.out.join("rootfs")), vec!["fuzz_packet_decode"]);
    assert!(packaged.out.join("notes.txt").exists());
  }

  #[test]
  fn declared_target_missing_is_an_error() {
    let temp = TempDir::new().unwrap();
    release_dir(temp.path(), "ilp-packet", "fuzz_packet_decode");
    let mut packager = Packager::new(&temp.path().join("rootfs"));

    let err = packager
      .copy_artifacts(
        "ilp-packet",
        &pattern(temp.path(), "ilp-packet"),
        SelectionPolicy::Declared,
        &[target("ilp-packet", "fuzz_packet_encode")],
      )
      .unwrap_err();
    assert!(matches!(err, PackageError::ExpectedArtifactMissing { name, .. } if name == "fuzz_packet_encode"));
  }

  #[test]
  fn declared_target_excluded_by_pattern_is_missing() {
    let temp = TempDir::new().unwrap();
    release_dir(temp.path(), "ilp-packet", "fuzz_packet_decode");
    let mut packager = Packager::new(&temp.path().join("rootfs"));
    let narrow = format!("{}/crates/ilp-packet/fuzz/target/{TRIPLE}/release/*.d", temp.path().display());

    let err = packager
      .copy_artifacts(
        "ilp-packet",
        &narrow,
        SelectionPolicy::Declared,
        &[target("ilp-packet", "fuzz_packet_decode")],
      )
      .unwrap_err();
    assert!(matches!(err, PackageError::ExpectedArtifactMissing { .. }));
  }

  #[test]
  fn glob_policy_copies_every_regular_match() {
    let temp = TempDir::new().unwrap();
    release_dir(temp.path(), "ilp-packet", "fuzz_packet_decode");
    let rootfs = temp.path().join("rootfs");
    fs::create_dir_all(&rootfs).unwrap();
    let mut packager = Packager::new(&rootfs);

    let copied = packager
      .copy_artifacts("ilp-packet", &pattern(temp.path(), "ilp-packet"), SelectionPolicy::Glob, &[])
      .unwrap();
    assert_eq!(copied, vec!["fuzz_packet_decode", "fuzz_packet_decode.d"]);
  }

  fn glob_image(temp: &TempDir) -> PathBuf {
    release_dir(temp.path(), "ilp-packet", "fuzz_packet_decode");
    let rootfs = temp.path().join("rootfs");
    fs::create_dir_all(&rootfs).unwrap();
    let mut packager = Packager::new(&rootfs);
    packager
      .copy_artifacts("ilp-packet", &pattern(temp.path(), "ilp-packet"), SelectionPolicy::Glob, &[])
      .unwrap();

    let out = temp.path().join("image");
    write_image(&rootfs, packager.artifacts(), &out, &info()).unwrap();
    out
  }

  #[test]
  fn glob_image_verifies_with_dep_info_entries() {
    let temp = TempDir::new().unwrap();
    let out = glob_image(&temp);

    let manifest = verify_image(&out).unwrap();
    let modes: Vec<(&str, bool)> = manifest
      .artifacts
      .iter()
      .map(|a| (a.name.as_str(), a.executable))
      .collect();
    assert_eq!(modes, vec![("fuzz_packet_decode", true), ("fuzz_packet_decode.d", false)]);
  }

  #[cfg(unix)]
  #[test]
  fn verify_rejects_gained_exec_bit() {
    use std::os::unix::fs::PermissionsExt;
    let temp = TempDir::new().unwrap();
    let out = glob_image(&temp);
    fs::set_permissions(out.join("rootfs/fuzz_packet_decode.d"), fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(
      verify_image(&out),
      Err(VerifyError::BecameExecutable(name)) if name == "fuzz_packet_decode.d"
    ));
  }

  #[test]
  fn glob_policy_rejects_empty_match() {
    let temp = TempDir::new().unwrap();
    let mut packager = Packager::new(&temp.path().join("rootfs"));

    let err = packager
      .copy_artifacts("ilp-packet", &pattern(temp.path(), "ilp-packet"), SelectionPolicy::Glob, &[])
      .unwrap_err();
    assert!(matches!(err, PackageError::NoMatches { .. }));
  }

  #[test]
  fn duplicate_names_across_components_rejected() {
    let temp = TempDir::new().unwrap();
    release_dir(temp.path(), "ilp-packet", "fuzz_decode");
    release_dir(temp.path(), "ilp-stream", "fuzz_decode");
    let rootfs = temp.path().join("rootfs");
    fs::create_dir_all(&rootfs).unwrap();
    let mut packager = Packager::new(&rootfs);

    packager
      .copy_artifacts(
        "ilp-packet",
        &pattern(temp.path(), "ilp-packet"),
        SelectionPolicy::Declared,
        &[target("ilp-packet", "fuzz_decode")],
      )
      .unwrap();
    let err = packager
      .copy_artifacts(
        "ilp-stream",
        &pattern(temp.path(), "ilp-stream"),
        SelectionPolicy::Declared,
        &[target("ilp-stream", "fuzz_decode")],
      )
      .unwrap_err();

    assert!(matches!(
      err,
      PackageError::DuplicateArtifact { first, second, .. } if first == "ilp-packet" && second == "ilp-stream"
    ));
    assert_eq!(packager.artifacts().len(), 1);
  }
}
