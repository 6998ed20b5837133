//! CopySource step implementation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::execute::types::ExecuteError;

/// Copy the project tree at `source` into `dest`.
///
/// Any file or directory whose name is in `exclude` is skipped at every
/// depth. Permissions are preserved and symlinks are recreated rather than
/// followed. Returns the number of files copied.
pub async fn execute_copy_source(source: &Path, dest: &Path, exclude: &[String]) -> Result<usize, ExecuteError> {
  let source = source.to_path_buf();
  let dest = dest.to_path_buf();
  let exclude = exclude.to_vec();

  info!(source = %source.display(), dest = %dest.display(), "copying source tree");
  let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &dest, &exclude))
    .await
    .map_err(|e| ExecuteError::Task(e.to_string()))??;
  info!(files = copied, "source tree copied");
  Ok(copied)
}

fn copy_tree(source: &Path, dest: &Path, exclude: &[String]) -> Result<usize, ExecuteError> {
  let source = dunce::canonicalize(source)?;
  fs::create_dir_all(dest)?;
  let dest_canonical: PathBuf = dunce::canonicalize(dest)?;

  let walker = WalkDir::new(&source)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| {
      let excluded = e.depth() > 0
        && e
          .file_name()
          .to_str()
          .map(|name| exclude.iter().any(|x| x == name))
          .unwrap_or(false);
      // The destination may live inside the tree when the work dir does.
      !excluded && e.path() != dest_canonical
    });

  let mut copied = 0;
  for entry in walker {
    let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
    let rel = match entry.path().strip_prefix(&source) {
      Ok(rel) if !rel.as_os_str().is_empty() => rel,
      _ => continue,
    };
    let target = dest.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
      fs::set_permissions(&target, entry.metadata().map_err(|e| std::io::Error::other(e.to_string()))?.permissions())?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      copy_symlink(&link, &target)?;
    } else if file_type.is_file() {
      // fs::copy carries the permission bits over.
      fs::copy(entry.path(), &target)?;
      copied += 1;
    } else {
      debug!(path = %entry.path().display(), "skipping special file");
    }
  }

  Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
  debug!(link = %link.display(), target = %target.display(), "symlinks are not recreated on this platform");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("crates/ilp-packet/src")).unwrap();
    fs::create_dir_all(root.join("crates/ilp-packet/fuzz/target/debug")).unwrap();
    fs::create_dir_all(root.join(".git/objects")).unwrap();
    fs::write(root.join("Cargo.toml"), "[workspace]\n").unwrap();
    fs::write(root.join("crates/ilp-packet/src/lib.rs"), "pub fn decode() {}\n").unwrap();
    fs::write(root.join("crates/ilp-packet/fuzz/target/debug/junk"), "x").unwrap();
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
    temp
  }

  fn excludes() -> Vec<String> {
    vec![".git".to_string(), "target".to_string()]
  }

  #[tokio::test]
  async fn copies_tree_with_excludes() {
    let src = project();
    let dest = TempDir::new().unwrap();

    let copied = execute_copy_source(src.path(), dest.path(), &excludes()).await.unwrap();

    assert_eq!(copied, 2);
    assert!(dest.path().join("Cargo.toml").is_file());
    assert!(dest.path().join("crates/ilp-packet/src/lib.rs").is_file());
    assert!(dest.path().join("crates/ilp-packet/fuzz").is_dir());
    assert!(!dest.path().join("crates/ilp-packet/fuzz/target").exists());
    assert!(!dest.path().join(".git").exists());
  }

  #[tokio::test]
  async fn original_tree_untouched() {
    let src = project();
    let dest = TempDir::new().unwrap();
    let before = crate::util::hash::hash_directory(src.path(), &[]).unwrap();

    execute_copy_source(src.path(), dest.path(), &excludes()).await.unwrap();

    assert_eq!(crate::util::hash::hash_directory(src.path(), &[]).unwrap(), before);
  }

  #[tokio::test]
  async fn destination_inside_source_is_skipped() {
    let src = project();
    let dest = src.path().join("work/env/src");

    execute_copy_source(src.path(), &dest, &excludes()).await.unwrap();

    assert!(dest.join("Cargo.toml").is_file());
    assert!(!dest.join("work/env/src").exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn preserves_exec_bit_and_symlinks() {
    use std::os::unix::fs::PermissionsExt;

    let src = project();
    let script = src.path().join("run.sh");
    fs::write(&script, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    std::os::unix::fs::symlink("run.sh", src.path().join("run")).unwrap();
    let dest = TempDir::new().unwrap();

    execute_copy_source(src.path(), dest.path(), &excludes()).await.unwrap();

    assert!(crate::util::hash::is_executable(&dest.path().join("run.sh")));
    assert_eq!(fs::read_link(dest.path().join("run")).unwrap(), PathBuf::from("run.sh"));
  }
}
