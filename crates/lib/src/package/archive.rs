//! Deterministic rootfs tarball.
//!
//! The archive depends only on the rootfs contents: entries are sorted,
//! timestamps are pinned to `SOURCE_DATE_EPOCH`, ownership is root and modes
//! are normalized to 0755/0644.

use std::fs;
use std::io;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};
use tracing::debug;
use walkdir::WalkDir;

use crate::consts::SOURCE_DATE_EPOCH;
use crate::util::hash::is_executable;

use super::PackageError;

pub fn write_rootfs_archive(rootfs: &Path, dest: &Path) -> Result<(), PackageError> {
  let io_err = |source: io::Error| PackageError::Io {
    path: dest.to_path_buf(),
    source,
  };

  let file = fs::File::create(dest).map_err(io_err)?;
  let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

  let mut entries = 0;
  for entry in WalkDir::new(rootfs).min_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|e| io_err(io::Error::other(e.to_string())))?;
    let rel = entry
      .path()
      .strip_prefix(rootfs)
      .map_err(|e| io_err(io::Error::other(e.to_string())))?;

    let mut header = Header::new_gnu();
    header.set_mtime(SOURCE_DATE_EPOCH);
    header.set_uid(0);
    header.set_gid(0);

    if entry.file_type().is_dir() {
      header.set_entry_type(EntryType::Directory);
      header.set_mode(0o755);
      header.set_size(0);
      builder.append_data(&mut header, rel, io::empty()).map_err(io_err)?;
    } else if entry.file_type().is_file() {
      let metadata = entry.metadata().map_err(|e| io_err(io::Error::other(e.to_string())))?;
      header.set_entry_type(EntryType::Regular);
      header.set_mode(if is_executable(entry.path()) { 0o755 } else { 0o644 });
      header.set_size(metadata.len());
      let data = fs::File::open(entry.path()).map_err(io_err)?;
      builder.append_data(&mut header, rel, data).map_err(io_err)?;
    } else {
      debug!(path = %entry.path().display(), "not archiving non-regular entry");
      continue;
    }
    entries += 1;
  }

  let encoder = builder.into_inner().map_err(io_err)?;
  encoder.finish().map_err(io_err)?;

  debug!(path = %dest.display(), entries, "wrote rootfs archive");
  Ok(())
}
