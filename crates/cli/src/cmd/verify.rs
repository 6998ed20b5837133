//! Implementation of the `fuzzpack verify` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use serde_json::json;

use fuzzpack_lib::package::verify_image;

use crate::output::{Mark, field, human_size, print_json, short_hash, status};

/// Check that the image's rootfs holds exactly the artifacts its manifest lists.
///
/// A tampered or incomplete image is reported and exits non-zero; it is not
/// an error of the command itself.
pub fn cmd_verify(config: &Path, image: Option<&Path>, json: bool) -> Result<ExitCode> {
  let dir = super::image_dir(config, image)?;

  match verify_image(&dir) {
    Ok(manifest) => {
      if json {
        print_json(&json!({ "valid": true, "image": dir, "manifest": manifest }))?;
      } else {
        status(Mark::Done, format_args!("Image {} at {} is intact", manifest.name, dir.display()));
        field("Rootfs", short_hash(&manifest.rootfs_hash));
        for artifact in &manifest.artifacts {
          field(&artifact.path, human_size(artifact.size));
        }
      }
      Ok(ExitCode::SUCCESS)
    }
    Err(err) => {
      if json {
        print_json(&json!({ "valid": false, "image": dir, "error": err.to_string() }))?;
      } else {
        status(Mark::Failed, format_args!("Image at {} failed verification: {err}", dir.display()));
      }
      Ok(ExitCode::FAILURE)
    }
  }
}
