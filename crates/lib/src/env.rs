//! Fresh environment directories that stand in for container stages.
//!
//! A builder environment has the layout
//!
//! ```text
//! <root>/
//!   home/
//!   toolchain/cargo/     CARGO_HOME
//!   toolchain/rustup/    RUSTUP_HOME
//!   src/                 copy of the project tree
//!   downloads/           verified fetches
//!   tmp/
//! ```
//!
//! A package environment only has `rootfs/` (the image root) and `tmp/`.
//! Each run gets its own uniquely named directory under the work dir.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::consts::{APP_NAME, ROOTFS_DIRNAME, SOURCE_DATE_EPOCH};
use crate::pipeline::{StageKind, stage_has_path};
use crate::placeholder::EnvPath;
use crate::platform::TargetTriple;

/// Relative location of each directory inside an environment root.
fn relative(path: EnvPath) -> &'static str {
  match path {
    EnvPath::Root => "",
    EnvPath::Home => "home",
    EnvPath::Src => "src",
    EnvPath::Cargo => "toolchain/cargo",
    EnvPath::Rustup => "toolchain/rustup",
    EnvPath::Downloads => "downloads",
    EnvPath::Tmp => "tmp",
    EnvPath::Rootfs => ROOTFS_DIRNAME,
  }
}

const BUILDER_DIRS: &[EnvPath] = &[
  EnvPath::Home,
  EnvPath::Cargo,
  EnvPath::Rustup,
  EnvPath::Src,
  EnvPath::Downloads,
  EnvPath::Tmp,
];

const PACKAGE_DIRS: &[EnvPath] = &[EnvPath::Rootfs, EnvPath::Tmp];

/// An environment directory owned by a single run.
///
/// The directory is removed on drop unless [`Environment::keep`] was called.
#[derive(Debug)]
pub struct Environment {
  kind: StageKind,
  root: PathBuf,
  dir: Option<TempDir>,
}

impl Environment {
  /// Create a fresh environment under `parent`.
  pub fn create(kind: StageKind, parent: &Path) -> io::Result<Self> {
    fs::create_dir_all(parent)?;
    let dir = tempfile::Builder::new()
      .prefix(&format!("{APP_NAME}-{kind}-"))
      .tempdir_in(parent)?;
    let root = dunce::canonicalize(dir.path())?;

    let dirs = match kind {
      StageKind::Builder => BUILDER_DIRS,
      StageKind::Package => PACKAGE_DIRS,
    };
    for path in dirs {
      fs::create_dir_all(root.join(relative(*path)))?;
    }

    debug!(kind = %kind, root = %root.display(), "created environment");
    Ok(Self {
      kind,
      root,
      dir: Some(dir),
    })
  }

  pub fn kind(&self) -> StageKind {
    self.kind
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Absolute path of an environment directory, if this kind of environment has it.
  pub fn path(&self, key: EnvPath) -> Option<PathBuf> {
    let own = match self.kind {
      StageKind::Builder => key == EnvPath::Root || BUILDER_DIRS.contains(&key),
      StageKind::Package => key == EnvPath::Root || PACKAGE_DIRS.contains(&key),
    };
    match key {
      EnvPath::Root => Some(self.root.clone()),
      _ => own.then(|| self.root.join(relative(key))),
    }
  }

  /// Persist the directory past the end of the run and return its location.
  pub fn keep(mut self) -> PathBuf {
    if let Some(dir) = self.dir.take() {
      let _ = dir.keep();
    }
    info!(root = %self.root.display(), "keeping environment");
    self.root.clone()
  }

  /// Remove the directory now, reporting failures instead of ignoring them.
  pub fn discard(mut self) -> io::Result<()> {
    if let Some(dir) = self.dir.take() {
      dir.close()?;
      debug!(root = %self.root.display(), "discarded environment");
    }
    Ok(())
  }

  /// The variables every command in this environment starts from.
  ///
  /// Nothing is inherited from the calling process.
  pub fn command_vars(&self, system_path: &str, triple: &TargetTriple) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let mut put = |key: &str, value: &Path| {
      vars.insert(key.to_string(), value.to_string_lossy().to_string());
    };

    let tmp = self.root.join(relative(EnvPath::Tmp));
    put("TMPDIR", &tmp);
    put("TMP", &tmp);
    put("TEMP", &tmp);
    put("FUZZPACK_ENV", &self.root);

    let path = match self.path(EnvPath::Cargo) {
      Some(cargo) => {
        put("CARGO_HOME", &cargo);
        format!("{}:{}", cargo.join("bin").display(), system_path)
      }
      None => system_path.to_string(),
    };
    if let Some(rustup) = self.path(EnvPath::Rustup) {
      put("RUSTUP_HOME", &rustup);
    }
    let home = self.path(EnvPath::Home).unwrap_or_else(|| tmp.clone());
    put("HOME", &home);

    vars.insert("PATH".to_string(), path);
    vars.insert("LANG".to_string(), "C".to_string());
    vars.insert("LC_ALL".to_string(), "C".to_string());
    vars.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
    vars.insert("FUZZPACK_TARGET_TRIPLE".to_string(), triple.to_string());
    vars
  }
}

/// The directories a stage's placeholders resolve against.
///
/// The package stage reads the builder's `src`; everything else comes from
/// the stage's own environment.
pub fn stage_paths(stage: &Environment, builder: &Environment) -> BTreeMap<EnvPath, String> {
  let keys = [
    EnvPath::Root,
    EnvPath::Home,
    EnvPath::Src,
    EnvPath::Cargo,
    EnvPath::Rustup,
    EnvPath::Downloads,
    EnvPath::Tmp,
    EnvPath::Rootfs,
  ];

  keys
    .into_iter()
    .filter(|key| stage_has_path(stage.kind(), *key))
    .filter_map(|key| {
      let path = stage.path(key).or_else(|| builder.path(key))?;
      Some((key, path.to_string_lossy().to_string()))
    })
    .collect()
}
