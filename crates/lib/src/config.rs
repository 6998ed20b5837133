//! Pipeline configuration (`fuzzpack.toml`).
//!
//! The configuration is the human-edited description of the pipeline. It is
//! lowered into a [`PipelineDef`](crate::pipeline::PipelineDef), the hashable
//! step list that is actually executed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::platform::TargetTriple;
use crate::util::hash::is_sha256_hex;

/// Errors that can occur while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {}", .0.display())]
  NotFound(PathBuf),

  #[error("failed to read {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("failed to parse {}: {source}", path.display())]
  Parse { path: PathBuf, source: toml::de::Error },

  #[error("invalid config: {0}")]
  Invalid(String),
}

/// Root of `fuzzpack.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
  pub image: ImageConfig,
  #[serde(default)]
  pub source: SourceConfig,
  #[serde(default)]
  pub system: SystemConfig,
  pub toolchain: ToolchainConfig,
  pub harness: HarnessConfig,
  #[serde(default)]
  pub packaging: PackagingConfig,
  #[serde(default)]
  pub execute: ExecuteSettings,
}

/// `[image]`: identity of the final image and the base it is layered on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
  pub name: String,
  /// Base image reference both stages start from (e.g. `ubuntu:22.04`).
  pub base: String,
  /// Optional content digest pinning `base`.
  pub digest: Option<String>,
  /// Output directory, relative to the project root.
  #[serde(default = "default_output")]
  pub output: PathBuf,
}

/// `[source]`: how the project tree is copied into the builder environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourceConfig {
  /// File or directory names skipped at any depth.
  pub exclude: Vec<String>,
}

impl Default for SourceConfig {
  fn default() -> Self {
    Self {
      exclude: vec![".git".to_string(), "target".to_string(), ".fuzzpack".to_string()],
    }
  }
}

/// `[system]`: native prerequisites and the base search path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SystemConfig {
  /// `PATH` inside the environment, after the toolchain's own `bin`.
  pub path: String,
  /// Command refreshing the package index (skipped when unset).
  pub refresh: Option<String>,
  /// Install command; the package list is appended.
  pub install: Option<String>,
  pub packages: Vec<String>,
  /// Extra variables for the provisioning commands.
  pub env: BTreeMap<String, String>,
}

impl Default for SystemConfig {
  fn default() -> Self {
    Self {
      path: DEFAULT_SYSTEM_PATH.to_string(),
      refresh: None,
      install: None,
      packages: Vec::new(),
      env: BTreeMap::new(),
    }
  }
}

/// `[toolchain]`: pinned bootstrap of the Rust toolchain and the fuzz driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
  /// Release channel, `nightly` or a dated `nightly-YYYY-MM-DD`.
  #[serde(default = "default_channel")]
  pub channel: String,
  pub installer: InstallerConfig,
  #[serde(default)]
  pub driver: DriverConfig,
}

/// `[toolchain.installer]`: the rustup installer artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallerConfig {
  pub url: String,
  pub sha256: String,
  #[serde(default = "default_installer_args")]
  pub args: Vec<String>,
  pub signature: Option<SignatureConfig>,
}

/// Detached Ed25519 signature over the installer bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureConfig {
  /// Hex-encoded 32-byte Ed25519 public key.
  pub public_key: String,
  /// Where to fetch the 64-byte signature from.
  pub url: Option<String>,
  /// Inline hex-encoded signature, used instead of `url`.
  pub value: Option<String>,
}

/// `[toolchain.driver]`: the coverage-guided fuzzing driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DriverConfig {
  pub name: String,
  pub version: Option<String>,
  /// Command that must succeed once provisioning is complete.
  pub probe: String,
}

impl Default for DriverConfig {
  fn default() -> Self {
    Self {
      name: "cargo-fuzz".to_string(),
      version: None,
      probe: "cargo fuzz --version".to_string(),
    }
  }
}

/// `[harness]`: which components are compiled and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
  /// Directory names under `crates/` that carry a `fuzz/` declaration.
  pub components: Vec<String>,
  /// Defaults to the host triple.
  pub target_triple: Option<TargetTriple>,
  /// Driver build command, run from the component directory. `--target
  /// <triple>` is appended.
  #[serde(default = "default_build_command")]
  pub build_command: String,
  /// Compile independent components concurrently.
  #[serde(default)]
  pub parallel: bool,
}

/// How the packager picks files out of a component's release directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
  /// Exactly one file per declared target; other matches are skipped.
  #[default]
  Declared,
  /// Every regular file matching the pattern is copied; zero matches fail.
  Glob,
}

/// `[packaging]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PackagingConfig {
  pub selection: SelectionPolicy,
}

/// `[execute]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExecuteSettings {
  /// Upper bound for any single step, in humantime syntax (`"45m"`).
  /// Unset means steps may run indefinitely.
  pub step_timeout: Option<String>,
}

impl ExecuteSettings {
  pub fn step_timeout(&self) -> Result<Option<Duration>, ConfigError> {
    self
      .step_timeout
      .as_deref()
      .map(|s| humantime::parse_duration(s).map_err(|e| ConfigError::Invalid(format!("execute.step_timeout: {e}"))))
      .transpose()
  }
}

pub const DEFAULT_SYSTEM_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

fn default_output() -> PathBuf {
  PathBuf::from("target/fuzz-image")
}

fn default_channel() -> String {
  "nightly".to_string()
}

fn default_installer_args() -> Vec<String> {
  ["-y", "--no-modify-path", "--profile", "minimal", "--default-toolchain", "none"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_build_command() -> String {
  "cargo fuzz build -O".to_string()
}

impl PipelineConfig {
  /// Parse a configuration from TOML text.
  pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Read, parse and validate a configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config = Self::from_toml(&content, path)?;
    config.validate()?;
    debug!(path = %path.display(), components = config.harness.components.len(), "loaded config");
    Ok(config)
  }

  /// Check invariants serde cannot express.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.image.name.trim().is_empty() {
      return Err(ConfigError::Invalid("image.name must not be empty".to_string()));
    }
    if self.image.base.trim().is_empty() {
      return Err(ConfigError::Invalid("image.base must not be empty".to_string()));
    }

    if self.harness.components.is_empty() {
      return Err(ConfigError::Invalid("harness.components must list at least one component".to_string()));
    }
    let mut seen = std::collections::BTreeSet::new();
    for component in &self.harness.components {
      if !is_safe_component_name(component) {
        return Err(ConfigError::Invalid(format!("invalid component name: {component:?}")));
      }
      if !seen.insert(component) {
        return Err(ConfigError::Invalid(format!("component listed twice: {component}")));
      }
    }

    if let Some(triple) = &self.harness.target_triple
      && !triple.is_well_formed()
    {
      return Err(ConfigError::Invalid(format!("malformed target triple: {triple}")));
    }

    if !is_valid_channel(&self.toolchain.channel) {
      return Err(ConfigError::Invalid(format!(
        "toolchain.channel must be nightly or nightly-YYYY-MM-DD, got {:?}",
        self.toolchain.channel
      )));
    }

    let installer = &self.toolchain.installer;
    check_bootstrap_url("toolchain.installer.url", &installer.url)?;
    if !is_sha256_hex(&installer.sha256) {
      return Err(ConfigError::Invalid(
        "toolchain.installer.sha256 must be a 64-character hex digest".to_string(),
      ));
    }
    if let Some(signature) = &installer.signature {
      if !(signature.public_key.len() == 64 && signature.public_key.chars().all(|c| c.is_ascii_hexdigit())) {
        return Err(ConfigError::Invalid(
          "toolchain.installer.signature.public_key must be 32 hex-encoded bytes".to_string(),
        ));
      }
      if let Some(url) = &signature.url {
        check_bootstrap_url("toolchain.installer.signature.url", url)?;
      }
      if signature.url.is_none() == signature.value.is_none() {
        return Err(ConfigError::Invalid(
          "toolchain.installer.signature needs exactly one of url or value".to_string(),
        ));
      }
    }

    if self.harness.build_command.trim().is_empty() {
      return Err(ConfigError::Invalid("harness.build_command must not be empty".to_string()));
    }

    self.execute.step_timeout()?;

    Ok(())
  }

  /// The triple harnesses are compiled for.
  pub fn target_triple(&self) -> Result<TargetTriple, ConfigError> {
    match &self.harness.target_triple {
      Some(triple) => Ok(triple.clone()),
      None => TargetTriple::host()
        .ok_or_else(|| ConfigError::Invalid("unsupported host platform; set harness.target_triple".to_string())),
    }
  }
}

/// A loaded configuration together with the project it describes.
#[derive(Debug, Clone)]
pub struct Project {
  /// Directory containing the config file; the source tree copied into the
  /// builder environment.
  pub root: PathBuf,
  pub config_path: PathBuf,
  pub config: PipelineConfig,
}

impl Project {
  pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
    let config = PipelineConfig::load(config_path)?;
    let config_path = dunce::canonicalize(config_path).map_err(|source| ConfigError::Read {
      path: config_path.to_path_buf(),
      source,
    })?;
    let root = config_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    Ok(Self {
      root,
      config_path,
      config,
    })
  }

  /// Absolute path of the image output directory.
  pub fn output_dir(&self) -> PathBuf {
    if self.config.image.output.is_absolute() {
      self.config.image.output.clone()
    } else {
      self.root.join(&self.config.image.output)
    }
  }
}

/// Bootstrap downloads go over HTTPS. Plain HTTP is only accepted for
/// loopback hosts.
fn check_bootstrap_url(field: &str, url: &str) -> Result<(), ConfigError> {
  let parsed =
    reqwest::Url::parse(url).map_err(|err| ConfigError::Invalid(format!("{field} is not a valid URL: {err}")))?;
  let loopback = parsed.host_str().is_some_and(|host| {
    host == "localhost"
      || host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<std::net::IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
  });
  match parsed.scheme() {
    "https" => Ok(()),
    "http" if loopback => Ok(()),
    scheme => Err(ConfigError::Invalid(format!("{field} must use https, got {scheme}://"))),
  }
}

fn is_safe_component_name(name: &str) -> bool {
  !name.is_empty()
    && name != "."
    && name != ".."
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn is_valid_channel(channel: &str) -> bool {
  match channel.strip_prefix("nightly") {
    Some("") => true,
    Some(rest) => {
      let Some(date) = rest.strip_prefix('-') else {
        return false;
      };
      let parts: Vec<&str> = date.split('-').collect();
      parts.len() == 3
        && [4, 2, 2]
          .iter()
          .zip(&parts)
          .all(|(len, part)| part.len() == *len && part.chars().all(|c| c.is_ascii_digit()))
    }
    None => false,
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) const MINIMAL: &str = r#"
[image]
name = "ilp-fuzz"
base = "ubuntu:22.04"

[toolchain.installer]
url = "https://static.rust-lang.org/rustup/archive/1.28.2/x86_64-unknown-linux-gnu/rustup-init"
sha256 = "20a06e644b0d9bd2fbdbfd52d42540bdde820ea7df86e92e533c073da0cdd43c"

[harness]
components = ["ilp-packet", "ilp-stream"]
target_triple = "x86_64-unknown-linux-gnu"
"#;

  pub(crate) fn minimal() -> PipelineConfig {
    let config = PipelineConfig::from_toml(MINIMAL, Path::new("fuzzpack.toml")).unwrap();
    config.validate().unwrap();
    config
  }

  #[test]
  fn minimal_config_gets_defaults() {
    let config = minimal();
    assert_eq!(config.toolchain.channel, "nightly");
    assert_eq!(config.toolchain.driver.name, "cargo-fuzz");
    assert_eq!(config.harness.build_command, "cargo fuzz build -O");
    assert!(!config.harness.parallel);
    assert_eq!(config.packaging.selection, SelectionPolicy::Declared);
    assert_eq!(config.image.output, PathBuf::from("target/fuzz-image"));
    assert_eq!(config.source.exclude, vec![".git", "target", ".fuzzpack"]);
    assert_eq!(config.execute.step_timeout().unwrap(), None);
  }

  #[test]
  fn unknown_fields_are_rejected() {
    let content = format!("{MINIMAL}\n[packaging]\nselection = \"declared\"\nfilter = true\n");
    let err = PipelineConfig::from_toml(&content, Path::new("fuzzpack.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn glob_selection_parses() {
    let content = format!("{MINIMAL}\n[packaging]\nselection = \"glob\"\n");
    let config = PipelineConfig::from_toml(&content, Path::new("fuzzpack.toml")).unwrap();
    assert_eq!(config.packaging.selection, SelectionPolicy::Glob);
  }

  #[test]
  fn rejects_empty_components() {
    let mut config = minimal();
    config.harness.components.clear();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
  }

  #[test]
  fn rejects_duplicate_components() {
    let mut config = minimal();
    config.harness.components.push("ilp-packet".to_string());
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("listed twice"));
  }

  #[test]
  fn rejects_component_path_traversal() {
    let mut config = minimal();
    config.harness.components = vec!["../outside".to_string()];
    assert!(config.validate().is_err());
  }

  #[test]
  fn rejects_short_installer_hash() {
    let mut config = minimal();
    config.toolchain.installer.sha256 = "abc123".to_string();
    assert!(config.validate().is_err());
  }

  #[test]
  fn rejects_plain_http_installer() {
    let mut config = minimal();
    config.toolchain.installer.url = "http://static.rust-lang.org/rustup-init".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("must use https"), "{err}");

    config.toolchain.installer.url = "ftp://static.rust-lang.org/rustup-init".to_string();
    assert!(config.validate().is_err());
  }

  #[test]
  fn plain_http_allowed_on_loopback() {
    let mut config = minimal();
    for url in [
      "http://127.0.0.1:8080/rustup-init",
      "http://localhost/rustup-init",
      "http://[::1]:9000/rustup-init",
    ] {
      config.toolchain.installer.url = url.to_string();
      assert!(config.validate().is_ok(), "{url}");
    }
  }

  #[test]
  fn rejects_plain_http_signature() {
    let mut config = minimal();
    config.toolchain.installer.signature = Some(SignatureConfig {
      public_key: "ab".repeat(32),
      url: Some("http://example.com/rustup-init.sig".to_string()),
      value: None,
    });
    assert!(config.validate().is_err());
  }

  #[test]
  fn rejects_stable_channel() {
    let mut config = minimal();
    config.toolchain.channel = "stable".to_string();
    assert!(config.validate().is_err());
  }

  #[test]
  fn accepts_dated_nightly() {
    let mut config = minimal();
    config.toolchain.channel = "nightly-2025-06-01".to_string();
    assert!(config.validate().is_ok());

    config.toolchain.channel = "nightly-2025-6-1".to_string();
    assert!(config.validate().is_err());
  }

  #[test]
  fn signature_requires_exactly_one_source() {
    let mut config = minimal();
    config.toolchain.installer.signature = Some(SignatureConfig {
      public_key: "ab".repeat(32),
      url: None,
      value: None,
    });
    assert!(config.validate().is_err());

    config.toolchain.installer.signature = Some(SignatureConfig {
      public_key: "ab".repeat(32),
      url: Some("https://example.com/rustup-init.sig".to_string()),
      value: None,
    });
    assert!(config.validate().is_ok());
  }

  #[test]
  fn step_timeout_uses_humantime() {
    let mut config = minimal();
    config.execute.step_timeout = Some("45m".to_string());
    assert_eq!(config.execute.step_timeout().unwrap(), Some(Duration::from_secs(45 * 60)));

    config.execute.step_timeout = Some("soon".to_string());
    assert!(config.validate().is_err());
  }

  #[test]
  fn explicit_triple_wins_over_host() {
    let config = minimal();
    assert_eq!(config.target_triple().unwrap().as_str(), "x86_64-unknown-linux-gnu");
  }

  #[test]
  fn load_reports_missing_file() {
    let err = PipelineConfig::load(Path::new("/nonexistent/fuzzpack.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
  }

  #[test]
  fn project_root_is_config_parent() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("fuzzpack.toml");
    fs::write(&path, MINIMAL).unwrap();

    let project = Project::load(&path).unwrap();
    assert_eq!(project.root, dunce::canonicalize(temp.path()).unwrap());
    assert_eq!(project.output_dir(), project.root.join("target/fuzz-image"));
  }
}
