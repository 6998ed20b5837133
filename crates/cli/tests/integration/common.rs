//! Shared test helpers for CLI integration tests.
//!
//! A real build needs rustup, a nightly toolchain and cargo-fuzz. The test
//! installer served here stands in for `rustup-init`: it drops a no-op
//! `rustup` and a `cargo` into `$CARGO_HOME/bin` whose `fuzz build` writes
//! one small shell harness per declared `[[bin]]`.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

pub const COMPONENTS: &[(&str, &str)] = &[("ilp-packet", "fuzz_packet_decode"), ("ilp-stream", "fuzz_stream_assemble")];

pub const TRIPLE: &str = "x86_64-unknown-linux-gnu";

pub const INSTALLER: &str = r##"#!/bin/sh
set -e
mkdir -p "$CARGO_HOME/bin"
cat > "$CARGO_HOME/bin/rustup" <<'RUSTUP'
#!/bin/sh
exit 0
RUSTUP
cat > "$CARGO_HOME/bin/cargo" <<'CARGO'
#!/bin/sh
set -e
case "$1" in
  install) exit 0 ;;
  fuzz) shift ;;
  *) echo "unexpected cargo invocation: $*" >&2; exit 2 ;;
esac
if [ "$1" = "--version" ]; then
  echo "cargo-fuzz 0.12.0"
  exit 0
fi
triple=""
while [ $# -gt 0 ]; do
  case "$1" in
    --target) triple="$2"; shift 2 ;;
    *) shift ;;
  esac
done
[ -d fuzz ] || { echo "error: could not find fuzz directory" >&2; exit 1; }
out="fuzz/target/$triple/release"
mkdir -p "$out/deps"
for name in $(awk '/^\[\[bin\]\]/{b=1; next} /^\[/{b=0} b && /^name *=/{gsub(/.*= *"|".*/, ""); print}' fuzz/Cargo.toml); do
  printf '#!/bin/sh\necho "Executed $1 in 0 ms" >&2\n' > "$out/$name"
  chmod +x "$out/$name"
  echo "$out/$name: src/lib.rs" > "$out/$name.d"
done
CARGO
chmod +x "$CARGO_HOME/bin/rustup" "$CARGO_HOME/bin/cargo"
"##;

/// Isolated project, work and cache directories for one test.
pub struct TestEnv {
  pub temp: TempDir,
  pub project: PathBuf,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// A project with one fuzz target per entry of [`COMPONENTS`] and no config.
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    let project = dunce::canonicalize(&project).unwrap();

    std::fs::write(project.join("Cargo.toml"), "[workspace]\nmembers = []\n").unwrap();
    for (component, target) in COMPONENTS {
      let dir = project.join("crates").join(component);
      std::fs::create_dir_all(dir.join("src")).unwrap();
      std::fs::write(dir.join("src/lib.rs"), "").unwrap();
      std::fs::create_dir_all(dir.join("fuzz/fuzz_targets")).unwrap();
      std::fs::write(
        dir.join("fuzz/Cargo.toml"),
        format!(
          "[package]\nname = \"{component}-fuzz\"\nversion = \"0.0.0\"\n\n\
           [[bin]]\nname = \"{target}\"\npath = \"fuzz_targets/{target}.rs\"\n"
        ),
      )
      .unwrap();
      std::fs::write(
        dir.join(format!("fuzz/fuzz_targets/{target}.rs")),
        "#![no_main]\nlibfuzzer_sys::fuzz_target!(|data: &[u8]| { let _ = data; });\n",
      )
      .unwrap();
    }

    let config_path = project.join("fuzzpack.toml");
    Self {
      temp,
      project,
      config_path,
    }
  }

  /// Write a config whose installer is fetched from `installer_url`.
  pub fn write_config(&self, installer_url: &str, installer: &str, extra: &str) {
    let sha256 = hex::encode(Sha256::digest(installer.as_bytes()));
    let components = COMPONENTS
      .iter()
      .map(|(c, _)| format!("\"{c}\""))
      .collect::<Vec<_>>()
      .join(", ");
    let content = format!(
      "[image]\nname = \"ilp-fuzz\"\nbase = \"ubuntu:22.04\"\n\n\
       [toolchain.installer]\nurl = \"{installer_url}\"\nsha256 = \"{sha256}\"\n\n\
       [harness]\ncomponents = [{components}]\ntarget_triple = \"{TRIPLE}\"\n{extra}"
    );
    std::fs::write(&self.config_path, content).unwrap();
  }

  pub fn image_dir(&self) -> PathBuf {
    self.project.join("target/fuzz-image")
  }

  pub fn work_dir(&self) -> PathBuf {
    self.temp.path().join("work")
  }

  /// Get a Command for the fuzzpack binary running in the project directory.
  ///
  /// `FUZZPACK_WORK_DIR` and `FUZZPACK_CACHE_DIR` point into the test's
  /// temp directory.
  pub fn fuzzpack_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("fuzzpack");
    cmd.current_dir(&self.project);
    cmd.env("FUZZPACK_WORK_DIR", self.work_dir());
    cmd.env("FUZZPACK_CACHE_DIR", self.temp.path().join("cache"));
    cmd.env_remove("FUZZPACK_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// Run `fuzzpack build` against an installer served by `server`.
  pub fn build(&self, server: &mut mockito::ServerGuard) -> assert_cmd::assert::Assert {
    let _mock = server.mock("GET", "/rustup-init").with_body(INSTALLER).create();
    self.fuzzpack_cmd().arg("build").assert()
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.project.join(relative)
  }
}

/// Entries directly under `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = std::fs::read_dir(dir)
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
    .collect();
  names.sort();
  names
}
