//! Test utilities for fuzzpack-lib.
//!
//! Compiling real harnesses needs a nightly toolchain and cargo-fuzz, so
//! tests use a stand-in driver script that behaves like `cargo fuzz build`
//! as far as the pipeline can observe: it reads the fuzz manifest and writes
//! one executable per `[[bin]]` (plus dep-info noise) under
//! `fuzz/target/<triple>/release`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Harness stand-in: reports a libFuzzer finding when its input contains
/// `CRASH`, otherwise exits cleanly.
pub const FAKE_HARNESS: &str = r#"#!/bin/sh
if grep -q CRASH "$1" 2>/dev/null; then
  echo "==1== ERROR: libFuzzer: deadly signal" >&2
  exit 77
fi
echo "Executed $1 in 0 ms" >&2
"#;

const FAKE_DRIVER: &str = r#"#!/bin/sh
set -e
triple=""
while [ $# -gt 0 ]; do
  case "$1" in
    --target) triple="$2"; shift 2 ;;
    *) shift ;;
  esac
done
[ -n "$triple" ] || { echo "error: --target is required" >&2; exit 2; }
[ -d fuzz ] || { echo "error: could not find fuzz directory" >&2; exit 1; }
out="fuzz/target/$triple/release"
mkdir -p "$out/build"
for name in $(awk '/^\[\[bin\]\]/{b=1; next} /^\[/{b=0} b && /^name *=/{gsub(/.*= *"|".*/, ""); print}' fuzz/Cargo.toml); do
  cat > "$out/$name" <<'HARNESS'
__HARNESS__HARNESS
  chmod +x "$out/$name"
  echo "$out/$name: src/lib.rs" > "$out/$name.d"
done
"#;

/// Write `content` to `path` with mode 0755.
pub fn write_executable(path: &Path, content: &str) {
  fs::write(path, content).unwrap();
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
  }
}

/// Install the stand-in driver into `dir` and return its path.
pub fn fake_driver(dir: &Path) -> PathBuf {
  let path = dir.join("fake-cargo-fuzz");
  write_executable(&path, &FAKE_DRIVER.replace("__HARNESS__", FAKE_HARNESS));
  path
}

/// Minimal isolated variables for running commands in tests.
pub fn test_vars(home: &Path) -> BTreeMap<String, String> {
  let mut vars = BTreeMap::new();
  vars.insert("PATH".to_string(), "/usr/local/bin:/usr/bin:/bin".to_string());
  vars.insert("HOME".to_string(), home.to_string_lossy().to_string());
  vars.insert("LC_ALL".to_string(), "C".to_string());
  vars
}

/// Lay out a project with one fuzz target per component.
pub fn write_project(root: &Path, components: &[(&str, &str)]) {
  fs::write(root.join("Cargo.toml"), "[workspace]\nmembers = []\n").unwrap();
  for (component, target) in components {
    let dir = root.join("crates").join(component);
    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(dir.join("src/lib.rs"), "").unwrap();
    crate::target::tests::write_fuzz_manifest(&dir, &[*target]);
    fs::create_dir_all(dir.join("fuzz/fuzz_targets")).unwrap();
    fs::write(
      dir.join(format!("fuzz/fuzz_targets/{target}.rs")),
      "#![no_main]\nlibfuzzer_sys::fuzz_target!(|data: &[u8]| { let _ = data; });\n",
    )
    .unwrap();
  }
}
