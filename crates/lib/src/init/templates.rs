//! Template content for `fuzzpack init`.

/// Template for `fuzzpack.toml`.
/// Contains `{name}` and `{components}` placeholders for substitution.
pub const CONFIG_TEMPLATE: &str = r#"# fuzzpack pipeline definition.
#
# `fuzzpack plan` shows the steps this file lowers to without running them.

[image]
name = "{name}"
base = "ubuntu:22.04"
# digest = "sha256:..."
output = "target/fuzz-image"

[source]
exclude = [".git", "target", ".fuzzpack"]

[system]
refresh = "apt-get update"
install = "apt-get install -y --no-install-recommends"
packages = ["cmake", "clang", "libssl-dev", "curl"]

[system.env]
DEBIAN_FRONTEND = "noninteractive"

[toolchain]
channel = "nightly"

[toolchain.installer]
url = "https://static.rust-lang.org/rustup/archive/1.28.2/x86_64-unknown-linux-gnu/rustup-init"
sha256 = "20a06e644b0d9bd2fbdbfd52d42540bdde820ea7df86e92e533c073da0cdd43c"

[toolchain.driver]
name = "cargo-fuzz"
probe = "cargo fuzz --version"

[harness]
components = [{components}]
build_command = "cargo fuzz build -O"
parallel = false

[packaging]
# "declared": one binary per [[bin]] in fuzz/Cargo.toml.
# "glob": every file in the release directory.
selection = "declared"

[execute]
# step_timeout = "45m"
"#;
