//! Build command integration tests.

use predicates::prelude::*;

use super::common::{INSTALLER, TestEnv, entries};

#[test]
fn build_writes_image_with_one_binary_per_target() {
  let mut server = mockito::Server::new();
  let env = TestEnv::new();
  env.write_config(&format!("{}/rustup-init", server.url()), INSTALLER, "");

  env
    .build(&mut server)
    .success()
    .stdout(predicate::str::contains("Image ilp-fuzz written"))
    .stdout(predicate::str::contains("/fuzz_packet_decode"))
    .stdout(predicate::str::contains("/fuzz_stream_assemble"));

  let image = env.image_dir();
  assert_eq!(entries(&image), vec!["image.json", "rootfs", "rootfs.tar.gz"]);
  assert_eq!(
    entries(&image.join("rootfs")),
    vec!["fuzz_packet_decode", "fuzz_stream_assemble"]
  );
  assert!(entries(&env.work_dir()).is_empty());
}

#[test]
fn build_then_smoke_passes() {
  let mut server = mockito::Server::new();
  let env = TestEnv::new();
  env.write_config(&format!("{}/rustup-init", server.url()), INSTALLER, "");

  env.build(&mut server).success();

  env
    .fuzzpack_cmd()
    .arg("smoke")
    .arg("--seed")
    .arg("42")
    .assert()
    .success()
    .stdout(predicate::str::contains("Clean: 4"));
}

#[test]
fn parallel_build_gives_identical_image() {
  let mut server = mockito::Server::new();
  let env = TestEnv::new();
  env.write_config(&format!("{}/rustup-init", server.url()), INSTALLER, "");
  env.build(&mut server).success();
  let sequential = std::fs::read_to_string(env.image_dir().join("image.json")).unwrap();

  let _mock = server.mock("GET", "/rustup-init").with_body(INSTALLER).create();
  env.fuzzpack_cmd().arg("build").arg("--parallel").assert().success();
  let parallel = std::fs::read_to_string(env.image_dir().join("image.json")).unwrap();

  assert_eq!(sequential, parallel);
}

#[test]
fn unreachable_installer_fails_before_compilation() {
  let env = TestEnv::new();
  env.write_config("http://127.0.0.1:1/rustup-init", INSTALLER, "");

  env
    .fuzzpack_cmd()
    .arg("build")
    .assert()
    .failure()
    .stdout(predicate::str::contains("skipped"))
    .stderr(predicate::str::contains("fetch failed"));

  assert!(!env.image_dir().exists());
  assert!(!env.path("crates/ilp-packet/fuzz/target").exists());
}

#[test]
fn tampered_installer_is_rejected() {
  let mut server = mockito::Server::new();
  let env = TestEnv::new();
  env.write_config(&format!("{}/rustup-init", server.url()), "#!/bin/sh\nexit 0\n", "");

  env
    .build(&mut server)
    .failure()
    .stderr(predicate::str::contains("hash mismatch"));
}

#[test]
fn missing_fuzz_directory_fails_loudly() {
  let mut server = mockito::Server::new();
  let env = TestEnv::new();
  env.write_config(&format!("{}/rustup-init", server.url()), INSTALLER, "");
  std::fs::remove_dir_all(env.path("crates/ilp-stream/fuzz")).unwrap();

  env
    .build(&mut server)
    .failure()
    .stderr(predicate::str::contains("ilp-stream"));

  assert!(!env.image_dir().exists());
}

#[test]
fn keep_env_reports_builder_location() {
  let mut server = mockito::Server::new();
  let env = TestEnv::new();
  env.write_config(&format!("{}/rustup-init", server.url()), INSTALLER, "");

  let _mock = server.mock("GET", "/rustup-init").with_body(INSTALLER).create();
  env
    .fuzzpack_cmd()
    .arg("build")
    .arg("--keep-env")
    .assert()
    .success()
    .stdout(predicate::str::contains("Builder environment kept at"));

  assert_eq!(entries(&env.work_dir()).len(), 1);
}
