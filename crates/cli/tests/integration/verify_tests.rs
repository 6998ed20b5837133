//! Verify command integration tests.

use predicates::prelude::*;

use super::common::{INSTALLER, TestEnv};

fn built() -> TestEnv {
  let mut server = mockito::Server::new();
  let env = TestEnv::new();
  env.write_config(&format!("{}/rustup-init", server.url()), INSTALLER, "");
  env.build(&mut server).success();
  env
}

#[test]
fn fresh_image_verifies() {
  let env = built();

  env
    .fuzzpack_cmd()
    .arg("verify")
    .assert()
    .success()
    .stdout(predicate::str::contains("is intact"));
}

#[test]
fn extra_file_in_rootfs_fails_verification() {
  let env = built();
  std::fs::write(env.image_dir().join("rootfs/README"), "hello").unwrap();

  env
    .fuzzpack_cmd()
    .arg("verify")
    .assert()
    .failure()
    .stderr(predicate::str::contains("unexpected entry in rootfs: /README"));
}

#[test]
fn modified_binary_fails_verification_as_json() {
  let env = built();
  std::fs::write(env.image_dir().join("rootfs/fuzz_packet_decode"), "#!/bin/sh\n").unwrap();

  let output = env
    .fuzzpack_cmd()
    .arg("verify")
    .arg("--json")
    .assert()
    .failure()
    .get_output()
    .stdout
    .clone();

  let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
  assert_eq!(json["valid"], false);
  assert!(json["error"].as_str().unwrap().contains("fuzz_packet_decode"));
}
