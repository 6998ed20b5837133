//! CLI integration tests that run full pipelines.

mod build_tests;
mod common;
mod verify_tests;
