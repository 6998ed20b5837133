//! fuzzpack-lib: Core types and logic for fuzzpack
//!
//! This crate provides the pipeline that turns a workspace with fuzz targets
//! into a distributable image of fuzz harness binaries:
//! - `PipelineConfig`: the `fuzzpack.toml` description of the pipeline
//! - `PipelineDef`: the lowered, hashable builder and package step lists
//! - `run_pipeline`: executes a definition in fresh environment directories
//! - `ImageManifest`: what the final image contains, with content hashes

pub mod config;
pub mod consts;
pub mod env;
pub mod execute;
pub mod harness;
pub mod init;
pub mod package;
pub mod pipeline;
pub mod placeholder;
pub mod plan;
pub mod platform;
pub mod provision;
pub mod render;
pub mod smoke;
pub mod target;
pub mod util;
