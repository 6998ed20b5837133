//! Placeholder resolver for stage execution.

use std::collections::BTreeMap;

use crate::placeholder::{EnvPath, PlaceholderError, Resolver};

/// Resolves placeholders while a stage runs.
///
/// Knows the outputs of the steps already executed in the stage, the
/// directories visible to the stage and the harness target triple.
pub struct StageResolver {
  /// Results of steps executed so far in this stage.
  action_results: Vec<String>,
  paths: BTreeMap<EnvPath, String>,
  triple: String,
}

impl StageResolver {
  pub fn new(paths: BTreeMap<EnvPath, String>, triple: &str) -> Self {
    Self {
      action_results: Vec::new(),
      paths,
      triple: triple.to_string(),
    }
  }

  /// Record a step result.
  pub fn push_action_result(&mut self, result: String) {
    self.action_results.push(result);
  }

  pub fn action_count(&self) -> usize {
    self.action_results.len()
  }
}

impl Resolver for StageResolver {
  fn resolve_action(&self, index: usize) -> Result<&str, PlaceholderError> {
    self
      .action_results
      .get(index)
      .map(|s| s.as_str())
      .ok_or(PlaceholderError::UnresolvedAction(index))
  }

  fn resolve_path(&self, key: EnvPath) -> Result<&str, PlaceholderError> {
    self
      .paths
      .get(&key)
      .map(|s| s.as_str())
      .ok_or(PlaceholderError::UnresolvedPath(key))
  }

  fn resolve_triple(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.triple)
  }
}
