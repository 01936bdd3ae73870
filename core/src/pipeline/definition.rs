// conductor/src/pipeline/definition.rs

//! The `Pipeline<TData, Err>` struct and its stage list.

use crate::core::context::Handler;
use crate::core::step::StageDef;
use crate::error::ConductorError;
use std::collections::HashMap;

/// An ordered list of named stages with `on` / `after` handlers.
///
/// `TData` is the run state shared by every handler through `ContextData<TData>`.
/// `Err` is the handlers' error type; it must be `From<ConductorError>` so that
/// engine-level failures (a stage without handlers) surface in the same type.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<ConductorError> + Send + Sync + 'static,
{
  /// Stages in execution order.
  pub(crate) stages: Vec<StageDef>,

  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<ConductorError> + Send + Sync + 'static,
{
  /// Creates a pipeline running `stage_names` in the given order.
  pub fn new(stage_names: &[&str]) -> Self {
    Self {
      stages: stage_names.iter().map(|name| StageDef::new(*name)).collect(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  /// Panics if `stage_name` is not defined. A typo in a stage name is a
  /// programming error, not a run-time failure.
  pub(crate) fn ensure_stage_exists(&self, stage_name: &str) {
    if !self.stages.iter().any(|s| s.name == stage_name) {
      panic!("Conductor setup error: Stage '{}' not found in pipeline definition.", stage_name);
    }
  }
}
