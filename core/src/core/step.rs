// conductor/src/core/step.rs

//! Definition of a single named stage within a pipeline.

/// A named stage. Every stage must have at least one handler when the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDef {
  pub name: String,
}

impl StageDef {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}
