// conductor/src/lifecycle/mod.rs

//! Lifecycle hooks: external commands run at fixed points of the pipeline
//! (`on_start`, `before_tests`, `after_tests`, `on_exit`).

pub mod registry;
pub mod runner;

pub use registry::HookRegistry;
pub use runner::{HookRunner, HookState};
