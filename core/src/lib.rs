// conductor/src/lib.rs

//! Conductor: the run-time orchestrator of a CI test harness.
//!
//! A run is an ordered pipeline of eight stages:
//!  - start the control channel and wait until it is ready,
//!  - the `on_start` and `before_tests` lifecycle hooks,
//!  - build one test runner per configured launcher and listen for clients
//!    logging in through the channel,
//!  - run the test runners with a bounded number executing at once,
//!  - the `after_tests` and `on_exit` hooks.
//!
//! Whatever happens in the pipeline, the report is finished, every hook is
//! stopped and the process exits exactly once: when the channel has stopped or
//! when the termination deadline elapses, whichever comes first.

pub mod channel;
pub mod command;
pub mod config;
pub mod core;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod pipeline;
pub mod reporter;
pub mod runner;

// --- Re-exports for the Public API ---

pub use crate::core::context::Handler;
pub use crate::core::context_data::ContextData;
pub use crate::core::step::StageDef;
pub use crate::pipeline::definition::Pipeline;

pub use crate::channel::{ChannelEvent, ClientLogin, ClientMessage, ClientTransport, ControlChannel, LoopbackChannel};
pub use crate::command::CommandLine;
pub use crate::config::{Configuration, HarnessConfig, HookSpec, Launcher, LauncherSpec};
pub use crate::error::{ConductorError, ConductorResult};
pub use crate::lifecycle::{HookRegistry, HookRunner, HookState};
pub use crate::orchestrator::{
  ExitGate, ExitSource, Orchestrator, OrchestratorBuilder, ProcessExit, RunReport, RunState, StdProcessExit,
};
pub use crate::reporter::{Reporter, Summary, TapReporter, TestResult, Verdict};
pub use crate::runner::{run_bounded, Attach, RunnerFactories, TestRunner};
