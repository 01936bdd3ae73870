// conductor/src/runner/mod.rs

//! Test runners: one per launcher, polymorphic over the launcher's protocol.
//!
//! Every runner implements [`TestRunner`]. Runners that can take over a client
//! logging in through the control channel also expose [`Attach`] through
//! [`TestRunner::as_attach`]; the orchestrator treats its absence as "not
//! interested" rather than an error.

pub mod browser;
pub mod dispatch;
pub mod process;
pub mod scheduler;
pub mod tap;

use crate::channel::ClientLogin;
use crate::config::Launcher;
use crate::error::ConductorResult;
use async_trait::async_trait;

pub use browser::BrowserTestRunner;
pub use dispatch::{RunnerFactories, RunnerFactory};
pub use process::ProcessTestRunner;
pub use scheduler::run_bounded;
pub use tap::TapProcessTestRunner;

#[async_trait]
pub trait TestRunner: Send + Sync {
  fn launcher(&self) -> &Launcher;

  /// Runs the launcher's environment, reporting results as they arrive.
  ///
  /// Resolves once. An `Err` means the run could not complete; failing tests
  /// are reported results, not errors.
  async fn start(&self) -> ConductorResult<()>;

  /// The late-attachment capability, for runners that have it.
  fn as_attach(&self) -> Option<&dyn Attach> {
    None
  }
}

/// Late binding of a freshly connected client to a runner waiting for it.
pub trait Attach: Send + Sync {
  /// Offered every login. Returns `true` if this runner took the client.
  fn try_attach(&self, login: &ClientLogin) -> bool;
}
