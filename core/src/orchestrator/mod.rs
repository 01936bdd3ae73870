// conductor/src/orchestrator/mod.rs

//! The top-level run: stages, hooks and the unconditional shutdown.
//!
//! An [`Orchestrator`] owns one run. [`Orchestrator::start`] drives the stage
//! pipeline, finishes the report whether or not the pipeline failed, stops
//! every hook runner and waits for their commands to die, then races the
//! channel stop against the termination deadline. Exactly one
//! [`ProcessExit::exit`] call happens per run.

pub mod shutdown;
pub mod stages;

use crate::channel::ControlChannel;
use crate::config::Configuration;
use crate::core::ContextData;
use crate::error::ConductorError;
use crate::lifecycle::HookRegistry;
use crate::reporter::{Reporter, Summary, TapReporter};
use crate::runner::RunnerFactories;
use stages::StageEnv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, instrument, Level};

pub use shutdown::{ExitGate, ExitSource, ProcessExit, StdProcessExit};
pub use stages::{RunState, STAGES};

pub const DEFAULT_TERMINATION_DEADLINE: Duration = Duration::from_millis(500);

/// What happened during one run.
#[derive(Debug)]
pub struct RunReport {
  /// Stages that completed, in order.
  pub completed_stages: Vec<String>,
  /// The error that stopped the pipeline, if any.
  pub error: Option<ConductorError>,
  pub summary: Summary,
  pub exit_code: i32,
  pub exit_source: Option<ExitSource>,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.exit_code == 0
  }
}

pub struct Orchestrator {
  config: Arc<dyn Configuration>,
  channel: Arc<dyn ControlChannel>,
  reporter: Arc<dyn Reporter>,
  factories: Arc<RunnerFactories>,
  exit: Arc<dyn ProcessExit>,
  hooks: Arc<HookRegistry>,
  termination_deadline: Duration,
}

impl Orchestrator {
  pub fn builder(config: Arc<dyn Configuration>, channel: Arc<dyn ControlChannel>) -> OrchestratorBuilder {
    OrchestratorBuilder {
      config,
      channel,
      reporter: None,
      factories: RunnerFactories::builtin(),
      exit: Arc::new(StdProcessExit),
      termination_deadline: DEFAULT_TERMINATION_DEADLINE,
    }
  }

  pub fn hooks(&self) -> &HookRegistry {
    &self.hooks
  }

  pub fn termination_deadline(&self) -> Duration {
    self.termination_deadline
  }

  /// Runs every stage, then wraps up. Returns once the exit gate has fired,
  /// which with [`StdProcessExit`] means never.
  #[instrument(name = "Orchestrator::start", skip_all, fields(deadline = ?self.termination_deadline))]
  pub async fn start(&self) -> RunReport {
    let ctx = ContextData::new(RunState::default());
    let pipeline = stages::build_pipeline(StageEnv {
      config: self.config.clone(),
      channel: self.channel.clone(),
      reporter: self.reporter.clone(),
      factories: self.factories.clone(),
      hooks: self.hooks.clone(),
    });

    // `Pipeline::run` already logs the error; it is only recorded here.
    let error = match pipeline.run(ctx.clone()).await {
      Ok(()) => {
        event!(Level::INFO, "Pipeline finished.");
        None
      }
      Err(e) => Some(e),
    };

    let summary = self.reporter.finish();
    self.hooks.stop_all().await;

    let exit_code = exit_code(error.is_none(), &summary);
    let gate = Arc::new(ExitGate::new(self.exit.clone(), exit_code));
    let exit_source = shutdown::terminate(self.channel.clone(), gate, self.termination_deadline).await;

    let completed_stages = ctx.read().completed.clone();
    RunReport {
      completed_stages,
      error,
      summary,
      exit_code,
      exit_source,
    }
  }
}

/// 0 when the pipeline ran through and no test failed, 1 otherwise.
pub fn exit_code(pipeline_ok: bool, summary: &Summary) -> i32 {
  if pipeline_ok && summary.is_success() {
    0
  } else {
    1
  }
}

pub struct OrchestratorBuilder {
  config: Arc<dyn Configuration>,
  channel: Arc<dyn ControlChannel>,
  reporter: Option<Arc<dyn Reporter>>,
  factories: RunnerFactories,
  exit: Arc<dyn ProcessExit>,
  termination_deadline: Duration,
}

impl OrchestratorBuilder {
  /// Defaults to a [`TapReporter`] on stdout.
  pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
    self.reporter = Some(reporter);
    self
  }

  pub fn factories(mut self, factories: RunnerFactories) -> Self {
    self.factories = factories;
    self
  }

  pub fn process_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
    self.exit = exit;
    self
  }

  pub fn termination_deadline(mut self, deadline: Duration) -> Self {
    self.termination_deadline = deadline;
    self
  }

  pub fn build(self) -> Orchestrator {
    Orchestrator {
      config: self.config,
      channel: self.channel,
      reporter: self.reporter.unwrap_or_else(|| Arc::new(TapReporter::stdout()) as Arc<dyn Reporter>),
      factories: Arc::new(self.factories),
      exit: self.exit,
      hooks: Arc::new(HookRegistry::new()),
      termination_deadline: self.termination_deadline,
    }
  }
}
