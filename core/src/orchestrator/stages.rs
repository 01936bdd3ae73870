// conductor/src/orchestrator/stages.rs

//! The eight stages of a run, wired onto the pipeline engine.

use crate::channel::{ChannelEvent, ClientLogin, ControlChannel};
use crate::config::Configuration;
use crate::core::ContextData;
use crate::error::{ConductorError, ConductorResult};
use crate::lifecycle::{HookRegistry, HookRunner};
use crate::pipeline::definition::Pipeline;
use crate::reporter::Reporter;
use crate::runner::{run_bounded, RunnerFactories, TestRunner};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tracing::{event, instrument, Level};

pub const START_CHANNEL: &str = "start_channel";
pub const ON_START: &str = "on_start";
pub const BEFORE_TESTS: &str = "before_tests";
pub const CREATE_RUNNERS: &str = "create_runners";
pub const SUBSCRIBE_CLIENTS: &str = "subscribe_clients";
pub const RUN_TESTS: &str = "run_tests";
pub const AFTER_TESTS: &str = "after_tests";
pub const ON_EXIT: &str = "on_exit";

/// Stage names in execution order.
pub const STAGES: [&str; 8] = [
  START_CHANNEL,
  ON_START,
  BEFORE_TESTS,
  CREATE_RUNNERS,
  SUBSCRIBE_CLIENTS,
  RUN_TESTS,
  AFTER_TESTS,
  ON_EXIT,
];

/// State threaded through the stages of one run.
#[derive(Default)]
pub struct RunState {
  /// Set by `create_runners`, one per launcher in launcher order.
  pub runners: Vec<Arc<dyn TestRunner>>,
  /// Stages whose handlers all succeeded, in order.
  pub completed: Vec<String>,
}

/// Everything the stage handlers need, cloned into each handler.
#[derive(Clone)]
pub(crate) struct StageEnv {
  pub config: Arc<dyn Configuration>,
  pub channel: Arc<dyn ControlChannel>,
  pub reporter: Arc<dyn Reporter>,
  pub factories: Arc<RunnerFactories>,
  pub hooks: Arc<HookRegistry>,
}

pub(crate) fn build_pipeline(env: StageEnv) -> Pipeline<RunState, ConductorError> {
  let mut pipeline = Pipeline::new(&STAGES);

  let e = env.clone();
  pipeline.on_root(START_CHANNEL, move |_ctx| {
    let env = e.clone();
    async move { env.start_channel().await }
  });

  for hook in [ON_START, BEFORE_TESTS, AFTER_TESTS, ON_EXIT] {
    let e = env.clone();
    pipeline.on_root(hook, move |_ctx| {
      let env = e.clone();
      async move { env.run_hook(hook).await }
    });
  }

  let e = env.clone();
  pipeline.on_root(CREATE_RUNNERS, move |ctx| {
    let env = e.clone();
    async move { env.create_runners(ctx).await }
  });

  let e = env.clone();
  pipeline.on_root(SUBSCRIBE_CLIENTS, move |ctx: ContextData<RunState>| {
    let env = e.clone();
    async move {
      env.subscribe_clients(&ctx);
      Ok::<_, ConductorError>(())
    }
  });

  let e = env;
  pipeline.on_root(RUN_TESTS, move |ctx: ContextData<RunState>| {
    let env = e.clone();
    async move {
      let runners = ctx.read().runners.clone();
      run_bounded(&runners, env.config.parallel()).await
    }
  });

  for stage in STAGES {
    pipeline.after_root(stage, move |ctx: ContextData<RunState>| async move {
      ctx.write().completed.push(stage.to_string());
      event!(Level::INFO, stage, "Stage completed.");
      Ok::<_, ConductorError>(())
    });
  }

  pipeline
}

impl StageEnv {
  /// Starts the channel and waits for it to announce readiness.
  #[instrument(name = "stage::start_channel", skip_all)]
  async fn start_channel(&self) -> ConductorResult<()> {
    // Subscribe before starting so a synchronous Ready is not missed.
    let mut events = self.channel.subscribe();
    self
      .channel
      .start()
      .await
      .map_err(|source| ConductorError::ChannelStart { source })?;

    let ready = async move {
      loop {
        match events.recv().await {
          Ok(ChannelEvent::Ready) => return Ok(()),
          Ok(ChannelEvent::ClientConnected(login)) => {
            event!(Level::DEBUG, identity = %login.identity, "Login before any runner exists, ignoring.")
          }
          Err(RecvError::Lagged(skipped)) => event!(Level::WARN, skipped, "Channel event bus lagged."),
          Err(RecvError::Closed) => return Err(ConductorError::ChannelClosed),
        }
      }
    };

    match self.config.channel_ready_timeout() {
      Some(timeout) => tokio::time::timeout(timeout, ready)
        .await
        .map_err(|_| ConductorError::ChannelReadyTimeout { timeout })?,
      None => ready.await,
    }?;
    event!(Level::INFO, "Control channel ready.");
    Ok(())
  }

  /// Registers a fresh runner for `name`, then runs the configured command.
  async fn run_hook(&self, name: &str) -> ConductorResult<()> {
    let runner = Arc::new(HookRunner::new(name));
    self.hooks.insert(runner.clone());
    runner.run(self.config.hook(name).as_ref()).await
  }

  #[instrument(name = "stage::create_runners", skip_all)]
  async fn create_runners(&self, ctx: ContextData<RunState>) -> ConductorResult<()> {
    let launchers = self.config.launchers().await?;
    let runners = self.factories.create_all(launchers, &self.reporter)?;
    event!(Level::INFO, count = runners.len(), "Test runners created.");
    ctx.write().runners = runners;
    Ok(())
  }

  /// Spawns the listener offering every login to the attachable runners.
  /// The listener lives until the channel's event bus closes and only holds
  /// weak references, so the runners are dropped with the run state.
  fn subscribe_clients(&self, ctx: &ContextData<RunState>) {
    let runners: Vec<Weak<dyn TestRunner>> = ctx
      .read()
      .runners
      .iter()
      .filter(|r| r.as_attach().is_some())
      .map(Arc::downgrade)
      .collect();
    let mut events = self.channel.subscribe();
    event!(Level::DEBUG, attachable = runners.len(), "Listening for client logins.");

    tokio::spawn(async move {
      loop {
        match events.recv().await {
          Ok(ChannelEvent::ClientConnected(login)) => {
            let live: Vec<Arc<dyn TestRunner>> = runners.iter().filter_map(Weak::upgrade).collect();
            offer_login(&live, &login);
          }
          Ok(ChannelEvent::Ready) => {}
          Err(RecvError::Lagged(skipped)) => event!(Level::WARN, skipped, "Client listener lagged."),
          Err(RecvError::Closed) => break,
        }
      }
      event!(Level::DEBUG, "Client listener finished.");
    });
  }
}

/// Offers `login` to every runner with the attach capability.
pub(crate) fn offer_login(runners: &[Arc<dyn TestRunner>], login: &ClientLogin) -> bool {
  let mut taken = false;
  for attach in runners.iter().filter_map(|r| r.as_attach()) {
    taken |= attach.try_attach(login);
  }
  if !taken {
    event!(Level::WARN, identity = %login.identity, connection_id = %login.connection_id, "No runner took the client.");
  }
  taken
}
