// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different subset.

use async_trait::async_trait;
use conductor::channel::ChannelEvent;
use conductor::runner::Attach;
use conductor::{
  ClientLogin, ClientTransport, CommandLine, ConductorError, ConductorResult, Configuration, ContextData,
  ControlChannel, HookSpec, Launcher, LauncherSpec, LoopbackChannel, ProcessExit, Reporter, Summary,
  TapReporter, TestResult, TestRunner,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::Level;

// --- Pipeline engine fixtures ---
#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub message: String,
  pub stages_executed: Vec<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Conductor error: {0}")]
  Conductor(String),

  #[error("Test handler failed: {0}")]
  Handler(String),
}

impl From<ConductorError> for TestError {
  fn from(e: ConductorError) -> Self {
    TestError::Conductor(e.to_string())
  }
}

pub fn create_simple_handler(
  stage_name: &'static str,
  message_to_append: &'static str,
) -> conductor::Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.counter += 1;
      guard.message.push_str(message_to_append);
      guard.stages_executed.push(stage_name.to_string());
      Ok(())
    })
  })
}

pub fn create_failing_handler(
  stage_name: &'static str,
  error_message: &'static str,
) -> conductor::Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().stages_executed.push(stage_name.to_string());
      Err(TestError::Handler(error_message.to_string()))
    })
  })
}

// --- Tracing ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Orchestrator collaborators ---

/// Records exit codes instead of terminating the test process.
#[derive(Default)]
pub struct RecordingExit {
  pub codes: Mutex<Vec<i32>>,
}

impl ProcessExit for RecordingExit {
  fn exit(&self, code: i32) {
    self.codes.lock().push(code);
  }
}

/// A TAP reporter into a sink that counts `finish` calls.
pub struct CountingReporter {
  pub inner: TapReporter,
  pub finish_calls: AtomicUsize,
}

impl CountingReporter {
  pub fn new() -> Self {
    Self {
      inner: TapReporter::with_writer(std::io::sink()),
      finish_calls: AtomicUsize::new(0),
    }
  }

  pub fn finish_calls(&self) -> usize {
    self.finish_calls.load(Ordering::SeqCst)
  }
}

impl Reporter for CountingReporter {
  fn report(&self, launcher: &str, result: TestResult) {
    self.inner.report(launcher, result)
  }

  fn finish(&self) -> Summary {
    self.finish_calls.fetch_add(1, Ordering::SeqCst);
    self.inner.finish()
  }
}

/// Loopback channel whose `stop` never completes, so only the watchdog can exit.
#[derive(Default)]
pub struct HangingChannel {
  pub inner: LoopbackChannel,
}

#[async_trait]
impl ControlChannel for HangingChannel {
  async fn start(&self) -> anyhow::Result<()> {
    self.inner.start().await
  }

  async fn stop(&self) {
    std::future::pending::<()>().await
  }

  fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
    self.inner.subscribe()
  }
}

/// A channel that fails to start.
pub struct BrokenChannel;

#[async_trait]
impl ControlChannel for BrokenChannel {
  async fn start(&self) -> anyhow::Result<()> {
    anyhow::bail!("port already in use")
  }

  async fn stop(&self) {}

  fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
    broadcast::channel(1).1
  }
}

/// Fixed launchers with known ids, a concurrency limit and hook commands.
#[derive(Default)]
pub struct StaticConfig {
  pub launchers: Vec<Launcher>,
  pub parallel: usize,
  pub hooks: HashMap<String, HookSpec>,
}

impl StaticConfig {
  pub fn new(launchers: Vec<Launcher>, parallel: usize) -> Self {
    Self {
      launchers,
      parallel,
      hooks: HashMap::new(),
    }
  }

  pub fn with_hook(self, name: &str, command: &str) -> Self {
    self.with_hook_spec(name, HookSpec::new(CommandLine::shell(command)))
  }

  pub fn with_hook_spec(mut self, name: &str, spec: HookSpec) -> Self {
    self.hooks.insert(name.to_string(), spec);
    self
  }
}

#[async_trait]
impl Configuration for StaticConfig {
  async fn launchers(&self) -> ConductorResult<Vec<Launcher>> {
    Ok(self.launchers.clone())
  }

  fn parallel(&self) -> usize {
    self.parallel.max(1)
  }

  fn hook(&self, name: &str) -> Option<HookSpec> {
    self.hooks.get(name).cloned()
  }
}

/// A launcher whose id equals its name, so tests can log clients in for it.
pub fn launcher(name: &str, protocol: &str, command: &str) -> Launcher {
  let command = if command.is_empty() {
    CommandLine::default()
  } else {
    CommandLine::shell(command)
  };
  Launcher::new(LauncherSpec::new(name, protocol, command).with_id(name))
}

/// Shared bookkeeping for [`FakeRunner`]s and [`Tracked`] runners.
#[derive(Default)]
pub struct Gauge {
  running: AtomicUsize,
  pub max_running: AtomicUsize,
  pub started: Mutex<Vec<String>>,
  pub finished: Mutex<Vec<String>>,
  /// `start:<name>` and `finish:<name>` in the order they happened.
  pub events: Mutex<Vec<String>>,
}

impl Gauge {
  pub fn record_start(&self, name: &str) {
    self.started.lock().push(name.to_string());
    self.events.lock().push(format!("start:{}", name));
    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_running.fetch_max(now, Ordering::SeqCst);
  }

  pub fn record_finish(&self, name: &str) {
    self.running.fetch_sub(1, Ordering::SeqCst);
    self.finished.lock().push(name.to_string());
    self.events.lock().push(format!("finish:{}", name));
  }

  /// Position of `event` in the event log.
  pub fn position(&self, event: &str) -> Option<usize> {
    self.events.lock().iter().position(|e| e == event)
  }

  pub fn max(&self) -> usize {
    self.max_running.load(Ordering::SeqCst)
  }

  pub fn started(&self) -> Vec<String> {
    self.started.lock().clone()
  }

  pub fn finished(&self) -> Vec<String> {
    self.finished.lock().clone()
  }
}

/// Sleeps for `delay`, reports one result, then succeeds or fails.
pub struct FakeRunner {
  pub launcher: Launcher,
  pub delay: Duration,
  pub fail: bool,
  pub gauge: Arc<Gauge>,
  pub reporter: Option<Arc<dyn Reporter>>,
}

impl FakeRunner {
  pub fn new(name: &str, delay_ms: u64, gauge: Arc<Gauge>) -> Self {
    Self {
      launcher: launcher(name, "fake", "true"),
      delay: Duration::from_millis(delay_ms),
      fail: false,
      gauge,
      reporter: None,
    }
  }

  pub fn failing(mut self) -> Self {
    self.fail = true;
    self
  }
}

#[async_trait]
impl TestRunner for FakeRunner {
  fn launcher(&self) -> &Launcher {
    &self.launcher
  }

  async fn start(&self) -> ConductorResult<()> {
    let name = self.launcher.name().to_string();
    self.gauge.record_start(&name);
    tokio::time::sleep(self.delay).await;
    self.gauge.record_finish(&name);
    if let Some(reporter) = &self.reporter {
      reporter.report(&name, TestResult::passed(&name));
    }
    if self.fail {
      return Err(ConductorError::Internal(format!("{} failed", name)));
    }
    Ok(())
  }
}

/// Wraps a real runner and records its start and finish on a [`Gauge`].
pub struct Tracked {
  pub inner: Arc<dyn TestRunner>,
  pub gauge: Arc<Gauge>,
}

#[async_trait]
impl TestRunner for Tracked {
  fn launcher(&self) -> &Launcher {
    self.inner.launcher()
  }

  async fn start(&self) -> ConductorResult<()> {
    let name = self.inner.launcher().name().to_string();
    self.gauge.record_start(&name);
    let result = self.inner.start().await;
    self.gauge.record_finish(&name);
    result
  }

  fn as_attach(&self) -> Option<&dyn Attach> {
    self.inner.as_attach()
  }
}

/// The builtin factories with every runner wrapped in [`Tracked`].
pub fn tracked_builtin(gauge: Arc<Gauge>) -> conductor::RunnerFactories {
  let builtin = conductor::RunnerFactories::builtin();
  let mut factories = conductor::RunnerFactories::empty();
  for protocol in builtin.protocols() {
    let Some(make) = builtin.factory_for(protocol) else { continue };
    let gauge = gauge.clone();
    factories = factories.with(protocol, move |launcher, reporter| {
      Arc::new(Tracked {
        inner: make(launcher, reporter),
        gauge: gauge.clone(),
      }) as Arc<dyn TestRunner>
    });
  }
  factories
}

/// A runner with the attach capability that completes once a client attaches.
pub struct AttachableFake {
  pub launcher: Launcher,
  pub offers: AtomicUsize,
  attached: watch::Sender<Option<String>>,
}

impl AttachableFake {
  pub fn new(name: &str) -> Self {
    Self {
      launcher: launcher(name, "fake-browser", ""),
      offers: AtomicUsize::new(0),
      attached: watch::channel(None).0,
    }
  }

  pub fn attached_identity(&self) -> Option<String> {
    self.attached.borrow().clone()
  }
}

#[async_trait]
impl TestRunner for AttachableFake {
  fn launcher(&self) -> &Launcher {
    &self.launcher
  }

  async fn start(&self) -> ConductorResult<()> {
    let mut rx = self.attached.subscribe();
    let _ = rx.wait_for(Option::is_some).await;
    Ok(())
  }

  fn as_attach(&self) -> Option<&dyn Attach> {
    Some(self)
  }
}

impl Attach for AttachableFake {
  fn try_attach(&self, login: &ClientLogin) -> bool {
    self.offers.fetch_add(1, Ordering::SeqCst);
    if login.connection_id != self.launcher.id {
      return false;
    }
    self.attached.send_replace(Some(login.identity.clone()));
    true
  }
}

/// Waits until something subscribed to the loopback bus, i.e. the client
/// listener is up, then logs a client in.
pub async fn connect_when_listening(
  channel: &LoopbackChannel,
  identity: &str,
  connection_id: &str,
) -> tokio::sync::mpsc::UnboundedSender<conductor::ClientMessage> {
  while channel.subscriber_count() == 0 {
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  channel.connect(identity, connection_id)
}

pub fn login(identity: &str, connection_id: &str) -> ClientLogin {
  let (_tx, transport) = ClientTransport::pair();
  ClientLogin {
    identity: identity.to_string(),
    connection_id: connection_id.to_string(),
    transport,
  }
}
