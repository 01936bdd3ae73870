// conductor/src/runner/dispatch.rs

//! Protocol tag -> runner constructor.

use crate::config::Launcher;
use crate::error::{ConductorError, ConductorResult};
use crate::reporter::Reporter;
use crate::runner::{BrowserTestRunner, ProcessTestRunner, TapProcessTestRunner, TestRunner};
use std::sync::Arc;
use tracing::{event, Level};

pub type RunnerFactory = Arc<dyn Fn(Launcher, Arc<dyn Reporter>) -> Arc<dyn TestRunner> + Send + Sync>;

/// A closed table from protocol tag to constructor. Building a runner for a tag
/// that is not in the table fails immediately with `UnknownProtocol`.
#[derive(Clone)]
pub struct RunnerFactories {
  table: Vec<(String, RunnerFactory)>,
}

impl RunnerFactories {
  /// `process`, `browser` and `tap`.
  pub fn builtin() -> Self {
    Self::empty()
      .with("process", |launcher, reporter| Arc::new(ProcessTestRunner::new(launcher, reporter)) as Arc<dyn TestRunner>)
      .with("browser", |launcher, reporter| Arc::new(BrowserTestRunner::new(launcher, reporter)) as Arc<dyn TestRunner>)
      .with("tap", |launcher, reporter| Arc::new(TapProcessTestRunner::new(launcher, reporter)) as Arc<dyn TestRunner>)
  }

  pub fn empty() -> Self {
    Self { table: Vec::new() }
  }

  /// Adds `protocol`, replacing any existing entry for it.
  pub fn with<F>(mut self, protocol: impl Into<String>, factory: F) -> Self
  where
    F: Fn(Launcher, Arc<dyn Reporter>) -> Arc<dyn TestRunner> + Send + Sync + 'static,
  {
    let protocol = protocol.into();
    self.table.retain(|(tag, _)| *tag != protocol);
    self.table.push((protocol, Arc::new(factory)));
    self
  }

  pub fn protocols(&self) -> Vec<&str> {
    self.table.iter().map(|(tag, _)| tag.as_str()).collect()
  }

  pub fn factory_for(&self, protocol: &str) -> Option<RunnerFactory> {
    self
      .table
      .iter()
      .find(|(tag, _)| tag == protocol)
      .map(|(_, factory)| factory.clone())
  }

  pub fn create(&self, launcher: Launcher, reporter: Arc<dyn Reporter>) -> ConductorResult<Arc<dyn TestRunner>> {
    let factory = self.factory_for(launcher.protocol()).ok_or_else(|| ConductorError::UnknownProtocol {
      launcher: launcher.name().to_string(),
      protocol: launcher.protocol().to_string(),
    })?;
    event!(Level::DEBUG, launcher = %launcher.name(), protocol = %launcher.protocol(), "Creating test runner.");
    Ok(factory(launcher, reporter))
  }

  /// One runner per launcher, in launcher order. Stops at the first unknown protocol.
  pub fn create_all(
    &self,
    launchers: Vec<Launcher>,
    reporter: &Arc<dyn Reporter>,
  ) -> ConductorResult<Vec<Arc<dyn TestRunner>>> {
    launchers
      .into_iter()
      .map(|launcher| self.create(launcher, reporter.clone()))
      .collect()
  }
}

impl Default for RunnerFactories {
  fn default() -> Self {
    Self::builtin()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::command::CommandLine;
  use crate::config::LauncherSpec;
  use crate::reporter::TapReporter;

  fn launcher(name: &str, protocol: &str) -> Launcher {
    Launcher::new(LauncherSpec::new(name, protocol, CommandLine::shell("true")))
  }

  #[test]
  fn builtin_table_maps_the_three_protocols() {
    let factories = RunnerFactories::builtin();
    assert_eq!(factories.protocols(), ["process", "browser", "tap"]);

    let reporter: Arc<dyn Reporter> = Arc::new(TapReporter::with_writer(std::io::sink()));
    let runners = factories
      .create_all(
        vec![launcher("a", "process"), launcher("b", "browser"), launcher("c", "tap")],
        &reporter,
      )
      .unwrap();
    let names: Vec<_> = runners.iter().map(|r| r.launcher().name().to_string()).collect();
    assert_eq!(names, ["a", "b", "c"]);

    let attachable: Vec<_> = runners.iter().map(|r| r.as_attach().is_some()).collect();
    assert_eq!(attachable, [false, true, false]);
  }

  #[test]
  fn unknown_protocol_fails_at_construction() {
    let reporter: Arc<dyn Reporter> = Arc::new(TapReporter::with_writer(std::io::sink()));
    let err = RunnerFactories::builtin()
      .create_all(vec![launcher("a", "process"), launcher("ws", "websocket")], &reporter)
      .err()
      .unwrap();
    match err {
      ConductorError::UnknownProtocol { launcher, protocol } => {
        assert_eq!(launcher, "ws");
        assert_eq!(protocol, "websocket");
      }
      other => panic!("expected UnknownProtocol, got {other:?}"),
    }
  }
}
