// conductor/src/runner/browser.rs

//! The `browser` protocol: optionally launch a browser, then wait for it to log
//! in through the control channel and stream its results.

use crate::channel::{ClientLogin, ClientMessage, ClientTransport};
use crate::config::Launcher;
use crate::error::{ConductorError, ConductorResult};
use crate::reporter::{Reporter, TestResult};
use crate::runner::process::{collect_lines, spawn_launcher, timed_out};
use crate::runner::{Attach, TestRunner};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{event, instrument, Level};

/// Waits for the client whose connection id equals this launcher's id.
///
/// The first matching login is bound; later ones are refused. Results are read
/// from the bound transport until [`ClientMessage::Done`]. A transport that
/// closes before that is `ClientDisconnected`. A launcher timeout covers the
/// wait for the client and the whole stream and is reported as a failure.
pub struct BrowserTestRunner {
  launcher: Launcher,
  reporter: Arc<dyn Reporter>,
  attached: watch::Sender<Option<ClientTransport>>,
}

impl BrowserTestRunner {
  pub fn new(launcher: Launcher, reporter: Arc<dyn Reporter>) -> Self {
    let (attached, _) = watch::channel(None);
    Self {
      launcher,
      reporter,
      attached,
    }
  }

  pub fn is_attached(&self) -> bool {
    self.attached.borrow().is_some()
  }

  async fn stream_results(&self) -> ConductorResult<()> {
    let mut attached = self.attached.subscribe();
    let transport = match attached.wait_for(Option::is_some).await {
      Ok(slot) => slot.clone(),
      Err(_) => None,
    };
    let Some(transport) = transport else {
      return Err(ConductorError::Internal("attachment slot closed".to_string()));
    };
    event!(Level::INFO, "Client attached, reading results.");

    let name = self.launcher.name();
    loop {
      match transport.recv().await {
        Some(ClientMessage::Result(result)) => self.reporter.report(name, result),
        Some(ClientMessage::Done) => {
          event!(Level::INFO, "Client reported all results.");
          return Ok(());
        }
        None => {
          return Err(ConductorError::ClientDisconnected {
            launcher: name.to_string(),
          })
        }
      }
    }
  }
}

#[async_trait]
impl TestRunner for BrowserTestRunner {
  fn launcher(&self) -> &Launcher {
    &self.launcher
  }

  #[instrument(name = "BrowserTestRunner::start", skip_all, fields(launcher = %self.launcher.name(), id = %self.launcher.id))]
  async fn start(&self) -> ConductorResult<()> {
    // No command means the browser is started by someone else and only logs in.
    let browser = if self.launcher.spec.command.is_empty() {
      None
    } else {
      let mut child = spawn_launcher(&self.launcher)?;
      // Drained and discarded so a chatty browser never blocks on a full pipe.
      let _ = child.stdout.take().map(collect_lines);
      let _ = child.stderr.take().map(collect_lines);
      Some(child)
    };

    let outcome = match self.launcher.spec.timeout() {
      Some(timeout) => match tokio::time::timeout(timeout, self.stream_results()).await {
        Ok(outcome) => outcome,
        Err(_) => {
          event!(Level::WARN, ?timeout, "Browser did not finish in time.");
          self.reporter.report(self.launcher.name(), timed_out(&self.launcher));
          Ok(())
        }
      },
      None => self.stream_results().await,
    };

    if let Some(mut browser) = browser {
      let _ = browser.kill().await;
    }
    outcome
  }

  fn as_attach(&self) -> Option<&dyn Attach> {
    Some(self)
  }
}

impl Attach for BrowserTestRunner {
  fn try_attach(&self, login: &ClientLogin) -> bool {
    if login.connection_id != self.launcher.id {
      return false;
    }
    if self.is_attached() {
      event!(Level::WARN, launcher = %self.launcher.name(), identity = %login.identity, "Refusing second client for launcher.");
      return false;
    }
    event!(Level::INFO, launcher = %self.launcher.name(), identity = %login.identity, "Client attached.");
    self.attached.send_replace(Some(login.transport.clone()));
    true
  }
}

/// A result for a client-side error message, as browsers report uncaught errors.
pub fn client_error(message: impl Into<String>) -> TestResult {
  TestResult::failed("client error").with_log(message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::command::CommandLine;
  use crate::config::LauncherSpec;
  use crate::reporter::{TapReporter, Verdict};
  use std::time::Duration;

  fn browser(timeout_ms: Option<u64>) -> (Arc<BrowserTestRunner>, Arc<TapReporter>) {
    let reporter = Arc::new(TapReporter::with_writer(std::io::sink()));
    let mut spec = LauncherSpec::new("chrome", "browser", CommandLine::default());
    spec.timeout_ms = timeout_ms;
    (Arc::new(BrowserTestRunner::new(Launcher::new(spec), reporter.clone())), reporter)
  }

  fn login(connection_id: &str) -> (tokio::sync::mpsc::UnboundedSender<ClientMessage>, ClientLogin) {
    let (tx, transport) = ClientTransport::pair();
    (
      tx,
      ClientLogin {
        identity: "Chrome 120".into(),
        connection_id: connection_id.into(),
        transport,
      },
    )
  }

  #[test]
  fn only_the_matching_id_attaches_once() {
    let (runner, _) = browser(None);
    let (_tx, stranger) = login("someone-else");
    assert!(!runner.try_attach(&stranger));

    let (_tx, mine) = login(&runner.launcher().id);
    assert!(runner.try_attach(&mine));
    let (_tx, again) = login(&runner.launcher().id);
    assert!(!runner.try_attach(&again));
  }

  #[tokio::test]
  async fn streams_results_until_done() {
    let (runner, reporter) = browser(None);
    let task = {
      let runner = runner.clone();
      tokio::spawn(async move { runner.start().await })
    };

    let (tx, mine) = login(&runner.launcher().id);
    assert!(runner.try_attach(&mine));
    tx.send(ClientMessage::Result(TestResult::passed("renders"))).unwrap();
    tx.send(ClientMessage::Result(client_error("ReferenceError: x"))).unwrap();
    tx.send(ClientMessage::Done).unwrap();

    task.await.unwrap().unwrap();
    let summary = reporter.summary();
    assert_eq!((summary.passed, summary.failed), (1, 1));
  }

  #[tokio::test]
  async fn disconnect_before_done_is_an_error() {
    let (runner, _) = browser(None);
    let (tx, mine) = login(&runner.launcher().id);
    runner.try_attach(&mine);
    drop(tx);
    assert!(matches!(runner.start().await, Err(ConductorError::ClientDisconnected { .. })));
  }

  #[tokio::test]
  async fn no_client_within_timeout_reports_failure() {
    let (runner, reporter) = browser(Some(50));
    tokio::time::timeout(Duration::from_secs(5), runner.start())
      .await
      .unwrap()
      .unwrap();
    let results = reporter.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1.verdict, Verdict::Failed);
  }
}
