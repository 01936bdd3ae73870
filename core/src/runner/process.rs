// conductor/src/runner/process.rs

//! The `process` protocol: run the launcher's command, one result per launcher.

use crate::config::{Launcher, LAUNCHER_ID_ENV};
use crate::error::{ConductorError, ConductorResult};
use crate::reporter::{Reporter, TestResult};
use crate::runner::TestRunner;
use async_trait::async_trait;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{event, instrument, Level};

/// Lines of output kept per stream for a failing result.
const MAX_LOG_LINES: usize = 200;

/// Passes when the command exits with status zero. Output is attached to a
/// failing result. A launcher timeout kills the command and reports a failure.
pub struct ProcessTestRunner {
  launcher: Launcher,
  reporter: Arc<dyn Reporter>,
}

impl ProcessTestRunner {
  pub fn new(launcher: Launcher, reporter: Arc<dyn Reporter>) -> Self {
    Self { launcher, reporter }
  }
}

#[async_trait]
impl TestRunner for ProcessTestRunner {
  fn launcher(&self) -> &Launcher {
    &self.launcher
  }

  #[instrument(name = "ProcessTestRunner::start", skip_all, fields(launcher = %self.launcher.name()))]
  async fn start(&self) -> ConductorResult<()> {
    let mut child = spawn_launcher(&self.launcher)?;
    let stdout = child.stdout.take().map(collect_lines);
    let stderr = child.stderr.take().map(collect_lines);

    let name = self.launcher.name();
    let Some(status) = wait_with_timeout(&mut child, &self.launcher).await? else {
      self.reporter.report(name, timed_out(&self.launcher));
      return Ok(());
    };

    let result = if status.success() {
      TestResult::passed(name)
    } else {
      let mut failed = TestResult::failed(name).with_log(format!("exited with {}", status));
      failed.logs.extend(join_lines(stdout).await);
      failed.logs.extend(join_lines(stderr).await);
      failed
    };
    self.reporter.report(name, result);
    Ok(())
  }
}

/// Spawns the launcher's command with piped output, killed if the handle is dropped.
///
/// The command sees the launcher id in `CONDUCTOR_LAUNCHER_ID` and in place of
/// every `{id}` in its command line, so a browser can log in with it.
pub(crate) fn spawn_launcher(launcher: &Launcher) -> ConductorResult<Child> {
  let command = launcher.command();
  let mut cmd = command.to_command().ok_or_else(|| {
    ConductorError::InvalidConfig(format!("launcher '{}' has neither command nor exe", launcher.name()))
  })?;
  cmd.env(LAUNCHER_ID_ENV, &launcher.id).kill_on_drop(true);
  let child = cmd.spawn().map_err(|source| ConductorError::RunnerSpawn {
    launcher: launcher.name().to_string(),
    source,
  })?;
  event!(Level::DEBUG, command = %command.display(), pid = ?child.id(), "Launcher process spawned.");
  Ok(child)
}

/// Waits for exit, or kills the child once the launcher's timeout elapses.
/// `Ok(None)` means it timed out.
pub(crate) async fn wait_with_timeout(child: &mut Child, launcher: &Launcher) -> ConductorResult<Option<ExitStatus>> {
  let waited = match launcher.spec.timeout() {
    Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
      Ok(waited) => waited,
      Err(_) => {
        event!(Level::WARN, ?timeout, "Launcher timed out, killing it.");
        let _ = child.kill().await;
        return Ok(None);
      }
    },
    None => child.wait().await,
  };
  waited.map(Some).map_err(|source| ConductorError::RunnerSpawn {
    launcher: launcher.name().to_string(),
    source,
  })
}

pub(crate) fn timed_out(launcher: &Launcher) -> TestResult {
  let timeout = launcher.spec.timeout().unwrap_or(Duration::ZERO);
  TestResult::failed(launcher.name()).with_log(
    ConductorError::RunnerTimeout {
      launcher: launcher.name().to_string(),
      timeout,
    }
    .to_string(),
  )
}

pub(crate) fn collect_lines<R>(reader: R) -> JoinHandle<Vec<String>>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut lines = BufReader::new(reader).lines();
    let mut kept = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
      if kept.len() < MAX_LOG_LINES {
        kept.push(line);
      }
    }
    kept
  })
}

pub(crate) async fn join_lines(handle: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
  match handle {
    Some(handle) => handle.await.unwrap_or_default(),
    None => Vec::new(),
  }
}
