// conductor/src/lifecycle/runner.rs

//! Runs one lifecycle hook command to completion or until stopped.

use crate::config::HookSpec;
use crate::error::{ConductorError, ConductorResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
  /// Constructed, possibly with a command in flight.
  Running,
  /// Terminal. Any command still in flight has been killed.
  Stopped,
}

/// One hook invocation.
///
/// `run` resolves exactly once with the command's outcome. `stop` moves the
/// runner to [`HookState::Stopped`] and kills the command if it still runs;
/// calling it again, or after the command finished, does nothing.
/// [`HookRunner::terminated`] resolves once the command has been reaped.
pub struct HookRunner {
  name: String,
  cancel: CancellationToken,
  command_alive: Arc<watch::Sender<bool>>,
}

/// Clears the runner's alive flag when the command's owner is done with it.
struct AliveGuard(Arc<watch::Sender<bool>>);

impl Drop for AliveGuard {
  fn drop(&mut self) {
    self.0.send_replace(false);
  }
}

impl HookRunner {
  pub fn new(name: impl Into<String>) -> Self {
    let (command_alive, _) = watch::channel(false);
    Self {
      name: name.into(),
      cancel: CancellationToken::new(),
      command_alive: Arc::new(command_alive),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn state(&self) -> HookState {
    if self.cancel.is_cancelled() {
      HookState::Stopped
    } else {
      HookState::Running
    }
  }

  pub fn stop(&self) {
    if !self.cancel.is_cancelled() {
      event!(Level::DEBUG, hook = %self.name, "Stopping hook runner.");
      self.cancel.cancel();
    }
  }

  /// True while a spawned command has not been reaped.
  pub fn has_live_command(&self) -> bool {
    *self.command_alive.borrow()
  }

  /// Resolves once no command of this runner is alive. After `stop` this
  /// waits for the kill to land.
  pub async fn terminated(&self) {
    let mut alive = self.command_alive.subscribe();
    let _ = alive.wait_for(|alive| !*alive).await;
  }

  /// Runs the hook's command. A hook without a command succeeds immediately.
  ///
  /// Without `wait_for_text` this waits for the command to exit; a non-zero
  /// exit is `HookFailed`. With `wait_for_text` it returns once the command's
  /// output contains the text and leaves the command running until `stop`.
  #[instrument(name = "HookRunner::run", skip_all, fields(hook = %self.name))]
  pub async fn run(&self, spec: Option<&HookSpec>) -> ConductorResult<()> {
    let Some((spec, mut cmd)) = spec.and_then(|s| s.command.to_command().map(|cmd| (s, cmd))) else {
      event!(Level::DEBUG, "No command configured for hook.");
      return Ok(());
    };

    if self.cancel.is_cancelled() {
      return Err(ConductorError::HookStopped { hook: self.name.clone() });
    }

    cmd.kill_on_drop(true);
    let mut child = cmd.spawn().map_err(|source| ConductorError::HookSpawn {
      hook: self.name.clone(),
      source,
    })?;
    self.command_alive.send_replace(true);
    let alive = AliveGuard(self.command_alive.clone());
    event!(Level::INFO, command = %spec.command.display(), pid = ?child.id(), "Hook started.");

    match &spec.wait_for_text {
      None => {
        self.forward_output(&mut child, None);
        self.wait_for_exit(child, alive).await
      }
      Some(text) => self.wait_for_text(child, alive, text, spec.wait_for_text_timeout).await,
    }
  }

  /// Both arms reap the child before `alive` is dropped.
  async fn wait_for_exit(&self, mut child: Child, alive: AliveGuard) -> ConductorResult<()> {
    let _alive = alive;
    tokio::select! {
      status = child.wait() => {
        let status = status.map_err(|source| ConductorError::HookSpawn { hook: self.name.clone(), source })?;
        if status.success() {
          event!(Level::INFO, "Hook finished.");
          Ok(())
        } else {
          Err(ConductorError::HookFailed { hook: self.name.clone(), status: status.to_string() })
        }
      }
      _ = self.cancel.cancelled() => {
        let _ = child.kill().await;
        Err(ConductorError::HookStopped { hook: self.name.clone() })
      }
    }
  }

  async fn wait_for_text(
    &self,
    mut child: Child,
    alive: AliveGuard,
    text: &str,
    timeout: Duration,
  ) -> ConductorResult<()> {
    let (found_tx, mut found_rx) = mpsc::channel::<()>(1);
    self.forward_output(&mut child, Some((text.to_string(), found_tx)));

    // The command outlives this call; the monitor owns it until it exits or the runner stops.
    let cancel = self.cancel.clone();
    let hook = self.name.clone();
    tokio::spawn(async move {
      tokio::select! {
        status = child.wait() => event!(Level::DEBUG, hook = %hook, status = ?status, "Background hook exited."),
        _ = cancel.cancelled() => {
          let _ = child.kill().await;
          event!(Level::INFO, hook = %hook, "Background hook killed.");
        }
      }
      drop(alive);
    });

    let waited = tokio::select! {
      found = tokio::time::timeout(timeout, found_rx.recv()) => found,
      _ = self.cancel.cancelled() => return Err(ConductorError::HookStopped { hook: self.name.clone() }),
    };
    match waited {
      Ok(Some(())) => {
        event!(Level::INFO, text, "Hook printed the awaited text.");
        Ok(())
      }
      Ok(None) => Err(ConductorError::HookFailed {
        hook: self.name.clone(),
        status: format!("output ended before '{}' was printed", text),
      }),
      Err(_) => Err(ConductorError::HookTimeout {
        hook: self.name.clone(),
        text: text.to_string(),
        timeout,
      }),
    }
  }

  /// Drains stdout and stderr into the log, optionally signalling when a line
  /// contains the awaited text. The signal sender is dropped when both streams end.
  fn forward_output(&self, child: &mut Child, watch: Option<(String, mpsc::Sender<()>)>) {
    if let Some(stdout) = child.stdout.take() {
      spawn_line_reader(stdout, self.name.clone(), "stdout", watch.clone());
    }
    if let Some(stderr) = child.stderr.take() {
      spawn_line_reader(stderr, self.name.clone(), "stderr", watch);
    }
  }
}

fn spawn_line_reader<R>(reader: R, hook: String, stream: &'static str, watch: Option<(String, mpsc::Sender<()>)>)
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut lines = BufReader::new(reader).lines();
    let mut watch = watch;
    while let Ok(Some(line)) = lines.next_line().await {
      event!(Level::DEBUG, hook = %hook, stream, "{}", line);
      if let Some((needle, found)) = &watch {
        if line.contains(needle.as_str()) {
          let _ = found.send(()).await;
          // Stop watching; keep draining so the command never blocks on a full pipe.
          watch = None;
        }
      }
    }
  });
}
