// conductor/src/orchestrator/shutdown.rs

//! Process termination: the exit gate and the watchdog racing the channel stop.

use crate::channel::ControlChannel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{event, instrument, Level};

/// Terminates the process. Injectable so tests can observe the exit instead of dying.
pub trait ProcessExit: Send + Sync {
  fn exit(&self, code: i32);
}

/// Calls `std::process::exit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
  fn exit(&self, code: i32) {
    std::process::exit(code)
  }
}

/// Which completion source reached the exit gate first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSource {
  ChannelStopped,
  DeadlineElapsed,
}

/// First-wins exit latch. The first `fire` calls [`ProcessExit::exit`] with the
/// gate's code; every later `fire` is a no-op. [`ExitGate::fired`] resolves
/// only after that exit call has returned.
pub struct ExitGate {
  claimed: AtomicBool,
  fired: watch::Sender<Option<ExitSource>>,
  exit: Arc<dyn ProcessExit>,
  code: i32,
}

impl ExitGate {
  pub fn new(exit: Arc<dyn ProcessExit>, code: i32) -> Self {
    let (fired, _) = watch::channel(None);
    Self {
      claimed: AtomicBool::new(false),
      fired,
      exit,
      code,
    }
  }

  pub fn code(&self) -> i32 {
    self.code
  }

  /// Returns `true` if this call won the race.
  pub fn fire(&self, source: ExitSource) -> bool {
    if self.claimed.swap(true, Ordering::AcqRel) {
      event!(Level::TRACE, ?source, "Exit gate already fired.");
      return false;
    }
    event!(Level::INFO, ?source, code = self.code, "Exiting.");
    self.exit.exit(self.code);
    self.fired.send_replace(Some(source));
    true
  }

  /// True once some `fire` call has won, even if its exit call is still running.
  pub fn is_claimed(&self) -> bool {
    self.claimed.load(Ordering::Acquire)
  }

  pub fn source(&self) -> Option<ExitSource> {
    *self.fired.borrow()
  }

  /// Resolves once the gate has fired.
  pub async fn fired(&self) -> Option<ExitSource> {
    let mut rx = self.fired.subscribe();
    let source = rx.wait_for(Option::is_some).await.ok().and_then(|slot| *slot);
    source
  }
}

/// Starts the channel stop and the watchdog, then waits for whichever reaches
/// the gate first. The channel stop is left running if the watchdog wins.
#[instrument(name = "shutdown::terminate", skip_all, fields(deadline = ?deadline, code = gate.code()))]
pub(crate) async fn terminate(
  channel: Arc<dyn ControlChannel>,
  gate: Arc<ExitGate>,
  deadline: Duration,
) -> Option<ExitSource> {
  {
    let gate = gate.clone();
    tokio::spawn(async move {
      channel.stop().await;
      event!(Level::DEBUG, "Control channel stopped.");
      gate.fire(ExitSource::ChannelStopped);
    });
  }

  let watchdog = {
    let gate = gate.clone();
    tokio::spawn(async move {
      tokio::time::sleep(deadline).await;
      if !gate.is_claimed() {
        event!(Level::WARN, ?deadline, "Control channel did not stop in time, forcing exit.");
      }
      gate.fire(ExitSource::DeadlineElapsed);
    })
  };

  let source = gate.fired().await;
  watchdog.abort();
  source
}
