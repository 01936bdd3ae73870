// conductor/src/runner/scheduler.rs

//! Bounded-concurrency execution of test runners.

use crate::error::{ConductorError, ConductorResult};
use crate::runner::TestRunner;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{event, instrument, Level};

/// Runs every runner with at most `limit` executing at once.
///
/// Runners are admitted in FIFO order; whenever one completes the next queued
/// runner starts. Completion order is unconstrained. The first runner error is
/// returned immediately: runners already executing keep going in the
/// background, queued runners are never started. A `limit` of 0 is treated as 1.
#[instrument(name = "run_bounded", skip_all, fields(runners = runners.len(), limit = limit))]
pub async fn run_bounded(runners: &[Arc<dyn TestRunner>], limit: usize) -> ConductorResult<()> {
  let limit = limit.max(1);
  let mut queue: VecDeque<Arc<dyn TestRunner>> = runners.iter().cloned().collect();
  let mut in_flight: JoinSet<(String, ConductorResult<()>)> = JoinSet::new();

  loop {
    while in_flight.len() < limit {
      let Some(runner) = queue.pop_front() else { break };
      let name = runner.launcher().name().to_string();
      event!(Level::INFO, launcher = %name, queued = queue.len(), "Starting test runner.");
      in_flight.spawn(async move {
        let result = runner.start().await;
        (name, result)
      });
    }

    let Some(joined) = in_flight.join_next().await else {
      event!(Level::DEBUG, "All test runners completed.");
      return Ok(());
    };

    let failure = match joined {
      Ok((name, Ok(()))) => {
        event!(Level::INFO, launcher = %name, "Test runner completed.");
        continue;
      }
      Ok((name, Err(e))) => {
        event!(Level::WARN, launcher = %name, error = %e, "Test runner failed.");
        e
      }
      Err(join_err) => ConductorError::Internal(format!("test runner task failed: {}", join_err)),
    };

    // Siblings already executing are left to finish on their own.
    event!(
      Level::WARN,
      in_flight = in_flight.len(),
      never_started = queue.len(),
      "Abandoning remaining test runners."
    );
    in_flight.detach_all();
    return Err(failure);
  }
}
