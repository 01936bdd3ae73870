// conductor/src/lifecycle/registry.rs

//! The name-keyed registry of hook runners owned by one orchestrator run.

use crate::lifecycle::runner::HookRunner;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, Level};

/// At most one runner per hook name. Registering the same name again replaces
/// the previous runner.
#[derive(Default)]
pub struct HookRegistry {
  runners: Mutex<HashMap<String, Arc<HookRunner>>>,
}

impl HookRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `runner` under its hook name, returning the runner it replaced.
  pub fn insert(&self, runner: Arc<HookRunner>) -> Option<Arc<HookRunner>> {
    let name = runner.name().to_string();
    event!(Level::DEBUG, hook = %name, "Registering hook runner.");
    self.runners.lock().insert(name, runner)
  }

  pub fn get(&self, name: &str) -> Option<Arc<HookRunner>> {
    self.runners.lock().get(name).cloned()
  }

  pub fn len(&self) -> usize {
    self.runners.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.runners.lock().is_empty()
  }

  /// Stops every registered runner and waits until their commands are reaped.
  /// Safe to call when some already finished.
  pub async fn stop_all(&self) {
    // Snapshot first so nothing runs under the registry lock.
    let runners: Vec<Arc<HookRunner>> = self.runners.lock().values().cloned().collect();
    for runner in &runners {
      runner.stop();
    }
    for runner in &runners {
      runner.terminated().await;
    }
    event!(Level::DEBUG, count = runners.len(), "Hook runners stopped.");
  }
}
