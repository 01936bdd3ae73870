// conductor/src/error.rs
use anyhow::Error as AnyhowError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConductorError {
  #[error("Don't know about '{protocol}' protocol (launcher '{launcher}')")]
  UnknownProtocol { launcher: String, protocol: String },

  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("Failed to load configuration from '{path}'. Source: {source}")]
  ConfigLoad {
    path: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Control channel failed to start. Source: {source}")]
  ChannelStart {
    #[source]
    source: AnyhowError,
  },

  #[error("Control channel event bus closed before it signalled ready")]
  ChannelClosed,

  #[error("Control channel not ready after {timeout:?}")]
  ChannelReadyTimeout { timeout: Duration },

  #[error("Failed to spawn hook '{hook}'. Source: {source}")]
  HookSpawn {
    hook: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Hook '{hook}' failed: {status}")]
  HookFailed { hook: String, status: String },

  #[error("Hook '{hook}' did not print '{text}' within {timeout:?}")]
  HookTimeout { hook: String, text: String, timeout: Duration },

  #[error("Hook '{hook}' was stopped before it completed")]
  HookStopped { hook: String },

  #[error("Failed to spawn launcher '{launcher}'. Source: {source}")]
  RunnerSpawn {
    launcher: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Launcher '{launcher}' timed out after {timeout:?}")]
  RunnerTimeout { launcher: String, timeout: Duration },

  #[error("Client for launcher '{launcher}' disconnected before reporting all results")]
  ClientDisconnected { launcher: String },

  #[error("Stage has no handlers: {stage}")]
  StageMissing { stage: String },

  #[error("Error in stage handler or external operation. Source: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal conductor error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for ConductorError {
  fn from(err: AnyhowError) -> Self {
    // Unwrap a ConductorError that was carried through anyhow instead of nesting it.
    match err.downcast::<ConductorError>() {
      Ok(inner) => inner,
      Err(err) => ConductorError::HandlerError { source: err },
    }
  }
}

pub type ConductorResult<T, E = ConductorError> = std::result::Result<T, E>;
