// conductor/src/config.rs

//! Harness configuration: the launcher list, the concurrency limit and the
//! lifecycle hook commands.
//!
//! The orchestrator only sees the [`Configuration`] trait. [`HarnessConfig`] is the
//! JSON-backed implementation used by the demos and tests.

use crate::command::CommandLine;
use crate::error::{ConductorError, ConductorResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{event, Level};
use uuid::Uuid;

pub const CONFIG_PATH_ENV: &str = "CONDUCTOR_CONFIG";
pub const PARALLEL_ENV: &str = "CONDUCTOR_PARALLEL";
pub const DEFAULT_CONFIG_PATH: &str = "conductor.json";
/// Set on every launched command to the launcher's id.
pub const LAUNCHER_ID_ENV: &str = "CONDUCTOR_LAUNCHER_ID";
/// Replaced by the launcher's id in a launcher's command and args.
pub const LAUNCHER_ID_PLACEHOLDER: &str = "{id}";
const DEFAULT_WAIT_FOR_TEXT_TIMEOUT_MS: u64 = 10_000;

/// The names of the four lifecycle hooks, in the order the pipeline runs them.
pub const HOOK_NAMES: [&str; 4] = ["on_start", "before_tests", "after_tests", "on_exit"];

/// What the orchestrator reads from configuration.
#[async_trait]
pub trait Configuration: Send + Sync {
  /// The ordered launcher list. May be asynchronous, e.g. when launchers are probed.
  async fn launchers(&self) -> ConductorResult<Vec<Launcher>>;

  /// Maximum number of test runners executing at once. Always at least 1.
  fn parallel(&self) -> usize;

  /// The command configured for a lifecycle hook, if any.
  fn hook(&self, name: &str) -> Option<HookSpec>;

  /// How long to wait for the control channel to signal ready. `None` waits forever.
  fn channel_ready_timeout(&self) -> Option<Duration> {
    None
  }
}

/// One configured test environment as written in the config file.
///
/// `id` is the connection id an attaching client presents. It may be written in
/// the file; otherwise a fresh one is assigned once, when the file is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LauncherSpec {
  #[serde(default = "new_launcher_id")]
  pub id: String,
  pub name: String,
  /// Protocol tag: `process`, `browser` or `tap`. Kept as a string so an unknown
  /// tag is reported when runners are built, not when the file is parsed.
  pub protocol: String,
  #[serde(flatten)]
  pub command: CommandLine,
  #[serde(default)]
  pub timeout_ms: Option<u64>,
}

impl LauncherSpec {
  pub fn new(name: impl Into<String>, protocol: impl Into<String>, command: CommandLine) -> Self {
    Self {
      id: new_launcher_id(),
      name: name.into(),
      protocol: protocol.into(),
      command,
      timeout_ms: None,
    }
  }

  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = id.into();
    self
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_ms.map(Duration::from_millis)
  }
}

fn new_launcher_id() -> String {
  Uuid::new_v4().to_string()
}

/// A launcher resolved for one run: its spec plus the id an attaching client
/// must present. The id is the spec's, so resolving twice gives the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
  pub id: String,
  pub spec: LauncherSpec,
}

impl Launcher {
  pub fn new(spec: LauncherSpec) -> Self {
    Self {
      id: spec.id.clone(),
      spec,
    }
  }

  /// The launcher's command with [`LAUNCHER_ID_PLACEHOLDER`] replaced by its id.
  pub fn command(&self) -> CommandLine {
    self.spec.command.substitute(LAUNCHER_ID_PLACEHOLDER, &self.id)
  }

  pub fn name(&self) -> &str {
    &self.spec.name
  }

  pub fn protocol(&self) -> &str {
    &self.spec.protocol
  }
}

/// The command behind a lifecycle hook.
///
/// In the config file a hook is either a bare command string or an object with
/// `command` or `exe`/`args`, plus optional `wait_for_text`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "HookSpecRepr")]
pub struct HookSpec {
  pub command: CommandLine,
  /// When set, the hook is complete as soon as its output contains this text;
  /// the process keeps running until the hook runner is stopped.
  pub wait_for_text: Option<String>,
  pub wait_for_text_timeout: Duration,
}

impl HookSpec {
  pub fn new(command: CommandLine) -> Self {
    Self {
      command,
      wait_for_text: None,
      wait_for_text_timeout: Duration::from_millis(DEFAULT_WAIT_FOR_TEXT_TIMEOUT_MS),
    }
  }

  pub fn waiting_for(mut self, text: impl Into<String>, timeout: Duration) -> Self {
    self.wait_for_text = Some(text.into());
    self.wait_for_text_timeout = timeout;
    self
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HookSpecRepr {
  Shell(String),
  Detailed {
    #[serde(flatten)]
    command: CommandLine,
    #[serde(default)]
    wait_for_text: Option<String>,
    #[serde(default)]
    wait_for_text_timeout_ms: Option<u64>,
  },
}

impl From<HookSpecRepr> for HookSpec {
  fn from(repr: HookSpecRepr) -> Self {
    match repr {
      HookSpecRepr::Shell(command) => HookSpec::new(CommandLine::shell(command)),
      HookSpecRepr::Detailed {
        command,
        wait_for_text,
        wait_for_text_timeout_ms,
      } => HookSpec {
        command,
        wait_for_text,
        wait_for_text_timeout: Duration::from_millis(
          wait_for_text_timeout_ms.unwrap_or(DEFAULT_WAIT_FOR_TEXT_TIMEOUT_MS),
        ),
      },
    }
  }
}

/// JSON-backed harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HarnessConfig {
  #[serde(default = "default_parallel")]
  pub parallel: usize,
  #[serde(default)]
  pub channel_ready_timeout_ms: Option<u64>,
  #[serde(default)]
  pub launchers: Vec<LauncherSpec>,
  #[serde(default)]
  pub on_start: Option<HookSpec>,
  #[serde(default)]
  pub before_tests: Option<HookSpec>,
  #[serde(default)]
  pub after_tests: Option<HookSpec>,
  #[serde(default)]
  pub on_exit: Option<HookSpec>,
}

fn default_parallel() -> usize {
  1
}

impl Default for HarnessConfig {
  fn default() -> Self {
    Self {
      parallel: default_parallel(),
      channel_ready_timeout_ms: None,
      launchers: Vec::new(),
      on_start: None,
      before_tests: None,
      after_tests: None,
      on_exit: None,
    }
  }
}

impl HarnessConfig {
  pub fn from_json(json: &str) -> ConductorResult<Self> {
    let config: Self =
      serde_json::from_str(json).map_err(|e| ConductorError::InvalidConfig(format!("Malformed JSON: {}", e)))?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_file(path: impl AsRef<Path>) -> ConductorResult<Self> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| ConductorError::ConfigLoad {
      path: path.display().to_string(),
      source: e.into(),
    })?;
    let config = Self::from_json(&raw)?;
    event!(Level::INFO, path = %path.display(), launchers = config.launchers.len(), "Harness configuration loaded.");
    Ok(config)
  }

  /// Loads `.env` if present, reads the file named by `CONDUCTOR_CONFIG`
  /// (default `conductor.json`) and applies the `CONDUCTOR_PARALLEL` override.
  pub fn from_env() -> ConductorResult<Self> {
    dotenvy::dotenv().ok();

    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = Self::from_file(&path)?;

    if let Ok(raw) = std::env::var(PARALLEL_ENV) {
      config.parallel = raw
        .trim()
        .parse::<usize>()
        .map_err(|e| ConductorError::InvalidConfig(format!("Invalid {}: {}", PARALLEL_ENV, e)))?;
      config.validate()?;
    }
    Ok(config)
  }

  pub fn validate(&self) -> ConductorResult<()> {
    if self.parallel == 0 {
      return Err(ConductorError::InvalidConfig("parallel must be at least 1".to_string()));
    }
    let mut ids = std::collections::HashSet::new();
    for (idx, launcher) in self.launchers.iter().enumerate() {
      if launcher.name.trim().is_empty() {
        return Err(ConductorError::InvalidConfig(format!("launcher #{} has no name", idx)));
      }
      if launcher.id.trim().is_empty() || !ids.insert(launcher.id.as_str()) {
        return Err(ConductorError::InvalidConfig(format!(
          "launcher '{}' has an empty or duplicate id '{}'",
          launcher.name, launcher.id
        )));
      }
      // Browsers may be started by someone else and only attach to the channel.
      if launcher.protocol != "browser" && launcher.command.is_empty() {
        return Err(ConductorError::InvalidConfig(format!(
          "launcher '{}' has neither command nor exe",
          launcher.name
        )));
      }
    }
    Ok(())
  }
}

#[async_trait]
impl Configuration for HarnessConfig {
  async fn launchers(&self) -> ConductorResult<Vec<Launcher>> {
    Ok(self.launchers.iter().cloned().map(Launcher::new).collect())
  }

  fn parallel(&self) -> usize {
    self.parallel
  }

  fn hook(&self, name: &str) -> Option<HookSpec> {
    match name {
      "on_start" => self.on_start.clone(),
      "before_tests" => self.before_tests.clone(),
      "after_tests" => self.after_tests.clone(),
      "on_exit" => self.on_exit.clone(),
      _ => None,
    }
  }

  fn channel_ready_timeout(&self) -> Option<Duration> {
    self.channel_ready_timeout_ms.map(Duration::from_millis)
  }
}
