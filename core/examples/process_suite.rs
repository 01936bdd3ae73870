// conductor/examples/process_suite.rs

//! Runs two process launchers and a TAP launcher through the full lifecycle and
//! exits with the run's status. Set `RUST_LOG=conductor=debug` for stage logs.

use conductor::{HarnessConfig, LoopbackChannel, Orchestrator, TapReporter};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{
  "parallel": 2,
  "on_start": "echo preparing fixtures",
  "after_tests": { "exe": "echo", "args": ["collecting coverage"] },
  "launchers": [
    { "name": "unit", "protocol": "process", "command": "echo running unit tests" },
    { "name": "lint", "protocol": "process", "command": "echo lint ok", "timeout_ms": 5000 },
    { "name": "tap", "protocol": "tap", "command": "printf '1..3\\nok 1 - parses\\nok 2 - renders # SKIP no display\\nok 3 - saves\\n'" }
  ]
}"#;

#[tokio::main]
async fn main() -> Result<(), conductor::ConductorError> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();
  info!("--- Process Suite Example ---");

  let config = HarnessConfig::from_json(CONFIG)?;
  let orchestrator = Orchestrator::builder(Arc::new(config), Arc::new(LoopbackChannel::new()))
    .reporter(Arc::new(TapReporter::stdout()))
    .build();

  // With the default process exit this never returns.
  let report = orchestrator.start().await;
  info!(?report, "Run finished without exiting.");
  Ok(())
}
