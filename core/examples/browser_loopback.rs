// conductor/examples/browser_loopback.rs

//! A browser launcher fed by an in-process client instead of a real browser.
//! The client logs in with the launcher's id, reports a few results and says
//! it is done. The process exit is recorded so the report can be printed.

use conductor::{
  ClientMessage, ConductorError, HarnessConfig, LoopbackChannel, Orchestrator, ProcessExit, TapReporter, TestResult,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Default)]
struct KeepAlive(Mutex<Option<i32>>);

impl ProcessExit for KeepAlive {
  fn exit(&self, code: i32) {
    *self.0.lock() = Some(code);
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ConductorError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Browser Loopback Example ---");

  let config = Arc::new(HarnessConfig::from_json(
    r#"{ "launchers": [{ "name": "headless", "protocol": "browser", "timeout_ms": 5000 }] }"#,
  )?);
  // Ids are assigned when the file is parsed, so the client knows which one to present.
  let launcher_id = config.launchers[0].id.clone();

  let channel = Arc::new(LoopbackChannel::new());
  let exit = Arc::new(KeepAlive::default());
  let orchestrator = Orchestrator::builder(config, channel.clone())
    .reporter(Arc::new(TapReporter::stdout()))
    .process_exit(exit.clone())
    .build();

  let client = {
    let channel = channel.clone();
    tokio::spawn(async move {
      while channel.subscriber_count() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
      let tx = channel.connect("HeadlessChrome 120", launcher_id);
      for (name, ok) in [("loads page", true), ("clicks button", true), ("submits form", false)] {
        let result = if ok {
          TestResult::passed(name)
        } else {
          TestResult::failed(name).with_log("expected 201, got 500")
        };
        if tx.send(ClientMessage::Result(result)).is_err() {
          warn!("Runner went away.");
          return;
        }
      }
      let _ = tx.send(ClientMessage::Done);
    })
  };

  let report = orchestrator.start().await;
  let _ = client.await;
  info!(
    stages = report.completed_stages.len(),
    exit_code = ?exit.0.lock(),
    source = ?report.exit_source,
    "Run finished."
  );
  Ok(())
}

