// conductor/src/runner/tap.rs

//! The `tap` protocol: run the launcher's command and report every TAP test
//! line it prints as its own result.

use crate::config::Launcher;
use crate::error::ConductorResult;
use crate::reporter::{Reporter, TestResult};
use crate::runner::process::{collect_lines, join_lines, spawn_launcher, timed_out, wait_with_timeout};
use crate::runner::TestRunner;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{event, instrument, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDirective {
  Skip,
  Todo,
}

/// One `ok` / `not ok` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapLine {
  pub ok: bool,
  pub number: Option<u32>,
  pub description: String,
  pub directive: Option<TapDirective>,
}

impl TapLine {
  /// Skipped tests and `not ok # TODO` count as skipped.
  pub fn into_result(self) -> TestResult {
    let name = if self.description.is_empty() {
      format!("test {}", self.number.unwrap_or(0))
    } else {
      self.description
    };
    match (self.ok, self.directive) {
      (_, Some(TapDirective::Skip)) | (false, Some(TapDirective::Todo)) => TestResult::skipped(name),
      (true, _) => TestResult::passed(name),
      (false, None) => TestResult::failed(name),
    }
  }
}

/// Parses a TAP test line. Plans, comments, YAML blocks and anything else give `None`.
pub fn parse_tap_line(line: &str) -> Option<TapLine> {
  let line = line.trim_start();
  let (ok, rest) = if let Some(rest) = line.strip_prefix("not ok") {
    (false, rest)
  } else if let Some(rest) = line.strip_prefix("ok") {
    (true, rest)
  } else {
    return None;
  };
  if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
    return None;
  }

  let rest = rest.trim_start();
  let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
  let number = rest[..digits].parse::<u32>().ok();
  let rest = rest[digits..].trim_start();
  let rest = rest.strip_prefix('-').unwrap_or(rest).trim_start();

  let (description, directive) = match rest.split_once('#') {
    Some((description, directive)) => (description.trim_end(), parse_directive(directive)),
    None => (rest.trim_end(), None),
  };

  Some(TapLine {
    ok,
    number,
    description: description.to_string(),
    directive,
  })
}

fn parse_directive(raw: &str) -> Option<TapDirective> {
  let word = raw.trim_start().get(..4)?.to_ascii_uppercase();
  match word.as_str() {
    "SKIP" => Some(TapDirective::Skip),
    "TODO" => Some(TapDirective::Todo),
    _ => None,
  }
}

/// Streams stdout through [`parse_tap_line`]. A command that exits non-zero
/// without printing any test line is reported as a single failure.
pub struct TapProcessTestRunner {
  launcher: Launcher,
  reporter: Arc<dyn Reporter>,
}

impl TapProcessTestRunner {
  pub fn new(launcher: Launcher, reporter: Arc<dyn Reporter>) -> Self {
    Self { launcher, reporter }
  }
}

#[async_trait]
impl TestRunner for TapProcessTestRunner {
  fn launcher(&self) -> &Launcher {
    &self.launcher
  }

  #[instrument(name = "TapProcessTestRunner::start", skip_all, fields(launcher = %self.launcher.name()))]
  async fn start(&self) -> ConductorResult<()> {
    let mut child = spawn_launcher(&self.launcher)?;
    let stderr = child.stderr.take().map(collect_lines);

    let parser = child.stdout.take().map(|stdout| {
      let reporter = self.reporter.clone();
      let name = self.launcher.name().to_string();
      tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut reported = 0usize;
        while let Ok(Some(line)) = lines.next_line().await {
          match parse_tap_line(&line) {
            Some(tap) => {
              reporter.report(&name, tap.into_result());
              reported += 1;
            }
            None => event!(Level::TRACE, launcher = %name, "{}", line),
          }
        }
        reported
      })
    });

    let Some(status) = wait_with_timeout(&mut child, &self.launcher).await? else {
      if let Some(parser) = parser {
        parser.abort();
      }
      self.reporter.report(self.launcher.name(), timed_out(&self.launcher));
      return Ok(());
    };

    let reported = match parser {
      Some(parser) => parser.await.unwrap_or(0),
      None => 0,
    };
    event!(Level::DEBUG, reported, status = %status, "TAP process exited.");

    if reported == 0 && !status.success() {
      let mut failed = TestResult::failed(self.launcher.name()).with_log(format!("exited with {}", status));
      failed.logs.extend(join_lines(stderr).await);
      self.reporter.report(self.launcher.name(), failed);
    }
    Ok(())
  }
}
