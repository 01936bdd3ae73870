// conductor/src/reporter.rs

//! The result sink shared by every test runner, and the TAP implementation of it.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{event, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  Passed,
  Failed,
  Skipped,
}

/// One test result as submitted by a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
  pub name: String,
  pub verdict: Verdict,
  /// Free-form diagnostics (captured output, failure message).
  pub logs: Vec<String>,
}

impl TestResult {
  pub fn passed(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      verdict: Verdict::Passed,
      logs: Vec::new(),
    }
  }

  pub fn failed(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      verdict: Verdict::Failed,
      logs: Vec::new(),
    }
  }

  pub fn skipped(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      verdict: Verdict::Skipped,
      logs: Vec::new(),
    }
  }

  pub fn with_log(mut self, line: impl Into<String>) -> Self {
    self.logs.push(line.into());
    self
  }
}

/// Totals produced when the reporter is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub skipped: usize,
}

impl Summary {
  pub fn is_success(&self) -> bool {
    self.failed == 0
  }
}

/// Accumulates results from all runners. Must accept concurrent `report` calls.
pub trait Reporter: Send + Sync {
  fn report(&self, launcher: &str, result: TestResult);

  /// Finalizes the report. Emits output on the first call only; later calls
  /// return the same totals.
  fn finish(&self) -> Summary;
}

/// Writes a TAP report once all results are in.
pub struct TapReporter {
  results: Mutex<Vec<(String, TestResult)>>,
  out: Mutex<Box<dyn Write + Send>>,
  finished: AtomicBool,
}

impl TapReporter {
  pub fn stdout() -> Self {
    Self::with_writer(std::io::stdout())
  }

  pub fn with_writer(out: impl Write + Send + 'static) -> Self {
    Self {
      results: Mutex::new(Vec::new()),
      out: Mutex::new(Box::new(out)),
      finished: AtomicBool::new(false),
    }
  }

  /// Results reported so far, in arrival order.
  pub fn results(&self) -> Vec<(String, TestResult)> {
    self.results.lock().clone()
  }

  pub fn summary(&self) -> Summary {
    let results = self.results.lock();
    results.iter().fold(Summary::default(), |mut acc, (_, r)| {
      acc.total += 1;
      match r.verdict {
        Verdict::Passed => acc.passed += 1,
        Verdict::Failed => acc.failed += 1,
        Verdict::Skipped => acc.skipped += 1,
      }
      acc
    })
  }

  fn render(&self, summary: &Summary) -> String {
    let results = self.results.lock();
    let mut tap = String::from("TAP version 13\n");
    for (idx, (launcher, result)) in results.iter().enumerate() {
      let status = match result.verdict {
        Verdict::Failed => "not ok",
        Verdict::Passed | Verdict::Skipped => "ok",
      };
      tap.push_str(&format!("{} {} - {} - {}", status, idx + 1, launcher, result.name));
      if result.verdict == Verdict::Skipped {
        tap.push_str(" # SKIP");
      }
      tap.push('\n');
      if result.verdict == Verdict::Failed {
        for line in &result.logs {
          tap.push_str(&format!("    # {}\n", line));
        }
      }
    }
    tap.push_str(&format!("\n1..{}\n", summary.total));
    tap.push_str(&format!("# tests {}\n", summary.total));
    tap.push_str(&format!("# pass  {}\n", summary.passed));
    tap.push_str(&format!("# skip  {}\n", summary.skipped));
    tap.push_str(&format!("# fail  {}\n", summary.failed));
    if summary.is_success() {
      tap.push_str("\n# ok\n");
    }
    tap
  }
}

impl Reporter for TapReporter {
  fn report(&self, launcher: &str, result: TestResult) {
    event!(Level::DEBUG, launcher, test = %result.name, verdict = ?result.verdict, "Result reported.");
    self.results.lock().push((launcher.to_string(), result));
  }

  fn finish(&self) -> Summary {
    let summary = self.summary();
    if self.finished.swap(true, Ordering::SeqCst) {
      return summary;
    }
    let tap = self.render(&summary);
    let mut out = self.out.lock();
    if let Err(e) = out.write_all(tap.as_bytes()).and_then(|_| out.flush()) {
      event!(Level::ERROR, error = %e, "Failed to write TAP report.");
    }
    event!(
      Level::INFO,
      total = summary.total,
      passed = summary.passed,
      failed = summary.failed,
      skipped = summary.skipped,
      "Report finished."
    );
    summary
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[derive(Clone, Default)]
  struct SharedBuf(Arc<Mutex<Vec<u8>>>);

  impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn finish_writes_tap_once() {
    let buf = SharedBuf::default();
    let reporter = TapReporter::with_writer(buf.clone());
    reporter.report("unit", TestResult::passed("adds"));
    reporter.report("unit", TestResult::failed("subtracts").with_log("expected 1, got 2"));
    reporter.report("tap", TestResult::skipped("later"));

    let summary = reporter.finish();
    assert_eq!(
      summary,
      Summary {
        total: 3,
        passed: 1,
        failed: 1,
        skipped: 1
      }
    );
    assert!(!summary.is_success());

    let first = String::from_utf8(buf.0.lock().clone()).unwrap();
    assert!(first.contains("ok 1 - unit - adds"));
    assert!(first.contains("not ok 2 - unit - subtracts"));
    assert!(first.contains("# expected 1, got 2"));
    assert!(first.contains("ok 3 - tap - later # SKIP"));
    assert!(first.contains("1..3"));

    assert_eq!(reporter.finish(), summary);
    assert_eq!(buf.0.lock().len(), first.len());
  }

  #[test]
  fn concurrent_reports_are_all_kept() {
    let reporter = Arc::new(TapReporter::with_writer(std::io::sink()));
    let handles: Vec<_> = (0..8)
      .map(|t| {
        let reporter = reporter.clone();
        std::thread::spawn(move || {
          for i in 0..50 {
            reporter.report(&format!("l{}", t), TestResult::passed(format!("t{}", i)));
          }
        })
      })
      .collect();
    for h in handles {
      h.join().unwrap();
    }
    assert_eq!(reporter.summary().passed, 400);
  }
}
