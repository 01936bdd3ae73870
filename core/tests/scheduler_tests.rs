// tests/scheduler_tests.rs
mod common;

use common::*;
use conductor::{run_bounded, ConductorError, TestRunner};
use std::sync::Arc;

fn runners(gauge: &Arc<Gauge>, delays_ms: &[u64]) -> Vec<Arc<dyn TestRunner>> {
  delays_ms
    .iter()
    .enumerate()
    .map(|(i, delay)| Arc::new(FakeRunner::new(&format!("r{}", i), *delay, gauge.clone())) as Arc<dyn TestRunner>)
    .collect()
}

#[tokio::test]
async fn test_never_more_than_limit_in_flight() {
  setup_tracing();
  let gauge = Arc::new(Gauge::default());
  let runners = runners(&gauge, &[30, 10, 20, 10, 30, 10, 20]);

  run_bounded(&runners, 3).await.unwrap();

  assert_eq!(gauge.max(), 3);
  assert_eq!(gauge.finished().len(), 7);
}

#[tokio::test]
async fn test_admission_is_fifo() {
  setup_tracing();
  let gauge = Arc::new(Gauge::default());
  let runners = runners(&gauge, &[40, 5, 5, 5, 5]);

  run_bounded(&runners, 2).await.unwrap();

  assert_eq!(gauge.started(), ["r0", "r1", "r2", "r3", "r4"]);
  // r0 is slow, so the short ones overtake it.
  assert_eq!(gauge.finished().last().map(String::as_str), Some("r0"));
}

#[tokio::test]
async fn test_limit_one_is_sequential() {
  setup_tracing();
  let gauge = Arc::new(Gauge::default());
  let runners = runners(&gauge, &[20, 5, 10]);

  run_bounded(&runners, 1).await.unwrap();

  assert_eq!(gauge.max(), 1);
  assert_eq!(gauge.started(), gauge.finished());
}

#[tokio::test]
async fn test_limit_above_count_runs_everything_at_once() {
  setup_tracing();
  let gauge = Arc::new(Gauge::default());
  let runners = runners(&gauge, &[20, 20, 20]);

  run_bounded(&runners, 10).await.unwrap();

  assert_eq!(gauge.max(), 3);
}

#[tokio::test]
async fn test_zero_limit_behaves_as_one() {
  setup_tracing();
  let gauge = Arc::new(Gauge::default());
  run_bounded(&runners(&gauge, &[5, 5]), 0).await.unwrap();
  assert_eq!(gauge.max(), 1);
}

#[tokio::test]
async fn test_empty_runner_list_succeeds() {
  run_bounded(&[], 4).await.unwrap();
}

#[tokio::test]
async fn test_first_failure_stops_admission() {
  setup_tracing();
  let gauge = Arc::new(Gauge::default());
  let runners: Vec<Arc<dyn TestRunner>> = vec![
    Arc::new(FakeRunner::new("fails", 5, gauge.clone()).failing()),
    Arc::new(FakeRunner::new("slow", 50, gauge.clone())),
    Arc::new(FakeRunner::new("queued", 5, gauge.clone())),
  ];

  let err = run_bounded(&runners, 2).await.unwrap_err();

  assert!(matches!(err, ConductorError::Internal(ref msg) if msg.contains("fails")));
  assert_eq!(gauge.started(), ["fails", "slow"]);

  // The in-flight sibling is detached, not aborted.
  tokio::time::sleep(std::time::Duration::from_millis(150)).await;
  assert!(gauge.finished().iter().any(|n| n == "slow"));
  assert!(!gauge.started().iter().any(|n| n == "queued"));
}
