// tests/fanout.rs
use std::time::Duration;

use forex_squawk::{ExecMode, FanOutExecutor, TaskError};

async fn delayed(value: usize, delay_ms: u64, fail: bool) -> Result<usize, TaskError> {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    if fail {
        Err(TaskError::BadResponse(format!("op {value} failed")))
    } else {
        Ok(value)
    }
}

#[tokio::test(start_paused = true)]
async fn results_follow_input_order_under_reversed_completion() {
    // Later ops finish first.
    let ops: Vec<_> = (0..6usize)
        .map(|i| move || delayed(i, 600 - 100 * i as u64, false))
        .collect();
    let out = FanOutExecutor::new(ExecMode::Concurrent).run(ops).await;
    let values: Vec<usize> = out.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_mode_overlaps_operations() {
    let started = tokio::time::Instant::now();
    let ops: Vec<_> = (0..4usize).map(|i| move || delayed(i, 1000, false)).collect();
    FanOutExecutor::new(ExecMode::Concurrent).run(ops).await;
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn sequential_mode_runs_one_at_a_time() {
    let started = tokio::time::Instant::now();
    let ops: Vec<_> = (0..4usize).map(|i| move || delayed(i, 1000, false)).collect();
    let out = FanOutExecutor::new(ExecMode::Sequential).run(ops).await;
    assert!(started.elapsed() >= Duration::from_millis(4000));
    assert_eq!(out.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn failures_stay_in_their_slot() {
    let ops: Vec<_> = (0..5usize)
        .map(|i| move || delayed(i, 50 * (5 - i as u64), i % 2 == 1))
        .collect();
    let out = FanOutExecutor::new(ExecMode::Concurrent).run(ops).await;
    let ok: Vec<usize> = out.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(ok, vec![0, 2, 4]);
    assert!(matches!(&out[1], Err(TaskError::BadResponse(m)) if m.contains("op 1")));
    assert!(out[3].is_err());
}
