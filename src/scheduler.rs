// src/scheduler.rs
//! Repeated runs on a fixed interval until shutdown.

use std::future::Future;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::time::MissedTickBehavior;

use crate::workflow::Workflow;

/// Run `job` immediately, then once per `every`, until `shutdown` resolves.
/// A run in progress is abandoned when shutdown fires. A run that overruns
/// the interval delays the next tick instead of bursting.
pub async fn run_until<F, Fut, S>(mut job: F, every: Duration, shutdown: S) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut runs = 0usize;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = &mut shutdown => break,
            _ = job() => {
                runs += 1;
                counter!("scheduler_runs_total").increment(1);
                gauge!("scheduler_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
            }
        }
    }
    tracing::info!(runs, "scheduler stopped");
    runs
}

/// Production loop: stops on Ctrl-C.
pub async fn run_forever(workflow: &Workflow, every: Duration) {
    tracing::info!(every_s = every.as_secs(), "scheduling workflow, press Ctrl+C to stop");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
        tracing::info!("interrupt received, shutting down");
    };
    run_until(
        || async move {
            let summary = workflow.run().await;
            if summary.status != crate::workflow::RunStatus::Completed {
                tracing::warn!(status = summary.status.label(), "scheduled run did not complete");
            }
        },
        every,
        shutdown,
    )
    .await;
}
