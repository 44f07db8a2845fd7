// src/fanout.rs
//! Fan-out / fan-in over independent async operations.
//!
//! `result[i]` always belongs to `ops[i]`, whatever order the operations
//! actually finish in. A failing (or panicking) operation only occupies its own
//! slot; siblings keep running.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::{join_all, FutureExt};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Start everything at once and join.
    #[default]
    Concurrent,
    /// One at a time, in list order. For backends that cannot take overlapping requests.
    Sequential,
}

impl ExecMode {
    pub fn from_sequential_flag(sequential: bool) -> Self {
        if sequential {
            ExecMode::Sequential
        } else {
            ExecMode::Concurrent
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FanOutExecutor {
    mode: ExecMode,
}

impl FanOutExecutor {
    pub fn new(mode: ExecMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// Run `ops` and return one outcome per op, aligned by position.
    pub async fn run<T, F, Fut>(&self, ops: Vec<F>) -> Vec<Result<T, TaskError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        match self.mode {
            ExecMode::Concurrent => {
                join_all(ops.into_iter().map(|op| guarded(async move { op().await }))).await
            }
            ExecMode::Sequential => {
                let mut out = Vec::with_capacity(ops.len());
                for op in ops {
                    out.push(guarded(async move { op().await }).await);
                }
                out
            }
        }
    }
}

/// Per-task boundary: a panic becomes `TaskError::Panicked` in this slot only.
/// The op closure itself is called inside the boundary, so a panic before the
/// first await is caught as well.
async fn guarded<T, Fut>(fut: Fut) -> Result<T, TaskError>
where
    Fut: Future<Output = Result<T, TaskError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(panic = %msg, "fan-out task panicked");
            Err(TaskError::Panicked(msg))
        }
    }
}
