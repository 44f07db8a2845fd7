// src/pipeline/mod.rs
//! Tiered fan-out pipeline.
//!
//! Each tier's workers run through the `FanOutExecutor`; survivors (in
//! configured order) are aggregated into the next tier's input. Worker
//! failures are logged and dropped. A tier only stops the run when all of its
//! workers fail and it is flagged `abort_if_all_fail`.

pub mod team;
pub mod types;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::analyze::{build_prompt, DynWorkerClient, PromptVars, WorkerRequest};
use crate::error::{PipelineError, TaskError};
use crate::fanout::{ExecMode, FanOutExecutor};

pub use team::{load_team, TeamConfig};
pub use types::{aggregate, PipelineOutcome, Tier, TierKind, TierRecord, TierResult, WorkerProfile};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_worker_calls_total", "Worker calls attempted.");
        describe_counter!("pipeline_worker_failures_total", "Worker calls that failed.");
        describe_counter!("pipeline_tiers_skipped_total", "Tiers configured without workers.");
        describe_counter!("pipeline_tier_exhausted_total", "Runs aborted by an exhausted tier.");
    });
}

pub struct TieredPipeline {
    client: DynWorkerClient,
    executor: FanOutExecutor,
    vars: PromptVars,
}

impl TieredPipeline {
    /// `mode` applies to every tier; there is no per-tier override.
    pub fn new(client: DynWorkerClient, mode: ExecMode) -> Self {
        Self {
            client,
            executor: FanOutExecutor::new(mode),
            vars: PromptVars::new(),
        }
    }

    /// Value substituted for `{{name}}` in every worker's instructions.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn mode(&self) -> ExecMode {
        self.executor.mode()
    }

    /// Run `tiers` in order, starting from `initial`.
    ///
    /// A tier configured with no workers is skipped and a tier that produced
    /// nothing (without the abort flag) leaves the previous results current, so
    /// the outcome always ends on the last tier that actually produced output.
    pub async fn run(
        &self,
        initial: serde_json::Value,
        tiers: &[Tier],
    ) -> Result<PipelineOutcome, PipelineError> {
        ensure_metrics_described();

        let mut input = initial;
        let mut records = Vec::with_capacity(tiers.len());

        for tier in tiers {
            if tier.workers.is_empty() {
                tracing::warn!(tier = %tier.name, kind = tier.kind.label(), "tier has no workers configured, skipping");
                counter!("pipeline_tiers_skipped_total").increment(1);
                records.push(TierRecord {
                    tier: tier.name.clone(),
                    kind: tier.kind,
                    attempted: 0,
                    failed: 0,
                    results: Vec::new(),
                });
                continue;
            }

            let record = self.run_tier(tier, &input).await;
            tracing::info!(
                tier = %tier.name,
                kind = tier.kind.label(),
                succeeded = record.succeeded(),
                failed = record.failed,
                "tier finished"
            );

            if record.results.is_empty() {
                if tier.abort_if_all_fail {
                    counter!("pipeline_tier_exhausted_total").increment(1);
                    tracing::error!(tier = %tier.name, failed = record.failed, "tier exhausted, aborting run");
                    return Err(PipelineError::TierExhausted {
                        tier: tier.name.clone(),
                        succeeded: 0,
                        failed: record.failed,
                    });
                }
                tracing::warn!(tier = %tier.name, "tier produced nothing, keeping previous results");
            } else {
                input = aggregate(&record.results);
            }
            records.push(record);
        }

        let outcome = PipelineOutcome { tiers: records };
        match outcome.final_record() {
            None => Err(PipelineError::NothingRan),
            Some(fin) => {
                if outcome.degraded() {
                    tracing::warn!(final_tier = %fin.tier, "pipeline output falls back to an earlier tier");
                }
                Ok(outcome)
            }
        }
    }

    async fn run_tier(&self, tier: &Tier, input: &serde_json::Value) -> TierRecord {
        let ops: Vec<_> = tier
            .workers
            .iter()
            .enumerate()
            .map(|(idx, worker)| move || self.call_worker(idx, worker, input))
            .collect();
        counter!("pipeline_worker_calls_total").increment(ops.len() as u64);

        let outcomes = self.executor.run(ops).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut failed = 0usize;
        for (worker, outcome) in tier.workers.iter().zip(outcomes) {
            match outcome {
                Ok(r) => results.push(r),
                Err(e) => {
                    failed += 1;
                    counter!("pipeline_worker_failures_total").increment(1);
                    tracing::warn!(tier = %tier.name, worker = %worker.name, error = %e, "worker failed");
                }
            }
        }

        TierRecord {
            tier: tier.name.clone(),
            kind: tier.kind,
            attempted: tier.workers.len(),
            failed,
            results,
        }
    }

    async fn call_worker(
        &self,
        idx: usize,
        worker: &WorkerProfile,
        input: &serde_json::Value,
    ) -> Result<TierResult, TaskError> {
        let req = WorkerRequest {
            target: worker.target.clone(),
            temperature: worker.temperature,
            prompt: build_prompt(&worker.instructions, input, &self.vars),
        };
        let t0 = std::time::Instant::now();
        let output = self.client.complete(&req).await?;
        tracing::debug!(
            worker = %worker.name,
            target = %worker.target,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = output.len(),
            "worker complete"
        );
        Ok(TierResult {
            worker_name: worker.name.clone(),
            role: worker.role.clone(),
            output,
            original_index: idx,
        })
    }
}
