// src/pipeline/types.rs
use serde::{Deserialize, Serialize};

/// Explicit tier tag, set when the topology is loaded. Never inferred from names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Base,
    Synthesis,
    Review,
}

impl TierKind {
    pub fn label(self) -> &'static str {
        match self {
            TierKind::Base => "base",
            TierKind::Synthesis => "synthesis",
            TierKind::Review => "review",
        }
    }
}

/// One unit of work within a tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerProfile {
    pub name: String,
    pub role: String,
    pub focus_area: Option<String>,
    /// Remote model identifier.
    pub target: String,
    pub temperature: f32,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tier {
    pub name: String,
    pub kind: TierKind,
    pub abort_if_all_fail: bool,
    pub workers: Vec<WorkerProfile>,
}

/// A surviving worker output. `original_index` is the worker's position in the
/// tier's configured list, not its completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierResult {
    pub worker_name: String,
    pub role: String,
    pub output: String,
    pub original_index: usize,
}

/// What happened in one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierRecord {
    pub tier: String,
    pub kind: TierKind,
    pub attempted: usize,
    pub failed: usize,
    pub results: Vec<TierResult>,
}

impl TierRecord {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    /// Configured with no workers at all.
    pub fn skipped(&self) -> bool {
        self.attempted == 0
    }
}

/// All tier records in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub tiers: Vec<TierRecord>,
}

impl PipelineOutcome {
    /// Last tier that produced at least one result.
    pub fn final_record(&self) -> Option<&TierRecord> {
        self.tiers.iter().rev().find(|t| !t.results.is_empty())
    }

    pub fn results(&self) -> &[TierResult] {
        self.final_record().map(|t| t.results.as_slice()).unwrap_or(&[])
    }

    /// Text for delivery: a lone result verbatim, several results as labelled blocks.
    pub fn final_text(&self) -> String {
        match self.results() {
            [] => String::new(),
            [only] => only.output.clone(),
            many => many
                .iter()
                .map(|r| format!("**{}** ({})\n{}", r.worker_name, r.role, r.output))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    /// True when the last configured tier is not the one that produced the output.
    pub fn degraded(&self) -> bool {
        match (self.tiers.last(), self.final_record()) {
            (Some(last), Some(fin)) => last.tier != fin.tier,
            _ => false,
        }
    }
}

/// `{"data": [{agent, role, output}]}`, the next tier's input.
pub fn aggregate(results: &[TierResult]) -> serde_json::Value {
    let data: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "agent": r.worker_name,
                "role": r.role,
                "output": r.output,
            })
        })
        .collect();
    serde_json::json!({ "data": data })
}
