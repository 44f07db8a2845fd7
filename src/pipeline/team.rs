// src/pipeline/team.rs
//! Team topology loader.
//!
//! The document lists tiers in execution order, each tagged with an explicit
//! `kind`. Any failure here is fatal at startup.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::pipeline::types::{Tier, TierKind, WorkerProfile};

pub const DEFAULT_TEAM_PATH: &str = "config/team.json";

#[derive(Debug, Clone, PartialEq)]
pub struct TeamConfig {
    pub version: Option<String>,
    pub tiers: Vec<Tier>,
}

impl TeamConfig {
    pub fn worker_count(&self) -> usize {
        self.tiers.iter().map(|t| t.workers.len()).sum()
    }

    pub fn tiers_of(&self, kind: TierKind) -> impl Iterator<Item = &Tier> {
        self.tiers.iter().filter(move |t| t.kind == kind)
    }
}

#[derive(Deserialize)]
struct RawTeam {
    #[serde(default)]
    config_info: Option<RawInfo>,
    tiers: Vec<RawTier>,
}

#[derive(Deserialize)]
struct RawInfo {
    version: Option<String>,
}

#[derive(Deserialize)]
struct RawTier {
    name: String,
    kind: TierKind,
    abort_if_all_fail: Option<bool>,
    #[serde(default)]
    workers: Vec<RawWorker>,
}

#[derive(Deserialize)]
struct RawWorker {
    name: String,
    role: String,
    #[serde(default)]
    focus_area: Option<String>,
    #[serde(default)]
    model: Option<String>,
    temperature: f32,
    system_prompt: String,
}

/// Read and validate a topology file. `default_target` fills workers without a `model`.
pub fn load_team(path: &Path, default_target: &str) -> Result<TeamConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_team(&content, default_target).map_err(|e| match e {
        ConfigError::Invalid(message) => ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

pub fn parse_team(content: &str, default_target: &str) -> Result<TeamConfig, ConfigError> {
    let raw: RawTeam =
        serde_json::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))?;

    if raw.tiers.is_empty() {
        return Err(ConfigError::Invalid("topology declares no tiers".into()));
    }

    let mut seen = HashSet::new();
    let mut tiers = Vec::with_capacity(raw.tiers.len());
    for (pos, t) in raw.tiers.into_iter().enumerate() {
        let name = t.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::Invalid(format!("tier #{pos} has an empty name")));
        }
        if !seen.insert(name.clone()) {
            return Err(ConfigError::Invalid(format!("duplicate tier name '{name}'")));
        }
        if pos == 0 && (t.kind != TierKind::Base || t.workers.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "first tier '{name}' must be a base tier with at least one worker"
            )));
        }

        let mut workers = Vec::with_capacity(t.workers.len());
        for w in t.workers {
            let wname = w.name.trim();
            if wname.is_empty() {
                return Err(ConfigError::Invalid(format!("tier '{name}' has a worker without a name")));
            }
            if !(0.0..=2.0).contains(&w.temperature) {
                return Err(ConfigError::Invalid(format!(
                    "worker '{wname}' temperature {} outside 0.0..=2.0",
                    w.temperature
                )));
            }
            if w.system_prompt.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("worker '{wname}' has an empty system_prompt")));
            }
            workers.push(WorkerProfile {
                name: wname.to_string(),
                role: w.role.trim().to_string(),
                focus_area: w.focus_area.filter(|f| !f.trim().is_empty()),
                target: w
                    .model
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| default_target.to_string()),
                temperature: w.temperature,
                instructions: w.system_prompt,
            });
        }

        tiers.push(Tier {
            // Base tiers are fatal when empty; later tiers fall back by default.
            abort_if_all_fail: t.abort_if_all_fail.unwrap_or(t.kind == TierKind::Base),
            name,
            kind: t.kind,
            workers,
        });
    }

    Ok(TeamConfig {
        version: raw.config_info.and_then(|i| i.version),
        tiers,
    })
}
