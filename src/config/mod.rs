// src/config/mod.rs
//! Process settings from the environment (`.env` honoured via dotenvy in the binary).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::analyze::ai_adapter::{DEFAULT_OLLAMA_URL, DEFAULT_WORKER_TIMEOUT};
use crate::error::ConfigError;
use crate::fanout::ExecMode;
use crate::ingest::DEFAULT_FEED_TIMEOUT;
use crate::limiter::{DEFAULT_MAX_PER_DOMAIN, DEFAULT_PACING_MS};
use crate::pipeline::team::DEFAULT_TEAM_PATH;

pub const DEFAULT_MODEL: &str = "gpt-oss:20b";
pub const DEFAULT_REPORT_DIR: &str = "reports";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ollama_base_url: String,
    pub default_model: String,
    pub team_config_path: PathBuf,
    pub discord_webhook_url: Option<String>,
    pub run_once: bool,
    pub schedule_interval: Duration,
    pub exec_mode: ExecMode,
    pub max_per_domain: usize,
    pub pacing_ms: (u64, u64),
    pub feed_timeout: Duration,
    pub worker_timeout: Duration,
    pub fixer_api_key: Option<String>,
    pub report_dir: PathBuf,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_OLLAMA_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            team_config_path: PathBuf::from(DEFAULT_TEAM_PATH),
            discord_webhook_url: None,
            run_once: true,
            schedule_interval: Duration::from_secs(3600),
            exec_mode: ExecMode::Concurrent,
            max_per_domain: DEFAULT_MAX_PER_DOMAIN,
            pacing_ms: DEFAULT_PACING_MS,
            feed_timeout: DEFAULT_FEED_TIMEOUT,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            fixer_api_key: None,
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut s = Settings::default();

        if let Some(v) = get("OLLAMA_BASE_URL") {
            url::Url::parse(&v).map_err(|e| invalid("OLLAMA_BASE_URL", &v, &e.to_string()))?;
            s.ollama_base_url = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            s.default_model = v;
        }
        if let Some(v) = get("TEAM_CONFIG_PATH") {
            s.team_config_path = PathBuf::from(v);
        }
        s.discord_webhook_url = get("DISCORD_WEBHOOK_URL");
        if let Some(v) = get("RUN_ONCE") {
            s.run_once = parse_flag("RUN_ONCE", &v)?;
        }
        if let Some(v) = get("SCHEDULE_INTERVAL_HOURS") {
            let hours: u64 = parse_num("SCHEDULE_INTERVAL_HOURS", &v)?;
            if hours == 0 {
                return Err(invalid("SCHEDULE_INTERVAL_HOURS", &v, "must be at least 1"));
            }
            s.schedule_interval = Duration::from_secs(hours * 3600);
        }
        if let Some(v) = get("SEQUENTIAL_MODE") {
            s.exec_mode = ExecMode::from_sequential_flag(parse_flag("SEQUENTIAL_MODE", &v)?);
        }
        if let Some(v) = get("MAX_PER_DOMAIN") {
            let n: usize = parse_num("MAX_PER_DOMAIN", &v)?;
            if n == 0 {
                return Err(invalid("MAX_PER_DOMAIN", &v, "must be at least 1"));
            }
            s.max_per_domain = n;
        }
        if let Some(v) = get("PACING_MS") {
            s.pacing_ms = parse_range("PACING_MS", &v)?;
        }
        if let Some(v) = get("FEED_TIMEOUT_SECS") {
            s.feed_timeout = parse_timeout("FEED_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("WORKER_TIMEOUT_SECS") {
            s.worker_timeout = parse_timeout("WORKER_TIMEOUT_SECS", &v)?;
        }
        s.fixer_api_key = get("FIXER_API_KEY");
        if let Some(v) = get("REPORT_DIR") {
            s.report_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            s.log_level = v.to_ascii_lowercase();
        }
        if let Some(v) = get("LOG_FORMAT") {
            s.log_format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" | "text" | "pretty" => LogFormat::Compact,
                _ => return Err(invalid("LOG_FORMAT", &v, "expected json or compact")),
            };
        }

        Ok(s)
    }
}

fn invalid(key: &str, value: &str, why: &str) -> ConfigError {
    ConfigError::Invalid(format!("{key}={value:?}: {why}"))
}

fn parse_flag(key: &str, v: &str) -> Result<bool, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, v, "expected a boolean")),
    }
}

fn parse_num<T>(key: &str, v: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    v.parse::<T>().map_err(|e| invalid(key, v, &e.to_string()))
}

/// Whole seconds; zero would fail every request.
fn parse_timeout(key: &str, v: &str) -> Result<Duration, ConfigError> {
    match parse_num::<u64>(key, v)? {
        0 => Err(invalid(key, v, "must be at least 1")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// `"100-300"` or a single `"200"`.
fn parse_range(key: &str, v: &str) -> Result<(u64, u64), ConfigError> {
    match v.split_once('-') {
        Some((lo, hi)) => Ok((parse_num(key, lo.trim())?, parse_num(key, hi.trim())?)),
        None => {
            let n = parse_num(key, v)?;
            Ok((n, n))
        }
    }
}
