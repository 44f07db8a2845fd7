// src/error.rs
//! Error taxonomy shared by the collector, the tiered pipeline and delivery.
//!
//! Per-operation failures (`TaskError`) are caught at the fan-out boundary and
//! never cross a tier. Only `PipelineError` and `ConfigError` reach the
//! top-level caller.

use std::path::PathBuf;

/// Outcome of one failed unit of work inside a fan-out.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    /// Timeout or connection failure on a single remote call.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// The remote answered, but with something we cannot use.
    #[error("unusable response: {0}")]
    BadResponse(String),

    /// The operation panicked; caught at the task boundary.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Classify a reqwest failure: timeouts and connect errors are transient.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            TaskError::TransientIo(err.to_string())
        } else {
            TaskError::BadResponse(err.to_string())
        }
    }
}

/// Fatal pipeline outcomes surfaced to the orchestration layer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("tier '{tier}' produced no results ({succeeded} succeeded, {failed} failed)")]
    TierExhausted {
        tier: String,
        succeeded: usize,
        failed: usize,
    },

    #[error("no tier produced any results")]
    NothingRan,
}

/// Startup configuration failures (fatal, no run attempted).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Outbound notification failure. Logged; the run still counts as complete.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Request(String),

    #[error("webhook returned HTTP {0}")]
    Status(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_exhausted_reports_counts() {
        let err = PipelineError::TierExhausted {
            tier: "junior_analysts".into(),
            succeeded: 0,
            failed: 4,
        };
        assert_eq!(
            err.to_string(),
            "tier 'junior_analysts' produced no results (0 succeeded, 4 failed)"
        );
    }

    #[test]
    fn config_parse_display_names_path() {
        let err = ConfigError::Parse {
            path: PathBuf::from("config/team.json"),
            message: "missing field `workers`".into(),
        };
        assert!(err.to_string().contains("config/team.json"));
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TaskError>();
        assert_send_sync::<PipelineError>();
        assert_send_sync::<ConfigError>();
        assert_send_sync::<DeliveryError>();
    }
}
