// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod config;
pub mod error;
pub mod fanout;
pub mod ingest;
pub mod limiter;
pub mod market;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod workflow;

// ---- Re-exports for stable public API ----
pub use crate::config::Settings;
pub use crate::error::{ConfigError, DeliveryError, PipelineError, TaskError};
pub use crate::fanout::{ExecMode, FanOutExecutor};
pub use crate::ingest::SourceCollector;
pub use crate::limiter::RateLimiter;
pub use crate::market::KeyedFreshCache;
pub use crate::pipeline::TieredPipeline;
pub use crate::workflow::{RunStatus, RunSummary, Workflow};
