// src/ingest/mod.rs
pub mod config;
pub mod feed;
pub mod http;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::TaskError;
use crate::fanout::{ExecMode, FanOutExecutor};
use crate::ingest::types::{FeedFetcher, Item, Source, SourceReport};
use crate::limiter::RateLimiter;

pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TEXT_CHARS: usize = 1500;

/// One-time metrics registration (so series show up in the exporter).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items parsed from feeds.");
        describe_counter!("ingest_source_errors_total", "Sources that failed to fetch or parse.");
        describe_counter!("ingest_parse_warnings_total", "Feeds parsed only partially.");
        describe_counter!("ingest_parse_failures_total", "Feeds that could not be parsed at all.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when collection last ran.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // Tag stripping can leave "word ." behind
    out = out.replace(" .", ".").replace(" ,", ",");

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }

    out
}

/// Merged output of one collection run, in source declaration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedItems {
    pub items: Vec<Item>,
    pub reports: Vec<SourceReport>,
}

impl AggregatedItems {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn failed_sources(&self) -> usize {
        self.reports.iter().filter(|r| !r.succeeded()).count()
    }

    /// `{"data": [...items]}`, the shape handed to the first tier.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "data": self.items })
    }
}

/// Pulls every source concurrently through one shared rate limiter.
pub struct SourceCollector {
    fetcher: Arc<dyn FeedFetcher>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl SourceCollector {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            fetcher,
            limiter,
            timeout: DEFAULT_FEED_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch and parse all sources. Never fails: a broken source contributes
    /// nothing. Callers must check `is_empty()`.
    pub async fn collect_all(&self, sources: &[Source]) -> AggregatedItems {
        ensure_metrics_described();

        let ops: Vec<_> = sources
            .iter()
            .map(|source| move || self.fetch_one(source))
            .collect();
        let outcomes = FanOutExecutor::new(ExecMode::Concurrent).run(ops).await;

        let mut merged = AggregatedItems::default();
        for (source, outcome) in sources.iter().zip(outcomes) {
            match outcome {
                Ok(mut items) => {
                    tracing::info!(source = %source.name, items = items.len(), "source collected");
                    merged.reports.push(SourceReport {
                        source: source.name.clone(),
                        items: items.len(),
                        error: None,
                    });
                    merged.items.append(&mut items);
                }
                Err(e) => {
                    tracing::warn!(source = %source.name, error = %e, "source failed, contributing nothing");
                    counter!("ingest_source_errors_total").increment(1);
                    merged.reports.push(SourceReport {
                        source: source.name.clone(),
                        items: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        gauge!("ingest_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            total = merged.len(),
            sources = sources.len(),
            failed = merged.failed_sources(),
            "collection finished"
        );
        merged
    }

    async fn fetch_one(&self, source: &Source) -> Result<Vec<Item>, TaskError> {
        self.limiter.pace().await;
        let body = {
            let _permit = self.limiter.acquire(&source.contention_domain).await;
            tokio::time::timeout(self.timeout, self.fetcher.fetch(source))
                .await
                .map_err(|_| {
                    TaskError::TransientIo(format!("timed out after {}s", self.timeout.as_secs()))
                })??
        };

        let parsed = feed::parse_feed(&source.name, &body)?;
        if let Some(w) = &parsed.warning {
            tracing::warn!(source = %source.name, warning = %w, kept = parsed.items.len(), "partial feed parse");
            counter!("ingest_parse_warnings_total").increment(1);
        }
        Ok(parsed.items)
    }
}
