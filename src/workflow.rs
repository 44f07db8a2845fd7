// src/workflow.rs
//! One end-to-end run: collect, enrich, analyze, deliver, report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::analyze::{DynWorkerClient, OllamaClient};
use crate::config::Settings;
use crate::error::PipelineError;
use crate::fanout::ExecMode;
use crate::ingest::http::HttpFeedFetcher;
use crate::ingest::types::Source;
use crate::ingest::SourceCollector;
use crate::limiter::RateLimiter;
use crate::market::{
    detect_instrument, render_market_block, Availability, FxPair, MarketData, MarketEndpoints,
    MARKET_PLACEHOLDER,
};
use crate::notify::{ConsoleNotifier, DiscordNotifier, Notifier};
use crate::pipeline::{TeamConfig, TieredPipeline};
use crate::report::{write_report, RunReport};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("workflow_runs_total", "Workflow runs by final status.");
        describe_histogram!("workflow_run_seconds", "Wall time of a full run.");
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Every source failed or returned nothing; no worker was called.
    NoData,
    TierFailed {
        tier: String,
        succeeded: usize,
        failed: usize,
    },
    /// No tier produced any output.
    NoOutput,
    Misconfigured { reason: String },
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::NoData => "no_data",
            RunStatus::TierFailed { .. } => "tier_failed",
            RunStatus::NoOutput => "no_output",
            RunStatus::Misconfigured { .. } => "misconfigured",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub articles: usize,
    pub failed_sources: usize,
    pub instrument: Option<FxPair>,
    pub tiers_run: usize,
    pub delivered: bool,
    pub delivered_via: Option<&'static str>,
    pub report_path: Option<PathBuf>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn empty(status: RunStatus) -> Self {
        Self {
            status,
            articles: 0,
            failed_sources: 0,
            instrument: None,
            tiers_run: 0,
            delivered: false,
            delivered_via: None,
            report_path: None,
            elapsed: Duration::ZERO,
        }
    }
}

pub struct Workflow {
    sources: Vec<Source>,
    collector: SourceCollector,
    client: DynWorkerClient,
    mode: ExecMode,
    team: TeamConfig,
    market: Option<MarketData>,
    notifier: Arc<dyn Notifier>,
    fallback: Arc<dyn Notifier>,
    report_dir: Option<PathBuf>,
}

impl Workflow {
    /// Minimal wiring: no market data, console delivery, no reports.
    pub fn new(
        sources: Vec<Source>,
        collector: SourceCollector,
        client: DynWorkerClient,
        team: TeamConfig,
    ) -> Self {
        Self {
            sources,
            collector,
            client,
            mode: ExecMode::Concurrent,
            team,
            market: None,
            notifier: Arc::new(ConsoleNotifier),
            fallback: Arc::new(ConsoleNotifier),
            report_dir: None,
        }
    }

    /// Production wiring from settings.
    pub fn from_settings(settings: &Settings, team: TeamConfig, sources: Vec<Source>) -> Self {
        let limiter = RateLimiter::new(settings.max_per_domain)
            .with_pacing(settings.pacing_ms.0, settings.pacing_ms.1);
        let collector = SourceCollector::new(
            Arc::new(HttpFeedFetcher::new(settings.feed_timeout)),
            Arc::new(limiter),
        )
        .with_timeout(settings.feed_timeout);
        let client: DynWorkerClient = Arc::new(OllamaClient::new(
            &settings.ollama_base_url,
            settings.worker_timeout,
        ));
        let market = MarketData::from_endpoints(&MarketEndpoints {
            fixer_key: settings.fixer_api_key.clone(),
            ..MarketEndpoints::default()
        });

        let mut wf = Self::new(sources, collector, client, team)
            .with_mode(settings.exec_mode)
            .with_market(market)
            .with_report_dir(settings.report_dir.clone());
        match settings.discord_webhook_url.as_deref() {
            Some(url) => wf = wf.with_notifier(Arc::new(DiscordNotifier::new(url.to_string()))),
            None => tracing::warn!("no Discord webhook configured, results go to the console"),
        }
        wf
    }

    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_market(mut self, market: MarketData) -> Self {
        self.market = Some(market);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Channel used when the primary notifier fails.
    pub fn with_fallback(mut self, fallback: Arc<dyn Notifier>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// Never fails; the outcome is in the returned status.
    pub async fn run(&self) -> RunSummary {
        ensure_metrics_described();
        let started = tokio::time::Instant::now();
        let mut summary = self.run_inner().await;
        summary.elapsed = started.elapsed();

        counter!("workflow_runs_total", "status" => summary.status.label()).increment(1);
        histogram!("workflow_run_seconds").record(summary.elapsed.as_secs_f64());
        tracing::info!(
            status = summary.status.label(),
            articles = summary.articles,
            tiers = summary.tiers_run,
            delivered = summary.delivered,
            elapsed_s = summary.elapsed.as_secs_f64(),
            "workflow finished"
        );
        summary
    }

    async fn run_inner(&self) -> RunSummary {
        let started_at = Utc::now();
        if self.sources.is_empty() {
            return RunSummary::empty(RunStatus::Misconfigured {
                reason: "no feed sources configured".into(),
            });
        }
        if self.team.tiers.is_empty() {
            return RunSummary::empty(RunStatus::Misconfigured {
                reason: "team defines no tiers".into(),
            });
        }

        tracing::info!(sources = self.sources.len(), "collecting feeds");
        let items = self.collector.collect_all(&self.sources).await;
        let mut summary = RunSummary::empty(RunStatus::Completed);
        summary.articles = items.len();
        summary.failed_sources = items.failed_sources();

        if items.is_empty() {
            tracing::error!(failed = summary.failed_sources, "no data fetched, skipping analysis");
            summary.status = RunStatus::NoData;
            return summary;
        }

        let instrument = detect_instrument(&items);
        let quote = match &self.market {
            Some(market) => market.quote(&instrument).await,
            None => Availability::Unavailable,
        };
        if !quote.is_available() {
            tracing::warn!(instrument = %instrument, "market data unavailable, workers are told so");
        }
        let market_block = render_market_block(&instrument, &quote);
        summary.instrument = Some(instrument.clone());

        let pipeline = TieredPipeline::new(self.client.clone(), self.mode)
            .with_var(MARKET_PLACEHOLDER, market_block.clone())
            .with_var("INSTRUMENT", instrument.to_string());
        let outcome = match pipeline.run(items.to_payload(), &self.team.tiers).await {
            Ok(outcome) => outcome,
            Err(PipelineError::TierExhausted {
                tier,
                succeeded,
                failed,
            }) => {
                summary.status = RunStatus::TierFailed {
                    tier,
                    succeeded,
                    failed,
                };
                return summary;
            }
            Err(PipelineError::NothingRan) => {
                summary.status = RunStatus::NoOutput;
                return summary;
            }
        };
        summary.tiers_run = outcome.tiers.iter().filter(|t| !t.skipped()).count();

        let text = outcome.final_text();
        match self.notifier.deliver(&text).await {
            Ok(()) => {
                summary.delivered = true;
                summary.delivered_via = Some(self.notifier.channel());
            }
            Err(e) => {
                tracing::error!(channel = self.notifier.channel(), error = %e, "delivery failed, using fallback");
                if let Err(e) = self.fallback.deliver(&text).await {
                    tracing::error!(channel = self.fallback.channel(), error = %e, "fallback delivery failed");
                } else {
                    summary.delivered_via = Some(self.fallback.channel());
                }
            }
        }

        if let Some(dir) = &self.report_dir {
            let report = RunReport {
                started_at,
                articles: summary.articles,
                failed_sources: summary.failed_sources,
                instrument: &instrument,
                market_block: &market_block,
                outcome: &outcome,
            };
            match write_report(dir, &report) {
                Ok(path) => summary.report_path = Some(path),
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "could not write report"),
            }
        }

        summary
    }
}
