// tests/workflow.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use forex_squawk::analyze::{WorkerClient, WorkerRequest};
use forex_squawk::ingest::types::{FeedFetcher, Source};
use forex_squawk::notify::Notifier;
use forex_squawk::pipeline::team::parse_team;
use forex_squawk::pipeline::TeamConfig;
use forex_squawk::{DeliveryError, RateLimiter, RunStatus, SourceCollector, TaskError, Workflow};

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>desk</title>
<item><title>GBP/USD slips after BoE minutes</title><link>https://news.example.com/1</link><description>Cable under pressure.</description></item>
<item><title>Sterling extends losses</title><link>https://news.example.com/2</link><description>GBPUSD eyes 1.30.</description></item>
</channel></rss>"#;

struct StaticFeeds {
    fail: bool,
}

#[async_trait]
impl FeedFetcher for StaticFeeds {
    async fn fetch(&self, _source: &Source) -> Result<String, TaskError> {
        if self.fail {
            Err(TaskError::TransientIo("connection refused".into()))
        } else {
            Ok(FEED.to_string())
        }
    }
    fn name(&self) -> &'static str {
        "static"
    }
}

#[derive(Default)]
struct EchoWorkers {
    fail_all: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl WorkerClient for EchoWorkers {
    async fn complete(&self, req: &WorkerRequest) -> Result<String, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(req.prompt.clone());
        if self.fail_all {
            return Err(TaskError::BadResponse("model not loaded".into()));
        }
        Ok(format!("{} says hold", req.target))
    }
    fn provider_name(&self) -> &'static str {
        "echo"
    }
}

#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Status(401));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }
    fn channel(&self) -> &'static str {
        "recording"
    }
}

fn team() -> TeamConfig {
    parse_team(
        r#"{"tiers": [
          {"name": "junior", "kind": "base", "workers": [
            {"name": "A", "role": "Sentiment", "model": "m-a", "temperature": 0.5, "system_prompt": "Read {{DATA}}"},
            {"name": "B", "role": "Technicals", "model": "m-b", "temperature": 0.5, "system_prompt": "Levels\n{{MARKET_DATA}}\n{{DATA}}"}
          ]},
          {"name": "senior", "kind": "synthesis", "workers": [
            {"name": "S", "role": "Synthesis", "model": "m-s", "temperature": 0.3, "system_prompt": "Combine for {{INSTRUMENT}}: {{DATA}}"}
          ]}
        ]}"#,
        "default",
    )
    .unwrap()
}

fn sources() -> Vec<Source> {
    vec![
        Source::new("Desk A", "https://a.example.com/rss").unwrap(),
        Source::new("Desk B", "https://b.example.com/rss").unwrap(),
    ]
}

fn collector(fail: bool) -> SourceCollector {
    SourceCollector::new(
        Arc::new(StaticFeeds { fail }),
        Arc::new(RateLimiter::new(2).with_pacing(0, 0)),
    )
}

#[tokio::test]
async fn full_run_delivers_and_writes_report() {
    let workers = Arc::new(EchoWorkers::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let reports = tempfile::tempdir().unwrap();

    let wf = Workflow::new(sources(), collector(false), workers.clone(), team())
        .with_notifier(notifier.clone())
        .with_report_dir(reports.path());
    let summary = wf.run().await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.articles, 4);
    assert_eq!(summary.tiers_run, 2);
    assert!(summary.delivered);
    assert_eq!(summary.delivered_via, Some("recording"));
    assert_eq!(summary.instrument.as_ref().map(|p| p.to_string()).as_deref(), Some("GBP/USD"));
    assert_eq!(workers.calls.load(Ordering::SeqCst), 3);

    assert_eq!(*notifier.sent.lock(), vec!["m-s says hold".to_string()]);

    // No market source wired: workers are told data is unavailable.
    let prompts = workers.prompts.lock();
    assert!(prompts.iter().any(|p| p.contains("MARKET DATA STATUS: UNAVAILABLE")));
    assert!(prompts.iter().any(|p| p.contains("Combine for GBP/USD")));

    let report = std::fs::read_to_string(summary.report_path.unwrap()).unwrap();
    assert!(report.contains("### 1. A (Sentiment)"));
    assert!(report.contains("### 2. B (Technicals)"));
}

#[tokio::test]
async fn no_data_skips_workers() {
    let workers = Arc::new(EchoWorkers::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let wf = Workflow::new(sources(), collector(true), workers.clone(), team())
        .with_notifier(notifier.clone());

    let summary = wf.run().await;
    assert_eq!(summary.status, RunStatus::NoData);
    assert_eq!(summary.failed_sources, 2);
    assert_eq!(workers.calls.load(Ordering::SeqCst), 0);
    assert!(notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn exhausted_base_tier_is_reported_not_raised() {
    let workers = Arc::new(EchoWorkers {
        fail_all: true,
        ..Default::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let wf = Workflow::new(sources(), collector(false), workers.clone(), team())
        .with_notifier(notifier.clone());

    let summary = wf.run().await;
    assert_eq!(
        summary.status,
        RunStatus::TierFailed {
            tier: "junior".into(),
            succeeded: 0,
            failed: 2,
        }
    );
    // Senior tier never called.
    assert_eq!(workers.calls.load(Ordering::SeqCst), 2);
    assert!(!summary.delivered);
    assert!(notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn failed_delivery_goes_to_fallback() {
    let workers = Arc::new(EchoWorkers::default());
    let primary = Arc::new(RecordingNotifier {
        fail: true,
        ..Default::default()
    });
    let fallback = Arc::new(RecordingNotifier::default());
    let wf = Workflow::new(sources(), collector(false), workers, team())
        .with_notifier(primary)
        .with_fallback(fallback.clone());

    let summary = wf.run().await;
    assert_eq!(summary.status, RunStatus::Completed);
    assert!(!summary.delivered);
    assert_eq!(summary.delivered_via, Some("recording"));
    assert_eq!(fallback.sent.lock().len(), 1);
}

#[tokio::test]
async fn no_sources_is_misconfigured() {
    let wf = Workflow::new(Vec::new(), collector(false), Arc::new(EchoWorkers::default()), team());
    assert!(matches!(wf.run().await.status, RunStatus::Misconfigured { .. }));
}
