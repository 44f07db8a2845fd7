//! Forex squawk: binary entrypoint.
//! Loads settings and the team topology, then runs the workflow once or on a schedule.

use forex_squawk::config::{LogFormat, Settings};
use forex_squawk::ingest::config::load_sources_default;
use forex_squawk::market::QUOTE_FRESHNESS;
use forex_squawk::metrics::Metrics;
use forex_squawk::pipeline::load_team;
use forex_squawk::{scheduler, Workflow};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins; otherwise `LOG_LEVEL` for this crate and warn for dependencies.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("forex_squawk={},warn", settings.log_level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env()?;
    init_tracing(&settings);

    let team = load_team(&settings.team_config_path, &settings.default_model)?;
    tracing::info!(
        path = %settings.team_config_path.display(),
        version = team.version.as_deref().unwrap_or("unversioned"),
        tiers = team.tiers.len(),
        workers = team.worker_count(),
        "team loaded"
    );
    let sources = load_sources_default()?;

    let metrics = match Metrics::init(QUOTE_FRESHNESS.as_secs()) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    };

    let workflow = Workflow::from_settings(&settings, team, sources);

    if settings.run_once {
        tracing::info!(mode = ?settings.exec_mode, "running workflow once");
        let summary = workflow.run().await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        scheduler::run_forever(&workflow, settings.schedule_interval).await;
    }

    if let Some(m) = metrics {
        match m.write_snapshot(&settings.report_dir) {
            Ok(path) => tracing::debug!(path = %path.display(), "metrics snapshot written"),
            Err(e) => tracing::warn!(error = %e, "could not write metrics snapshot"),
        }
    }
    Ok(())
}
