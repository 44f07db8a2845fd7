// src/report.rs
//! Markdown run reports written next to each other in the report directory.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::market::FxPair;
use crate::pipeline::PipelineOutcome;

pub struct RunReport<'a> {
    pub started_at: DateTime<Utc>,
    pub articles: usize,
    pub failed_sources: usize,
    pub instrument: &'a FxPair,
    pub market_block: &'a str,
    pub outcome: &'a PipelineOutcome,
}

pub fn report_file_name(at: DateTime<Utc>) -> String {
    format!("analysis_{}.md", at.format("%Y%m%d_%H%M%S"))
}

pub fn render_report(r: &RunReport<'_>) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Forex News Analysis: {}", r.instrument);
    let _ = writeln!(md);
    let _ = writeln!(md, "- Generated: {}", r.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(md, "- Articles analyzed: {}", r.articles);
    if r.failed_sources > 0 {
        let _ = writeln!(md, "- Sources failed: {}", r.failed_sources);
    }
    if r.outcome.degraded() {
        if let Some(fin) = r.outcome.final_record() {
            let _ = writeln!(md, "- Note: final output taken from tier `{}`", fin.tier);
        }
    }
    let _ = writeln!(md);
    let _ = writeln!(md, "## Market Data\n\n```\n{}\n```", r.market_block);

    for record in &r.outcome.tiers {
        let _ = writeln!(md);
        let _ = writeln!(md, "## {} ({})", record.tier, record.kind.label());
        if record.skipped() {
            let _ = writeln!(md, "\n_No workers configured._");
            continue;
        }
        if record.failed > 0 {
            let _ = writeln!(md, "\n_{} of {} workers failed._", record.failed, record.attempted);
        }
        for res in &record.results {
            let _ = writeln!(
                md,
                "\n### {}. {} ({})\n\n{}",
                res.original_index + 1,
                res.worker_name,
                res.role,
                res.output
            );
        }
    }

    let _ = writeln!(md, "\n## Final\n\n{}", r.outcome.final_text());
    md
}

/// Write the report as `analysis_<UTC timestamp>.md` under `dir`, creating it if needed.
pub fn write_report(dir: &Path, r: &RunReport<'_>) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(r.started_at));
    fs::write(&path, render_report(r))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(path)
}
