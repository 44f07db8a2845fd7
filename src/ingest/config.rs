// src/ingest/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::ingest::types::Source;

pub const ENV_SOURCES_PATH: &str = "FEED_SOURCES_PATH";

/// Built-in forex feeds, used when no sources file is present.
pub const DEFAULT_FEEDS: &[(&str, &str)] = &[
    ("FXStreet - News", "https://www.fxstreet.com/rss/news"),
    ("FXStreet - Analysis", "https://www.fxstreet.com/rss/analysis"),
    ("InvestingLive", "https://investinglive.com/feed"),
    ("DailyForex - Forex News", "https://www.dailyforex.com/rss/forexnews.xml"),
    (
        "DailyForex - Technical Analysis",
        "https://www.dailyforex.com/rss/technicalanalysis.xml",
    ),
    (
        "DailyForex - Fundamental Analysis",
        "https://www.dailyforex.com/rss/fundamentalanalysis.xml",
    ),
    (
        "DailyForex - Forex Articles",
        "https://www.dailyforex.com/rss/forexarticles.xml",
    ),
    ("Newsquawk", "https://newsquawk.com/blog/feed.rss"),
];

#[derive(Debug, Deserialize)]
struct SourceEntry {
    name: String,
    url: String,
}

pub fn default_sources() -> Result<Vec<Source>, ConfigError> {
    DEFAULT_FEEDS
        .iter()
        .map(|(name, url)| Source::new(*name, *url))
        .collect()
}

/// Load sources from an explicit path. Supports TOML (`[[sources]]`) or a JSON array.
pub fn load_sources_from(path: &Path) -> Result<Vec<Source>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let entries = parse_entries(&content, &ext).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;
    build_sources(entries)
}

/// Load sources using env var + fallbacks:
/// 1) $FEED_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) built-in list
pub fn load_sources_default() -> Result<Vec<Source>, ConfigError> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(ConfigError::Invalid(format!(
            "{ENV_SOURCES_PATH} points to non-existent path {}",
            pb.display()
        )));
    }
    for candidate in ["config/sources.toml", "config/sources.json"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return load_sources_from(&p);
        }
    }
    default_sources()
}

fn parse_entries(s: &str, hint_ext: &str) -> Result<Vec<SourceEntry>, String> {
    #[derive(Deserialize)]
    struct TomlSources {
        sources: Vec<SourceEntry>,
    }

    if hint_ext == "json" {
        return serde_json::from_str(s).map_err(|e| e.to_string());
    }
    match toml::from_str::<TomlSources>(s) {
        Ok(v) => Ok(v.sources),
        Err(toml_err) => serde_json::from_str(s).map_err(|_| toml_err.to_string()),
    }
}

fn build_sources(entries: Vec<SourceEntry>) -> Result<Vec<Source>, ConfigError> {
    let mut out: Vec<Source> = Vec::with_capacity(entries.len());
    for e in entries {
        let name = e.name.trim();
        let url = e.url.trim();
        if name.is_empty() || url.is_empty() {
            continue;
        }
        // Keep the first declaration of a duplicated endpoint.
        if out.iter().any(|s| s.endpoint == url) {
            tracing::warn!(source = name, url, "duplicate feed url ignored");
            continue;
        }
        out.push(Source::new(name, url)?);
    }
    if out.is_empty() {
        return Err(ConfigError::Invalid("no usable feed sources".to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_feeds_are_valid_and_ordered() {
        let v = default_sources().unwrap();
        assert_eq!(v.len(), DEFAULT_FEEDS.len());
        assert_eq!(v[0].name, "FXStreet - News");
        assert_eq!(v[0].contention_domain, "www.fxstreet.com");
        assert_eq!(v[3].contention_domain, "www.dailyforex.com");
    }

    #[test]
    fn toml_and_json_shapes_parse() {
        let toml = r#"
[[sources]]
name = " Fed "
url = "https://www.federalreserve.gov/feeds/press_all.xml"

[[sources]]
name = ""
url = "https://skipped.example/feed"
"#;
        let v = build_sources(parse_entries(toml, "toml").unwrap()).unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].name, "Fed");
        assert_eq!(v[0].contention_domain, "www.federalreserve.gov");

        let json = r#"[{"name":"A","url":"https://a.example/rss"},{"name":"A2","url":"https://a.example/rss"}]"#;
        let v = build_sources(parse_entries(json, "").unwrap()).unwrap();
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn empty_list_is_a_config_error() {
        let err = build_sources(vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
