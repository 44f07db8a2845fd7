// src/ingest/types.rs
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, TaskError};

/// One remote feed. Built once at startup; `contention_domain` is the endpoint host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub name: String,
    pub endpoint: String,
    pub contention_domain: String,
}

impl Source {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let endpoint = endpoint.into();
        let url = Url::parse(&endpoint)
            .map_err(|e| ConfigError::Invalid(format!("source '{name}': bad url {endpoint}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::Invalid(format!("source '{name}': url has no host")))?
            .to_ascii_lowercase();
        Ok(Self {
            name,
            endpoint,
            contention_domain: host,
        })
    }
}

/// One parsed feed entry. Entries from different sources are concatenated, never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub source: String,
    pub title: String,
    pub link: String,
    /// Raw date string as published by the feed.
    pub published_at: String,
    pub published_unix: Option<i64>,
    pub body: String,
    pub unique_id: String,
}

/// Per-source bookkeeping for a collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub items: usize,
    pub error: Option<String>,
}

impl SourceReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Source-fetch collaborator: returns the raw feed document.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<String, TaskError>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_is_lowercased_host() {
        let s = Source::new("FXStreet - News", "https://WWW.FXStreet.com/rss/news").unwrap();
        assert_eq!(s.contention_domain, "www.fxstreet.com");
    }

    #[test]
    fn relative_url_is_rejected() {
        assert!(Source::new("broken", "/rss/news").is_err());
    }
}
