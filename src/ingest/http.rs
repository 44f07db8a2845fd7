// src/ingest/http.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::TaskError;
use crate::ingest::types::{FeedFetcher, Source};

pub const USER_AGENT: &str = concat!(
    "forex-squawk/",
    env!("CARGO_PKG_VERSION"),
    " (RSS aggregator)"
);

/// Plain HTTP GET per source.
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, TaskError> {
        let resp = self
            .client
            .get(&source.endpoint)
            .header(reqwest::header::ACCEPT, "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8")
            .send()
            .await
            .map_err(|e| TaskError::from_reqwest(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TaskError::BadResponse(format!("HTTP {}", status.as_u16())));
        }
        resp.text().await.map_err(|e| TaskError::from_reqwest(&e))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
