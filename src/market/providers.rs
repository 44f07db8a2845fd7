// src/market/providers.rs
//! Spot-rate providers for FX pairs, tried in order by the fresh cache.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::market::cache::FallbackProvider;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
pub const EXCHANGE_RATE_API_URL: &str = "https://open.er-api.com";
pub const FRANKFURTER_URL: &str = "https://api.frankfurter.app";
pub const FIXER_URL: &str = "http://data.fixer.io";

/// Relative half-spread applied around the mid rate.
const HALF_SPREAD: f64 = 0.0001;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FxPair {
    pub base: String,
    pub quote: String,
}

impl FxPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_ascii_uppercase(),
            quote: quote.to_ascii_uppercase(),
        }
    }

    /// Accepts `EUR/USD`, `eurusd`, `EUR USD`. Anything else is `None`.
    pub fn parse(symbol: &str) -> Option<Self> {
        let compact: String = symbol
            .chars()
            .filter(|c| *c != '/' && !c.is_whitespace())
            .collect();
        if compact.len() != 6 || !compact.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        Some(Self::new(&compact[..3], &compact[3..]))
    }

    /// Unparseable symbols fall back to EUR/USD.
    pub fn parse_or_default(symbol: &str) -> Self {
        Self::parse(symbol).unwrap_or_default()
    }

    pub fn compact(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl Default for FxPair {
    fn default() -> Self {
        Self::new("EUR", "USD")
    }
}

impl fmt::Display for FxPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub pair: FxPair,
    pub price: f64,
    pub bid: f64,
    pub ask: f64,
    /// Provider-reported update time, as the provider formats it.
    pub as_of: String,
    pub source: String,
}

impl Quote {
    pub fn from_mid(pair: FxPair, mid: f64, as_of: impl Into<String>, source: &str) -> Self {
        Self {
            pair,
            price: mid,
            bid: mid * (1.0 - HALF_SPREAD),
            ask: mid * (1.0 + HALF_SPREAD),
            as_of: as_of.into(),
            source: source.to_string(),
        }
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    pub fn spread_pips(&self) -> f64 {
        if self.price == 0.0 {
            return 0.0;
        }
        self.spread() / self.price * 10_000.0
    }
}

pub fn provider_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(crate::ingest::http::USER_AGENT)
        .timeout(timeout)
        .build()
        .expect("reqwest client")
}

/// `label` names the provider in errors; urls may carry access keys.
async fn get_json(http: &reqwest::Client, url: &str, label: &str) -> anyhow::Result<Value> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow!("{label} request failed: {}", e.without_url()))?;
    let status = resp.status();
    if !status.is_success() {
        bail!("HTTP {} from {label}", status.as_u16());
    }
    resp.json::<Value>().await.context("decoding provider body")
}

fn rate_for(body: &Value, quote: &str) -> anyhow::Result<f64> {
    let rate = body
        .get("rates")
        .and_then(|r| r.get(quote))
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("no rate for {quote}"))?;
    if !rate.is_finite() || rate <= 0.0 {
        bail!("implausible rate {rate} for {quote}");
    }
    Ok(rate)
}

fn text_field(body: &Value, key: &str) -> String {
    body.get(key).and_then(Value::as_str).unwrap_or("unknown").to_string()
}

/// open.er-api.com; keyless, base-currency tables.
pub struct ExchangeRateApi {
    http: reqwest::Client,
    base_url: String,
}

impl ExchangeRateApi {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FallbackProvider<FxPair, Quote> for ExchangeRateApi {
    async fn fetch(&self, pair: &FxPair) -> anyhow::Result<Quote> {
        let url = format!("{}/v6/latest/{}", self.base_url, pair.base);
        let body = get_json(&self.http, &url, self.name()).await?;
        if body.get("result").and_then(Value::as_str) != Some("success") {
            bail!("exchangerate-api reported failure");
        }
        let rate = rate_for(&body, &pair.quote)?;
        Ok(Quote::from_mid(
            pair.clone(),
            rate,
            text_field(&body, "time_last_update_utc"),
            self.name(),
        ))
    }

    fn name(&self) -> &str {
        "exchangerate-api"
    }
}

/// Frankfurter (ECB reference rates); keyless.
pub struct Frankfurter {
    http: reqwest::Client,
    base_url: String,
}

impl Frankfurter {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FallbackProvider<FxPair, Quote> for Frankfurter {
    async fn fetch(&self, pair: &FxPair) -> anyhow::Result<Quote> {
        let url = format!(
            "{}/latest?from={}&to={}",
            self.base_url, pair.base, pair.quote
        );
        let body = get_json(&self.http, &url, self.name()).await?;
        let rate = rate_for(&body, &pair.quote)?;
        Ok(Quote::from_mid(pair.clone(), rate, text_field(&body, "date"), self.name()))
    }

    fn name(&self) -> &str {
        "frankfurter"
    }
}

/// fixer.io; only registered when an access key is configured.
pub struct Fixer {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
}

impl Fixer {
    pub fn new(base_url: &str, access_key: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
        }
    }
}

#[async_trait]
impl FallbackProvider<FxPair, Quote> for Fixer {
    async fn fetch(&self, pair: &FxPair) -> anyhow::Result<Quote> {
        let mut url = url::Url::parse(&format!("{}/api/latest", self.base_url))
            .context("fixer base url")?;
        url.query_pairs_mut()
            .append_pair("access_key", &self.access_key)
            .append_pair("base", &pair.base)
            .append_pair("symbols", &pair.quote);
        let body = get_json(&self.http, url.as_str(), self.name()).await?;
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            bail!("fixer reported failure");
        }
        let rate = rate_for(&body, &pair.quote)?;
        Ok(Quote::from_mid(pair.clone(), rate, text_field(&body, "date"), self.name()))
    }

    fn name(&self) -> &str {
        "fixer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> reqwest::Client {
        provider_http_client(Duration::from_secs(5))
    }

    #[test]
    fn pair_parsing() {
        assert_eq!(FxPair::parse("EUR/USD"), Some(FxPair::new("EUR", "USD")));
        assert_eq!(FxPair::parse("gbp usd"), Some(FxPair::new("GBP", "USD")));
        assert_eq!(FxPair::parse("USDJPY").map(|p| p.to_string()).as_deref(), Some("USD/JPY"));
        assert_eq!(FxPair::parse("EURO/USD"), None);
        assert_eq!(FxPair::parse_or_default("gold"), FxPair::new("EUR", "USD"));
        assert_eq!(FxPair::new("aud", "usd").compact(), "AUDUSD");
    }

    #[test]
    fn quote_spread_in_pips() {
        let q = Quote::from_mid(FxPair::default(), 1.1, "now", "test");
        assert!(q.bid < q.price && q.price < q.ask);
        assert!((q.spread_pips() - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn exchange_rate_api_reads_rate_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v6/latest/EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": "success",
                "time_last_update_utc": "Tue, 14 Oct 2025 00:02:31 +0000",
                "rates": {"USD": 1.1612, "JPY": 176.1}
            })))
            .mount(&server)
            .await;
        let p = ExchangeRateApi::new(&server.uri(), http());
        let q = p.fetch(&FxPair::default()).await.unwrap();
        assert_eq!(q.price, 1.1612);
        assert_eq!(q.source, "exchangerate-api");
        assert!(q.as_of.contains("2025"));
    }

    #[tokio::test]
    async fn exchange_rate_api_error_result_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "error"})))
            .mount(&server)
            .await;
        let p = ExchangeRateApi::new(&server.uri(), http());
        assert!(p.fetch(&FxPair::default()).await.is_err());
    }

    #[tokio::test]
    async fn frankfurter_queries_pair() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .and(query_param("from", "GBP"))
            .and(query_param("to", "USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "date": "2025-10-14",
                "rates": {"USD": 1.3301}
            })))
            .mount(&server)
            .await;
        let p = Frankfurter::new(&server.uri(), http());
        let q = p.fetch(&FxPair::new("GBP", "USD")).await.unwrap();
        assert_eq!(q.price, 1.3301);
        assert_eq!(q.as_of, "2025-10-14");
    }

    #[tokio::test]
    async fn fixer_requires_success_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/latest"))
            .and(query_param("access_key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": {"code": 101}
            })))
            .mount(&server)
            .await;
        let p = Fixer::new(&server.uri(), "k", http());
        assert!(p.fetch(&FxPair::default()).await.is_err());
    }

    #[tokio::test]
    async fn http_error_fails_provider() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let p = Frankfurter::new(&server.uri(), http());
        let err = p.fetch(&FxPair::default()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
