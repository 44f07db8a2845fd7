// src/market/mod.rs
//! Live FX context for the analysis prompt.

pub mod cache;
pub mod providers;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::AggregatedItems;

pub use cache::{Availability, CacheEntry, DynProvider, FallbackProvider, KeyedFreshCache};
pub use providers::{ExchangeRateApi, Fixer, Frankfurter, FxPair, Quote};

pub const QUOTE_FRESHNESS: Duration = Duration::from_secs(60);

/// Prompt placeholder the market block is substituted into.
pub const MARKET_PLACEHOLDER: &str = "MARKET_DATA";

const UNAVAILABLE_NOTE: &str =
    "CRITICAL: Real market data unavailable. Do not trade based on this information.";

/// Endpoints for the provider cascade. Overridable for tests and mirrors.
#[derive(Debug, Clone)]
pub struct MarketEndpoints {
    pub exchange_rate_api: String,
    pub frankfurter: String,
    pub fixer: String,
    pub fixer_key: Option<String>,
    pub timeout: Duration,
}

impl Default for MarketEndpoints {
    fn default() -> Self {
        Self {
            exchange_rate_api: providers::EXCHANGE_RATE_API_URL.to_string(),
            frankfurter: providers::FRANKFURTER_URL.to_string(),
            fixer: providers::FIXER_URL.to_string(),
            fixer_key: None,
            timeout: providers::DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

pub struct MarketData {
    cache: KeyedFreshCache<FxPair, Quote>,
}

impl MarketData {
    pub fn new(providers: Vec<DynProvider<FxPair, Quote>>, freshness: Duration) -> Self {
        Self {
            cache: KeyedFreshCache::new(freshness, providers),
        }
    }

    /// exchangerate-api, then frankfurter, then fixer when a key is set.
    pub fn from_endpoints(ep: &MarketEndpoints) -> Self {
        let http = providers::provider_http_client(ep.timeout);
        let mut chain: Vec<DynProvider<FxPair, Quote>> = vec![
            Arc::new(ExchangeRateApi::new(&ep.exchange_rate_api, http.clone())),
            Arc::new(Frankfurter::new(&ep.frankfurter, http.clone())),
        ];
        if let Some(key) = ep.fixer_key.as_deref().filter(|k| !k.trim().is_empty()) {
            chain.push(Arc::new(Fixer::new(&ep.fixer, key, http)));
        }
        tracing::debug!(providers = chain.len(), "market data providers configured");
        Self::new(chain, QUOTE_FRESHNESS)
    }

    pub async fn quote(&self, pair: &FxPair) -> Availability<Quote> {
        self.cache.get(pair).await
    }
}

/// Text block handed to the workers. The unavailable form must never read as real data.
pub fn render_market_block(pair: &FxPair, quote: &Availability<Quote>) -> String {
    match quote {
        Availability::Available(q) => format!(
            "REAL-TIME MARKET DATA ({source}):\n\
             Symbol: {pair}\n\
             Current Price: {price:.5}\n\
             Bid: {bid:.5}\n\
             Ask: {ask:.5}\n\
             Spread: {spread:.5} ({pips:.1} pips)\n\
             As of: {as_of}",
            source = q.source,
            pair = q.pair,
            price = q.price,
            bid = q.bid,
            ask = q.ask,
            spread = q.spread(),
            pips = q.spread_pips(),
            as_of = q.as_of,
        ),
        Availability::Unavailable => format!(
            "MARKET DATA STATUS: UNAVAILABLE\n\
             Symbol: {pair}\n\
             Price: N/A\n\
             {UNAVAILABLE_NOTE}"
        ),
    }
}

static MAJORS: Lazy<Vec<(FxPair, Regex)>> = Lazy::new(|| {
    ["EUR/USD", "GBP/USD", "USD/JPY", "AUD/USD", "USD/CHF", "USD/CAD"]
        .iter()
        .map(|sym| {
            let pair = FxPair::parse_or_default(sym);
            let re = Regex::new(&format!(r"(?i)\b{}\s*/?\s*{}\b", pair.base, pair.quote))
                .expect("static pair regex");
            (pair, re)
        })
        .collect()
});

/// Most-mentioned major across titles and bodies; EUR/USD when none is named.
pub fn detect_instrument(items: &AggregatedItems) -> FxPair {
    let mut best: Option<(usize, &FxPair)> = None;
    for (pair, re) in MAJORS.iter() {
        let hits: usize = items
            .items
            .iter()
            .map(|it| re.find_iter(&it.title).count() + re.find_iter(&it.body).count())
            .sum();
        if hits > 0 && best.map_or(true, |(n, _)| hits > n) {
            best = Some((hits, pair));
        }
    }
    best.map(|(_, p)| p.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Item;

    fn items(texts: &[&str]) -> AggregatedItems {
        AggregatedItems {
            items: texts
                .iter()
                .map(|t| Item {
                    title: t.to_string(),
                    ..Default::default()
                })
                .collect(),
            reports: Vec::new(),
        }
    }

    #[test]
    fn detects_slash_and_compact_forms() {
        assert_eq!(detect_instrument(&items(&["Cable slides as GBP/USD tests 1.32"])), FxPair::new("GBP", "USD"));
        assert_eq!(detect_instrument(&items(&["usdjpy breaks 150"])), FxPair::new("USD", "JPY"));
    }

    #[test]
    fn most_mentioned_wins_and_default_is_eurusd() {
        let agg = items(&["AUD/USD up", "USD/CAD down", "USD/CAD flat", "Loonie: USDCAD"]);
        assert_eq!(detect_instrument(&agg), FxPair::new("USD", "CAD"));
        assert_eq!(detect_instrument(&items(&["Gold hits record"])), FxPair::default());
    }

    #[test]
    fn unavailable_block_is_marked() {
        let block = render_market_block(&FxPair::default(), &Availability::Unavailable);
        assert!(block.starts_with("MARKET DATA STATUS: UNAVAILABLE"));
        assert!(block.contains("Do not trade"));
        assert!(!block.contains("Current Price"));
    }

    #[test]
    fn available_block_has_five_decimals() {
        let q = Quote::from_mid(FxPair::default(), 1.16, "2025-10-14", "frankfurter");
        let block = render_market_block(&FxPair::default(), &Availability::Available(q));
        assert!(block.contains("Current Price: 1.16000"));
        assert!(block.contains("(2.0 pips)"));
        assert!(block.contains("frankfurter"));
    }
}
