// tests/fresh_cache.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use forex_squawk::market::{Availability, FallbackProvider};
use forex_squawk::KeyedFreshCache;

struct SlowQuote {
    calls: Arc<AtomicUsize>,
    latency: Duration,
    fail: bool,
}

#[async_trait]
impl FallbackProvider<String, f64> for SlowQuote {
    async fn fetch(&self, key: &String) -> anyhow::Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        if self.fail {
            anyhow::bail!("no quote for {key}");
        }
        Ok(1.0842)
    }

    fn name(&self) -> &str {
        "slow"
    }
}

fn cache(fail: bool) -> (KeyedFreshCache<String, f64>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider: Arc<dyn FallbackProvider<String, f64>> = Arc::new(SlowQuote {
        calls: calls.clone(),
        latency: Duration::from_millis(100),
        fail,
    });
    (KeyedFreshCache::new(Duration::from_secs(60), vec![provider]), calls)
}

#[tokio::test(start_paused = true)]
async fn fresh_hits_skip_the_provider_until_expiry() {
    let (cache, calls) = cache(false);
    let key = "EURUSD".to_string();

    assert_eq!(cache.get(&key).await, Availability::Available(1.0842));
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(cache.get(&key).await, Availability::Available(1.0842));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(cache.get(&key).await.is_available());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_fetch() {
    let (cache, calls) = cache(false);
    let key = "GBPUSD".to_string();

    let results = join_all((0..8).map(|_| cache.get(&key))).await;

    assert!(results.iter().all(|r| *r == Availability::Available(1.0842)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.peek(&key).is_some());
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_failure() {
    let (cache, calls) = cache(true);
    let key = "USDJPY".to_string();

    let results = join_all((0..4).map(|_| cache.get(&key))).await;
    assert!(results.iter().all(|r| *r == Availability::Unavailable));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Failures are not remembered.
    cache.get(&key).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn keys_are_independent() {
    let (cache, calls) = cache(false);
    cache.get(&"EURUSD".to_string()).await;
    cache.get(&"AUDUSD".to_string()).await;
    cache.get(&"EURUSD".to_string()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
