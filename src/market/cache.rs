// src/market/cache.rs
//! Per-key, time-boxed memoization with an ordered provider cascade.
//!
//! Concurrent misses on one key share a single in-flight fetch: the first
//! caller installs a `Shared` future, later callers await that same future
//! instead of calling providers again. Failures are never cached.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use parking_lot::Mutex;
use tokio::time::Instant;

/// One source in the cascade. Tried in order until one succeeds.
#[async_trait]
pub trait FallbackProvider<K, V>: Send + Sync {
    async fn fetch(&self, key: &K) -> anyhow::Result<V>;
    fn name(&self) -> &str;
}

/// `Unavailable` is the sentinel for "every provider failed"; render it as such,
/// never as real data.
#[derive(Debug, Clone, PartialEq)]
pub enum Availability<V> {
    Available(V),
    Unavailable,
}

impl<V> Availability<V> {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }

    pub fn as_option(&self) -> Option<&V> {
        match self {
            Availability::Available(v) => Some(v),
            Availability::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
}

type SharedFetch<V> = Shared<BoxFuture<'static, Option<V>>>;

enum Slot<V> {
    Ready(CacheEntry<V>),
    Pending { generation: u64, fetch: SharedFetch<V> },
}

enum Lookup<V> {
    Hit(V),
    Join(u64, SharedFetch<V>),
    Miss,
}

pub type DynProvider<K, V> = Arc<dyn FallbackProvider<K, V>>;

pub struct KeyedFreshCache<K, V> {
    freshness: Duration,
    providers: Arc<Vec<DynProvider<K, V>>>,
    slots: Mutex<HashMap<K, Slot<V>>>,
    generation: AtomicU64,
}

impl<K, V> KeyedFreshCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(freshness: Duration, providers: Vec<DynProvider<K, V>>) -> Self {
        Self {
            freshness,
            providers: Arc::new(providers),
            slots: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Fresh value, or the first provider success, or `Unavailable`. Never errors.
    pub async fn get(&self, key: &K) -> Availability<V> {
        let (generation, fetch) = {
            let mut slots = self.slots.lock();
            let lookup = match slots.get(key) {
                Some(Slot::Ready(entry)) if entry.fetched_at.elapsed() < self.freshness => {
                    Lookup::Hit(entry.value.clone())
                }
                Some(Slot::Pending { generation, fetch }) => Lookup::Join(*generation, fetch.clone()),
                _ => Lookup::Miss,
            };
            match lookup {
                Lookup::Hit(v) => {
                    counter!("fresh_cache_hits_total").increment(1);
                    tracing::debug!(key = ?key, "fresh cache hit");
                    return Availability::Available(v);
                }
                Lookup::Join(generation, fetch) => {
                    counter!("fresh_cache_joined_total").increment(1);
                    (generation, fetch)
                }
                Lookup::Miss => {
                    counter!("fresh_cache_misses_total").increment(1);
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.cascade(key.clone()).boxed().shared();
                    slots.insert(
                        key.clone(),
                        Slot::Pending {
                            generation,
                            fetch: fetch.clone(),
                        },
                    );
                    (generation, fetch)
                }
            }
        };

        let result = fetch.await;

        // Whoever finishes first settles the slot, so a dropped leader cannot wedge it.
        {
            let mut slots = self.slots.lock();
            let still_pending = matches!(
                slots.get(key),
                Some(Slot::Pending { generation: g, .. }) if *g == generation
            );
            if still_pending {
                match &result {
                    Some(v) => {
                        slots.insert(
                            key.clone(),
                            Slot::Ready(CacheEntry {
                                value: v.clone(),
                                fetched_at: Instant::now(),
                            }),
                        );
                    }
                    None => {
                        slots.remove(key);
                    }
                }
            }
        }

        match result {
            Some(v) => Availability::Available(v),
            None => {
                counter!("fresh_cache_unavailable_total").increment(1);
                tracing::warn!(key = ?key, providers = self.providers.len(), "all providers failed");
                Availability::Unavailable
            }
        }
    }

    /// Stored entry for `key`, fresh or not. Pending fetches are not visible.
    pub fn peek(&self, key: &K) -> Option<CacheEntry<V>> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    pub fn invalidate(&self, key: &K) {
        self.slots.lock().remove(key);
    }

    fn cascade(&self, key: K) -> impl std::future::Future<Output = Option<V>> + Send + 'static {
        let providers = self.providers.clone();
        async move {
            for provider in providers.iter() {
                match provider.fetch(&key).await {
                    Ok(v) => {
                        tracing::info!(key = ?key, provider = provider.name(), "provider succeeded");
                        return Some(v);
                    }
                    Err(e) => {
                        tracing::debug!(key = ?key, provider = provider.name(), error = %e, "provider failed, trying next");
                    }
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl FallbackProvider<String, String> for Counting {
        async fn fetch(&self, key: &String) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("{} down", self.name);
            }
            Ok(format!("{}:{key}", self.name))
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    fn provider(name: &'static str, fail: bool) -> (DynProvider<String, String>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let p = Arc::new(Counting {
            name,
            calls: calls.clone(),
            fail,
        });
        (p, calls)
    }

    #[tokio::test]
    async fn cascade_stops_at_first_success() {
        let (a, a_calls) = provider("a", true);
        let (b, b_calls) = provider("b", false);
        let (c, c_calls) = provider("c", false);
        let cache = KeyedFreshCache::new(Duration::from_secs(60), vec![a, b, c]);

        let v = cache.get(&"EURUSD".to_string()).await;
        assert_eq!(v, Availability::Available("b:EURUSD".to_string()));
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
        assert!(cache.peek(&"EURUSD".to_string()).is_some());
    }

    #[tokio::test]
    async fn total_failure_is_unavailable_and_not_cached() {
        let (a, a_calls) = provider("a", true);
        let cache = KeyedFreshCache::new(Duration::from_secs(60), vec![a]);
        let key = "GBPUSD".to_string();

        assert_eq!(cache.get(&key).await, Availability::Unavailable);
        assert!(cache.peek(&key).is_none());
        assert_eq!(cache.get(&key).await, Availability::Unavailable);
        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let (a, a_calls) = provider("a", false);
        let cache = KeyedFreshCache::new(Duration::from_secs(60), vec![a]);
        let key = "USDJPY".to_string();
        cache.get(&key).await;
        cache.invalidate(&key);
        cache.get(&key).await;
        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    }
}
