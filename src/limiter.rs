// src/limiter.rs
//! Per-domain concurrency gate.
//!
//! One semaphore per contention domain (usually the remote host), created on
//! first use and kept for the limiter's lifetime. Build one `RateLimiter`,
//! wrap it in an `Arc` and hand it to every caller that talks to the same
//! hosts; a limiter per call would not limit anything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_MAX_PER_DOMAIN: usize = 2;
pub const DEFAULT_PACING_MS: (u64, u64) = (100, 300);

pub struct RateLimiter {
    max_per_domain: usize,
    pacing_ms: (u64, u64),
    domains: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Held while a request to `domain` is in flight. Dropping it releases the slot.
#[derive(Debug)]
pub struct DomainPermit {
    domain: String,
    _permit: OwnedSemaphorePermit,
}

impl DomainPermit {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_DOMAIN)
    }
}

impl RateLimiter {
    /// `max_per_domain` of 0 is treated as 1.
    pub fn new(max_per_domain: usize) -> Self {
        Self {
            max_per_domain: max_per_domain.max(1),
            pacing_ms: DEFAULT_PACING_MS,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Pacing range in milliseconds; `(0, 0)` disables it.
    pub fn with_pacing(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.pacing_ms = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        self
    }

    pub fn max_per_domain(&self) -> usize {
        self.max_per_domain
    }

    /// Random short sleep before acquiring, to spread bursts against one host.
    /// Not counted against the domain's concurrency.
    pub async fn pace(&self) {
        let (lo, hi) = self.pacing_ms;
        if hi == 0 {
            return;
        }
        let ms = rand::rng().random_range(lo..=hi);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Wait for a slot on `domain`. Never fails; only delays.
    pub async fn acquire(&self, domain: &str) -> DomainPermit {
        let sem = self.semaphore_for(domain);
        let permit = sem
            .acquire_owned()
            .await
            .expect("domain semaphores are never closed");
        DomainPermit {
            domain: domain.to_string(),
            _permit: permit,
        }
    }

    /// `pace` followed by `acquire`.
    pub async fn pace_and_acquire(&self, domain: &str) -> DomainPermit {
        self.pace().await;
        self.acquire(domain).await
    }

    /// Permits currently held for `domain` (0 for unknown domains).
    pub fn in_flight(&self, domain: &str) -> usize {
        self.domains
            .lock()
            .get(domain)
            .map(|s| self.max_per_domain - s.available_permits())
            .unwrap_or(0)
    }

    /// Number of domains seen so far.
    pub fn domain_count(&self) -> usize {
        self.domains.lock().len()
    }

    fn semaphore_for(&self, domain: &str) -> Arc<Semaphore> {
        let mut map = self.domains.lock();
        map.entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_domain)))
            .clone()
    }
}
