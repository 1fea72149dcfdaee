use crate::errors::Result;
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, FETCH_FAILURES_TOTAL};
use crate::model::{DeviceId, Tier};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cached value and the moment it was fetched. Replaced on refresh, never mutated.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub value: Arc<T>,
    pub fetched_at: Instant,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> CacheEntry<T> {
    fn new(value: Arc<T>, fetched_at: Instant) -> Self {
        Self { value, fetched_at }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Per-device TTL cache for one tier.
///
/// The map lock is only taken for lookups and inserts, never across the
/// fetch itself, so a slow request does not block other devices or tiers.
#[derive(Debug)]
pub struct TierCache<T> {
    tier: Tier,
    ttl: Duration,
    entries: Mutex<HashMap<DeviceId, CacheEntry<T>>>,
}

impl<T> TierCache<T> {
    pub fn new(tier: Tier, ttl: Duration) -> Self {
        Self {
            tier,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<DeviceId, CacheEntry<T>>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached value for `device` while it is fresh, otherwise
    /// awaits `fetch` and stores its result.
    ///
    /// The entry is stamped with the time the request started, so request
    /// latency does not extend the freshness window.
    ///
    /// A failed fetch is returned to the caller as-is; any older entry stays
    /// in place for the next call but is not served on this one.
    ///
    /// Concurrent misses for the same device are not coalesced; each caller
    /// fetches and the last insert wins.
    pub async fn get<F, Fut>(&self, device: &DeviceId, fetch: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cached = self
            .entries()
            .get(device)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| Arc::clone(&entry.value));

        if let Some(value) = cached {
            debug!("{} cache hit for {}", self.tier, device);
            CACHE_HITS_TOTAL.with_label_values(&[self.tier.as_str()]).inc();
            return Ok(value);
        }

        debug!("{} cache miss for {}, fetching", self.tier, device);
        CACHE_MISSES_TOTAL.with_label_values(&[self.tier.as_str()]).inc();

        let requested_at = Instant::now();
        match fetch().await {
            Ok(value) => {
                let value = Arc::new(value);
                self.entries().insert(
                    device.clone(),
                    CacheEntry::new(Arc::clone(&value), requested_at),
                );
                Ok(value)
            }
            Err(e) => {
                warn!("{} fetch for {} failed: {}", self.tier, device, e);
                FETCH_FAILURES_TOTAL
                    .with_label_values(&[self.tier.as_str()])
                    .inc();
                Err(e)
            }
        }
    }

    /// Stored entry for `device` regardless of its age.
    pub fn peek(&self, device: &DeviceId) -> Option<CacheEntry<T>> {
        self.entries().get(device).cloned()
    }

    pub fn invalidate(&self, device: &DeviceId) -> bool {
        let removed = self.entries().remove(device).is_some();
        if removed {
            debug!("Invalidated {} cache for {}", self.tier, device);
        }
        removed
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        info!("Cleared {} {} cache entries", count, self.tier);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
