//! TTL cache for list fetches with single-flight refresh and stale fallback.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Cache key for the local enforcer's banned set.
pub const LOCAL_BANNED: &str = "local-banned";
/// Cache key for the registry's blocked set.
pub const REMOTE_BLOCKED: &str = "remote-blocked";
/// Cache key for the registry's allowed set.
pub const REMOTE_ALLOWED: &str = "remote-allowed";

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from a fresh entry without fetching.
    Cached,
    /// Fetched just now.
    Fetched,
    /// The fetch failed and an expired entry was served instead.
    Stale,
}

/// A value plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<V> {
    /// The value.
    pub value: V,
    /// Origin of the value.
    pub freshness: Freshness,
}

struct Entry<V> {
    value: V,
    fetched_at: Instant,
    valid: bool,
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<Entry<V>>>>;

/// Thread-safe TTL cache keyed by name.
///
/// Each key has its own async lock held across the fetch, so concurrent
/// misses on one key trigger a single fetch and the waiters reuse its result.
pub struct TtlCache<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache whose entries stay fresh for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Freshness window.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, fetching it when missing or expired.
    pub async fn get<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        self.lookup(key, fetch).await.map(|l| l.value)
    }

    /// Like [`get`](Self::get), also reporting whether the value is stale.
    ///
    /// A failed fetch falls back to the previous value for `key` if there is
    /// one, and the entry is left untouched; otherwise the error is returned.
    pub async fn lookup<F, Fut, E>(&self, key: &str, fetch: F) -> Result<Lookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(current) = entry.as_ref() {
            if current.valid && current.fetched_at.elapsed() < self.ttl {
                debug!(key, "cache hit");
                return Ok(Lookup {
                    value: current.value.clone(),
                    freshness: Freshness::Cached,
                });
            }
        }

        match fetch().await {
            Ok(value) => {
                debug!(key, "cache refreshed");
                *entry = Some(Entry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                    valid: true,
                });
                Ok(Lookup {
                    value,
                    freshness: Freshness::Fetched,
                })
            }
            Err(error) => match entry.as_ref() {
                Some(stale) => {
                    warn!(
                        key,
                        age_secs = stale.fetched_at.elapsed().as_secs(),
                        %error,
                        "fetch failed, serving stale value (degraded)"
                    );
                    Ok(Lookup {
                        value: stale.value.clone(),
                        freshness: Freshness::Stale,
                    })
                }
                None => Err(error),
            },
        }
    }

    /// Force the next lookup of `key` to fetch.
    ///
    /// The old value is kept as the stale fallback.
    pub async fn invalidate(&self, key: &str) {
        let slot = self.lock_slots().get(key).cloned();
        if let Some(slot) = slot {
            if let Some(entry) = slot.lock().await.as_mut() {
                entry.valid = false;
                debug!(key, "cache entry invalidated");
            }
        }
    }

    /// Drop every entry, including stale fallbacks.
    pub fn clear(&self) {
        self.lock_slots().clear();
    }

    fn slot(&self, key: &str) -> Slot<V> {
        Arc::clone(self.lock_slots().entry(key.to_string()).or_default())
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
