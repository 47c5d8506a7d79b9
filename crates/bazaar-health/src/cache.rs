//! Health result cache with outcome-dependent TTLs
//!
//! Healthy results are trusted longer than unhealthy ones so a recovering
//! service is re-probed sooner than a stable one.

use crate::probe::HealthCheckResult;
use bazaar_core::{SharedClock, SystemClock};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::trace;

/// Cache TTL settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCacheConfig {
    /// How long a healthy result is served from cache
    #[serde(with = "humantime_serde")]
    pub healthy_ttl: Duration,

    /// How long an unhealthy result is served from cache
    #[serde(with = "humantime_serde")]
    pub unhealthy_ttl: Duration,
}

impl Default for HealthCacheConfig {
    fn default() -> Self {
        Self {
            healthy_ttl: Duration::from_secs(30),
            unhealthy_ttl: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: HealthCheckResult,
    expires_at: Instant,
}

/// Per-service cache of the last probe result
#[derive(Debug)]
pub struct HealthCache {
    config: HealthCacheConfig,
    entries: DashMap<String, CacheEntry>,
    clock: SharedClock,
}

impl HealthCache {
    /// Create a cache using the system clock
    pub fn new(config: HealthCacheConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a cache driven by `clock`
    pub fn with_clock(config: HealthCacheConfig, clock: SharedClock) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            clock,
        }
    }

    /// TTL settings
    pub fn config(&self) -> &HealthCacheConfig {
        &self.config
    }

    /// TTL applied to `result`
    pub fn ttl_for(&self, result: &HealthCheckResult) -> Duration {
        if result.healthy {
            self.config.healthy_ttl
        } else {
            self.config.unhealthy_ttl
        }
    }

    /// Fresh result for `service_id`, if any
    pub fn get(&self, service_id: &str) -> Option<HealthCheckResult> {
        let now = self.clock.now();
        let entry = self.entries.get(service_id)?;

        if now < entry.expires_at {
            trace!(service = %service_id, "Health cache hit");
            Some(entry.result.clone())
        } else {
            trace!(service = %service_id, "Health cache entry expired");
            None
        }
    }

    /// Store `result`, replacing any previous entry
    pub fn insert(&self, service_id: impl Into<String>, result: HealthCheckResult) {
        let expires_at = self.clock.now() + self.ttl_for(&result);
        self.entries
            .insert(service_id.into(), CacheEntry { result, expires_at });
    }

    /// Drop the entry for `service_id`
    pub fn invalidate(&self, service_id: &str) -> bool {
        self.entries.remove(service_id).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let live = now < entry.expires_at;
            if !live {
                purged += 1;
            }
            live
        });
        purged
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
