//! Bounded optimization-plan cache with TTL expiry and LRU eviction
//!
//! Plans are keyed by a SHA-256 hash of the discriminating requirement and
//! user-context fields (see [`key`]). Only plans that clear a minimum
//! savings threshold are admitted. Expiry is enforced on every read; the
//! periodic [`spawn_cleanup`] task only reclaims memory earlier.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod clock;
pub mod key;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vibe_config::CacheConfig;
use vibe_core::OptimizationPlan;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{ContextKey, RequirementKey, generate_cache_key};

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Export or import payload could not be (de)serialized
    #[error("serialization: {0}")]
    Serialization(String),
}

/// Persisted form of a cache entry
///
/// Field names are part of the hand-off format and must round-trip verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub key: String,
    pub result: OptimizationPlan,
    /// Insertion time, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Last successful read, milliseconds since the Unix epoch
    pub last_accessed: u64,
    pub savings_percentage: f64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub total_requests: u64,
    /// Hits over total requests, 0 when nothing has been requested
    pub hit_ratio: f64,
    pub eviction_count: u64,
    /// Entries reclaimed by `cleanup_expired`
    pub expired_count: u64,
    /// Estimated bytes held by keys and plans
    pub memory_usage: usize,
}

#[derive(Debug)]
struct Entry {
    plan: OptimizationPlan,
    timestamp: u64,
    last_accessed: u64,
    savings_percentage: f64,
}

/// Optimization plan cache shared across in-flight routing requests
pub struct OptimizationCache {
    entries: Mutex<LruCache<String, Entry>>,
    max_size: NonZeroUsize,
    ttl_millis: u64,
    min_savings_threshold: f64,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl OptimizationCache {
    /// Create a cache driven by the system clock
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache driven by the given clock
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let max_size = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(max_size)),
            max_size,
            ttl_millis: clock::duration_millis(config.ttl),
            min_savings_threshold: config.min_savings_threshold,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    const fn is_expired(&self, timestamp: u64, now: u64) -> bool {
        now.saturating_sub(timestamp) > self.ttl_millis
    }

    /// Look up a plan
    ///
    /// Absent and expired entries are both misses. An expired entry is
    /// dropped on the way out without counting as a cleanup removal.
    pub fn get(&self, requirements: &impl RequirementKey, context: &impl ContextKey) -> Option<OptimizationPlan> {
        let key = generate_cache_key(requirements, context);
        self.get_by_key(&key)
    }

    /// Look up a plan by precomputed key
    pub fn get_by_key(&self, key: &str) -> Option<OptimizationPlan> {
        let now = self.clock.now_millis();
        let mut entries = self.lock();

        let Some(expired) = entries.peek(key).map(|entry| self.is_expired(entry.timestamp, now)) else {
            drop(entries);
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache_key = key, "optimization cache miss");
            return None;
        };

        if expired {
            entries.pop(key);
            drop(entries);
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache_key = key, "optimization cache entry expired");
            return None;
        }

        // Promotes the entry to most recently used
        let plan = entries.get_mut(key).map(|entry| {
            entry.last_accessed = now;
            entry.plan.clone()
        });
        drop(entries);

        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(cache_key = key, "optimization cache hit");
        plan
    }

    /// Store a plan if its savings clear the configured threshold
    ///
    /// Returns `false` without touching the cache when the plan carries no
    /// savings or its savings percentage is below the threshold (which
    /// includes every plan that made cost worse).
    pub fn set(&self, requirements: &impl RequirementKey, context: &impl ContextKey, plan: OptimizationPlan) -> bool {
        let key = generate_cache_key(requirements, context);
        self.set_by_key(key, plan)
    }

    /// Store a plan under a precomputed key
    pub fn set_by_key(&self, key: String, plan: OptimizationPlan) -> bool {
        let Some(percentage) = plan.savings_percentage() else {
            tracing::debug!(cache_key = %key, "plan without token savings not cached");
            return false;
        };

        // NaN fails this comparison too
        if !(percentage >= self.min_savings_threshold) {
            tracing::debug!(
                cache_key = %key,
                percentage,
                threshold = self.min_savings_threshold,
                "plan below savings threshold not cached"
            );
            return false;
        }

        let now = self.clock.now_millis();
        self.insert(key, plan, now, now, percentage);
        true
    }

    /// Insert under the lock, evicting the least recently accessed entry when full
    fn insert(&self, key: String, plan: OptimizationPlan, timestamp: u64, last_accessed: u64, savings_percentage: f64) {
        let entry = Entry {
            plan,
            timestamp,
            last_accessed,
            savings_percentage,
        };

        let mut entries = self.lock();
        let replaced = entries.contains(&key);
        let displaced = entries.push(key, entry);
        drop(entries);

        // `push` hands back the old value on overwrite and the LRU pair on eviction
        if !replaced && let Some((victim, _)) = displaced {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache_key = %victim, "evicted least recently used plan");
        }
    }

    /// Remove every entry older than the TTL, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.lock();

        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry.timestamp, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        drop(entries);
        let removed = stale.len();

        if removed > 0 {
            self.expired.fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(removed, "purged expired optimization plans");
        }

        removed
    }

    /// Drop every entry, keeping counters
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of counters and size
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let (size, memory_usage) = {
            let entries = self.lock();
            let memory = entries
                .iter()
                .map(|(key, entry)| key.len() + vibe_core::estimate_size(&entry.plan) + std::mem::size_of::<Entry>())
                .sum();
            (entries.len(), memory)
        };

        let hit_count = self.hits.load(Ordering::Relaxed);
        let miss_count = self.misses.load(Ordering::Relaxed);
        let total_requests = hit_count + miss_count;
        let hit_ratio = if total_requests == 0 {
            0.0
        } else {
            hit_count as f64 / total_requests as f64
        };

        CacheStats {
            size,
            hit_count,
            miss_count,
            total_requests,
            hit_ratio,
            eviction_count: self.evictions.load(Ordering::Relaxed),
            expired_count: self.expired.load(Ordering::Relaxed),
            memory_usage,
        }
    }

    /// Export every entry, least recently accessed first
    pub fn export(&self) -> Vec<CacheRecord> {
        self.lock()
            .iter()
            .rev()
            .map(|(key, entry)| CacheRecord {
                key: key.clone(),
                result: entry.plan.clone(),
                timestamp: entry.timestamp,
                last_accessed: entry.last_accessed,
                savings_percentage: entry.savings_percentage,
            })
            .collect()
    }

    /// Import previously exported records, returning how many were admitted
    ///
    /// Records already past the TTL are skipped. Recency follows each
    /// record's `last_accessed`, so the most recently used records survive
    /// if the import overflows `max_size`.
    pub fn import(&self, records: Vec<CacheRecord>) -> usize {
        let now = self.clock.now_millis();
        let mut records: Vec<_> = records
            .into_iter()
            .filter(|record| !self.is_expired(record.timestamp, now))
            .collect();
        records.sort_by_key(|record| record.last_accessed);

        let imported = records.len();
        for record in records {
            self.insert(
                record.key,
                record.result,
                record.timestamp,
                record.last_accessed,
                record.savings_percentage,
            );
        }

        tracing::debug!(imported, "imported optimization plans");
        imported
    }

    /// Export as a JSON array
    pub fn export_json(&self) -> Result<String, CacheError> {
        serde_json::to_string(&self.export()).map_err(|e| CacheError::Serialization(format!("serialize: {e}")))
    }

    /// Import from a JSON array produced by [`Self::export_json`]
    pub fn import_json(&self, json: &str) -> Result<usize, CacheError> {
        let records: Vec<CacheRecord> =
            serde_json::from_str(json).map_err(|e| CacheError::Serialization(format!("deserialize: {e}")))?;
        Ok(self.import(records))
    }
}

impl std::fmt::Debug for OptimizationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationCache")
            .field("max_size", &self.max_size)
            .field("ttl_millis", &self.ttl_millis)
            .field("min_savings_threshold", &self.min_savings_threshold)
            .finish_non_exhaustive()
    }
}

/// Periodically purge expired entries until `shutdown` is cancelled
///
/// Must be called from within a tokio runtime.
pub fn spawn_cleanup(cache: Arc<OptimizationCache>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    cache.cleanup_expired();
                }
            }
        }

        tracing::debug!("optimization cache cleanup stopped");
    })
}

#[cfg(test)]
mod tests {
    use vibe_core::{
        Complexity, ContextSummary, EssentialRequirements, Requirements, TokenSavings, UserContext, UserType,
    };

    use super::*;

    fn config(max_size: usize, ttl: Duration) -> CacheConfig {
        CacheConfig {
            max_size,
            ttl,
            ..CacheConfig::default()
        }
    }

    fn plan(percentage: f64) -> OptimizationPlan {
        OptimizationPlan {
            token_savings: Some(TokenSavings {
                baseline: 1000,
                optimized: 600,
                saved: 400,
                percentage,
            }),
            ..OptimizationPlan::default()
        }
    }

    fn requirements(name: &str) -> Requirements {
        Requirements::default().with_explicit([name])
    }

    fn context() -> UserContext {
        UserContext::default()
    }

    #[test]
    fn miss_then_hit() {
        let cache = OptimizationCache::new(&CacheConfig::default());
        assert!(cache.get(&requirements("a"), &context()).is_none());

        assert!(cache.set(&requirements("a"), &context(), plan(40.0)));
        let hit = cache.get(&requirements("a"), &context()).unwrap();
        assert_eq!(hit, plan(40.0));

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.total_requests, 2);
        assert!((stats.hit_ratio - 0.5).abs() < f64::EPSILON);
        assert!(stats.memory_usage > 0);
    }

    #[test]
    fn below_threshold_is_rejected() {
        let cache = OptimizationCache::new(&CacheConfig::default());
        assert!(!cache.set(&requirements("a"), &context(), plan(20.0)));
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn threshold_is_inclusive() {
        let cache = OptimizationCache::new(&CacheConfig::default());
        assert!(cache.set(&requirements("a"), &context(), plan(30.0)));
    }

    #[test]
    fn plan_without_savings_is_rejected() {
        let cache = OptimizationCache::new(&CacheConfig::default());
        assert!(!cache.set(&requirements("a"), &context(), OptimizationPlan::default()));
        assert!(cache.is_empty());
    }

    #[test]
    fn cost_regression_is_rejected_even_with_zero_threshold() {
        let cache = OptimizationCache::new(&CacheConfig {
            min_savings_threshold: 0.0,
            ..CacheConfig::default()
        });
        assert!(!cache.set(&requirements("a"), &context(), plan(-12.5)));
        assert!(!cache.set(&requirements("b"), &context(), plan(f64::NAN)));
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_accessed_not_oldest_inserted() {
        let cache = OptimizationCache::new(&config(2, Duration::from_secs(60)));

        assert!(cache.set(&requirements("first"), &context(), plan(50.0)));
        assert!(cache.set(&requirements("second"), &context(), plan(50.0)));

        // Touch the first entry so the second becomes least recent
        assert!(cache.get(&requirements("first"), &context()).is_some());

        assert!(cache.set(&requirements("third"), &context(), plan(50.0)));

        assert!(cache.get(&requirements("first"), &context()).is_some());
        assert!(cache.get(&requirements("second"), &context()).is_none());
        assert!(cache.get(&requirements("third"), &context()).is_some());
        assert_eq!(cache.stats().eviction_count, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn overwriting_existing_key_does_not_evict() {
        let cache = OptimizationCache::new(&config(2, Duration::from_secs(60)));
        assert!(cache.set(&requirements("a"), &context(), plan(50.0)));
        assert!(cache.set(&requirements("b"), &context(), plan(50.0)));
        assert!(cache.set(&requirements("a"), &context(), plan(70.0)));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().eviction_count, 0);
        assert_eq!(cache.get(&requirements("a"), &context()).unwrap(), plan(70.0));
    }

    #[test]
    fn export_lists_least_recent_first() {
        let cache = OptimizationCache::new(&config(3, Duration::from_secs(60)));
        for name in ["a", "b", "c"] {
            assert!(cache.set(&requirements(name), &context(), plan(50.0)));
        }
        assert!(cache.get(&requirements("a"), &context()).is_some());

        let keys: Vec<String> = cache.export().into_iter().map(|r| r.key).collect();
        let expected: Vec<String> = ["b", "c", "a"]
            .iter()
            .map(|name| generate_cache_key(&requirements(name), &context()))
            .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn expired_entry_reads_as_miss_and_is_dropped() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = OptimizationCache::with_clock(&config(10, Duration::from_millis(50)), clock.clone());

        assert!(cache.set(&requirements("a"), &context(), plan(50.0)));
        assert!(cache.get(&requirements("a"), &context()).is_some());

        clock.advance(Duration::from_millis(150));

        assert!(cache.get(&requirements("a"), &context()).is_none());
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        // Lazy removal on read is not a cleanup event
        assert_eq!(stats.expired_count, 0);
    }

    #[test]
    fn expiry_with_real_time() {
        let cache = OptimizationCache::new(&config(10, Duration::from_millis(50)));
        assert!(cache.set(&requirements("a"), &context(), plan(50.0)));
        assert!(cache.get(&requirements("a"), &context()).is_some());

        std::thread::sleep(Duration::from_millis(150));

        assert!(cache.get(&requirements("a"), &context()).is_none());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn cleanup_removes_and_counts_expired() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = OptimizationCache::with_clock(&config(10, Duration::from_secs(10)), clock.clone());

        assert!(cache.set(&requirements("old-1"), &context(), plan(50.0)));
        assert!(cache.set(&requirements("old-2"), &context(), plan(50.0)));
        clock.advance(Duration::from_secs(8));
        assert!(cache.set(&requirements("fresh"), &context(), plan(50.0)));
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.cleanup_expired(), 2);
        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.expired_count, 2);
        assert!(cache.get(&requirements("fresh"), &context()).is_some());
    }

    #[test]
    fn export_import_round_trip_skips_expired() {
        let clock = Arc::new(ManualClock::new(10_000));
        let source = OptimizationCache::with_clock(&config(10, Duration::from_secs(60)), clock.clone());

        assert!(source.set(&requirements("a"), &context(), plan(45.0)));
        clock.advance(Duration::from_secs(30));
        assert!(source.set(&requirements("b"), &context(), plan(55.0)));

        let json = source.export_json().unwrap();
        assert!(json.contains("\"lastAccessed\""));
        assert!(json.contains("\"savingsPercentage\""));

        // Forty more seconds: "a" is now 70s old, past the 60s TTL
        clock.advance(Duration::from_secs(40));
        let target = OptimizationCache::with_clock(&config(10, Duration::from_secs(60)), clock);
        assert_eq!(target.import_json(&json).unwrap(), 1);
        assert!(target.get(&requirements("a"), &context()).is_none());
        assert_eq!(target.get(&requirements("b"), &context()).unwrap(), plan(55.0));
    }

    #[test]
    fn export_preserves_fields_verbatim() {
        let clock = Arc::new(ManualClock::new(5_000));
        let cache = OptimizationCache::with_clock(&config(10, Duration::from_secs(60)), clock);
        assert!(cache.set(&requirements("a"), &context(), plan(45.0)));

        let records = cache.export();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, generate_cache_key(&requirements("a"), &context()));
        assert_eq!(records[0].timestamp, 5_000);
        assert_eq!(records[0].last_accessed, 5_000);
        assert!((records[0].savings_percentage - 45.0).abs() < f64::EPSILON);
    }

    #[test]
    fn import_overflow_keeps_most_recent() {
        let cache = OptimizationCache::with_clock(&config(2, Duration::from_secs(600)), Arc::new(ManualClock::new(1_000)));
        let record = |key: &str, last_accessed| CacheRecord {
            key: key.to_owned(),
            result: plan(50.0),
            timestamp: 900,
            last_accessed,
            savings_percentage: 50.0,
        };

        let imported = cache.import(vec![record("c", 990), record("a", 910), record("b", 950)]);
        assert_eq!(imported, 3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_by_key("a").is_none());
        assert!(cache.get_by_key("b").is_some());
        assert!(cache.get_by_key("c").is_some());
    }

    #[test]
    fn malformed_import_is_an_error() {
        let cache = OptimizationCache::new(&CacheConfig::default());
        let err = cache.import_json("{not json").unwrap_err();
        assert!(err.to_string().starts_with("serialization"));
    }

    #[test]
    fn essential_shape_keys_work() {
        let cache = OptimizationCache::new(&CacheConfig::default());
        let essential = EssentialRequirements {
            explicit: vec!["cart".to_owned()],
            complexity: Complexity::Low,
            ..EssentialRequirements::default()
        };
        let summary = ContextSummary {
            user_type: UserType::Entrepreneur,
            ..ContextSummary::default()
        };
        assert!(cache.set(&essential, &summary, plan(60.0)));
        assert!(cache.get(&essential, &summary).is_some());
    }

    #[test]
    fn concurrent_inserts_never_exceed_capacity() {
        let cache = Arc::new(OptimizationCache::new(&config(10, Duration::from_secs(60))));

        std::thread::scope(|scope| {
            for i in 0..50 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    assert!(cache.set(&requirements(&format!("req-{i}")), &context(), plan(50.0)));
                    assert!(cache.len() <= 10);
                });
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.size, 10);
        assert_eq!(stats.eviction_count, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_purges_until_cancelled() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(OptimizationCache::with_clock(
            &config(10, Duration::from_secs(1)),
            clock.clone(),
        ));
        assert!(cache.set(&requirements("a"), &context(), plan(50.0)));
        clock.advance(Duration::from_secs(5));

        let shutdown = CancellationToken::new();
        let handle = spawn_cleanup(Arc::clone(&cache), Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.stats().expired_count, 1);
        assert!(cache.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
