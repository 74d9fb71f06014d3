//! Time-to-live caches for aggregated departures and live snapshots.
//!
//! Two instances exist at runtime: a long-TTL one for per-stop service lists
//! and a short-TTL one for the shared live vehicle snapshot. Their staleness
//! tolerances differ by an order of magnitude, so they are never shared.
//!
//! Entries carry their own TTL. An override may shorten an entry's lifetime
//! (degraded data is kept briefly so upstream failures self-heal) but never
//! extends it past the cache default.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache as MokaCache;
use serde::Serialize;

/// Default TTL for per-stop service lists.
const TIMETABLE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default TTL for live vehicle snapshots.
const LIVE_TTL: Duration = Duration::from_secs(30);

/// Configuration for one cache instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default TTL for entries.
    pub ttl: Duration,

    /// Maximum number of cached entries.
    pub max_capacity: u64,
}

impl CacheConfig {
    /// Settings for the per-stop service cache.
    pub fn timetable() -> Self {
        Self {
            ttl: TIMETABLE_TTL,
            max_capacity: 1000,
        }
    }

    /// Settings for the live vehicle snapshot cache.
    pub fn live() -> Self {
        Self {
            ttl: LIVE_TTL,
            max_capacity: 16,
        }
    }

    /// Set a custom default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::timetable()
    }
}

/// Cache counters reported to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub key_count: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A cached value and the TTL it was stored with.
#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    ttl: Duration,
}

/// Expires each entry after its own TTL, measured from its last write.
struct EntryExpiry;

impl<K, V> Expiry<K, CacheEntry<V>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &K,
        entry: &CacheEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        entry: &CacheEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Key → value store with per-entry TTL and hit/miss accounting.
pub struct TimedCache<K, V> {
    entries: MokaCache<K, CacheEntry<V>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TimedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let entries = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self {
            entries,
            default_ttl: config.ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The TTL an entry gets when stored with the given override.
    fn effective_ttl(&self, ttl_override: Option<Duration>) -> Duration {
        ttl_override.map_or(self.default_ttl, |ttl| ttl.min(self.default_ttl))
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a live entry. Expired entries are reported as misses.
    pub async fn get(&self, key: &K) -> Option<V> {
        let found = self.entries.get(key).await.map(|e| e.value);
        self.record(found.is_some());
        found
    }

    /// Store an entry, replacing any previous one for the key.
    pub async fn set(&self, key: K, value: V, ttl_override: Option<Duration>) {
        let ttl = self.effective_ttl(ttl_override);
        self.entries.insert(key, CacheEntry { value, ttl }).await;
    }

    /// Get an entry, filling it with `init` on a miss.
    ///
    /// Concurrent misses for one key share a single `init` call. `init`
    /// returns the value and an optional TTL override. The returned flag is
    /// true when the value was served from the cache.
    pub async fn get_with<F>(&self, key: K, init: F) -> (V, bool)
    where
        F: Future<Output = (V, Option<Duration>)>,
    {
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(async {
                let (value, ttl_override) = init.await;
                CacheEntry {
                    value,
                    ttl: self.effective_ttl(ttl_override),
                }
            })
            .await;

        let hit = !entry.is_fresh();
        self.record(hit);
        (entry.into_value().value, hit)
    }

    /// Drop every entry and reset the counters.
    pub async fn flush_all(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Current key count and hit/miss counters.
    pub async fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks().await;
        CacheStats {
            key_count: self.entries.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn short_cache(ttl_ms: u64) -> TimedCache<String, u32> {
        TimedCache::new(&CacheConfig::timetable().with_ttl(Duration::from_millis(ttl_ms)))
    }

    #[test]
    fn default_configs() {
        assert_eq!(CacheConfig::timetable().ttl, Duration::from_secs(300));
        assert_eq!(CacheConfig::live().ttl, Duration::from_secs(30));
        assert_eq!(CacheConfig::default().ttl, CacheConfig::timetable().ttl);
    }

    #[test]
    fn override_only_shrinks_ttl() {
        let cache: TimedCache<String, u32> = TimedCache::new(&CacheConfig::timetable());
        assert_eq!(cache.effective_ttl(None), TIMETABLE_TTL);
        assert_eq!(
            cache.effective_ttl(Some(Duration::from_secs(60))),
            Duration::from_secs(60)
        );
        assert_eq!(
            cache.effective_ttl(Some(Duration::from_secs(3600))),
            TIMETABLE_TTL
        );
    }

    #[tokio::test]
    async fn get_set_counts_hits_and_misses() {
        let cache: TimedCache<String, u32> = TimedCache::new(&CacheConfig::timetable());

        assert_eq!(cache.get(&"a".to_string()).await, None);
        cache.set("a".to_string(), 7, None).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(7));
        assert_eq!(cache.get(&"a".to_string()).await, Some(7));

        let stats = cache.stats().await;
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = short_cache(50);
        cache.set("a".to_string(), 1, None).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn override_cannot_outlive_default() {
        let cache = short_cache(50);
        cache
            .set("a".to_string(), 1, Some(Duration::from_secs(60)))
            .await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn override_shortens_entry() {
        let cache: TimedCache<String, u32> = TimedCache::new(&CacheConfig::timetable());
        cache
            .set("short".to_string(), 1, Some(Duration::from_millis(50)))
            .await;
        cache.set("long".to_string(), 2, None).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&"short".to_string()).await, None);
        assert_eq!(cache.get(&"long".to_string()).await, Some(2));
    }

    #[tokio::test]
    async fn replacing_entry_resets_ttl() {
        let cache: TimedCache<String, u32> = TimedCache::new(&CacheConfig::timetable());
        cache
            .set("a".to_string(), 1, Some(Duration::from_millis(50)))
            .await;
        cache.set("a".to_string(), 2, None).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&"a".to_string()).await, Some(2));
    }

    #[tokio::test]
    async fn get_with_fills_then_hits() {
        let cache: TimedCache<String, u32> = TimedCache::new(&CacheConfig::timetable());

        let (value, hit) = cache.get_with("a".to_string(), async { (5, None) }).await;
        assert_eq!((value, hit), (5, false));

        let (value, hit) = cache.get_with("a".to_string(), async { (9, None) }).await;
        assert_eq!((value, hit), (5, true));
    }

    #[tokio::test]
    async fn get_with_coalesces_concurrent_misses() {
        let cache: TimedCache<String, u32> = TimedCache::new(&CacheConfig::timetable());
        let calls = AtomicUsize::new(0);

        let init = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            (3, None)
        };

        let (a, b) = tokio::join!(
            cache.get_with("k".to_string(), init()),
            cache.get_with("k".to_string(), init()),
        );

        assert_eq!(a.0, 3);
        assert_eq!(b.0, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flush_clears_keys_and_counters() {
        let cache: TimedCache<String, u32> = TimedCache::new(&CacheConfig::timetable());
        cache.set("a".to_string(), 1, None).await;
        cache.set("b".to_string(), 2, None).await;
        cache.get(&"a".to_string()).await;

        cache.flush_all().await;

        assert_eq!(cache.stats().await, CacheStats::default());
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }
}
