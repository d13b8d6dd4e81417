use std::num::NonZeroUsize;
use std::time::Instant;

use chrono::Duration;
use log::{debug, trace, warn};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::Result;
use crate::item::{ClientData, FeatureFlagStoreItem, FeatureFlagStoreMeta};
use crate::store::FeatureFlagStore;

const DEFAULT_TTL_SECS: i64 = 15;
const DEFAULT_SIZE: usize = 5000;

/// CacheConfig controls how long flags stay cached and how many are kept.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "CacheConfigFields")]
pub struct CacheConfig {
    /// Entries older than this are refetched. Zero or negative disables serving from cache.
    pub ttl: Duration,
    /// Maximum number of cached flags, least recently used evicted first. None is unbounded.
    pub size: Option<NonZeroUsize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
            size: NonZeroUsize::new(DEFAULT_SIZE),
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_ttl_secs(self, secs: f64) -> Self {
        self.with_ttl(Duration::microseconds((secs * 1_000_000.0) as i64))
    }

    pub fn with_size(mut self, size: Option<NonZeroUsize>) -> Self {
        self.size = size;
        self
    }
}

#[derive(Deserialize)]
struct CacheConfigFields {
    #[serde(default = "default_ttl_secs")]
    ttl_secs: f64,
    #[serde(default = "default_size")]
    size: Option<usize>,
}

fn default_ttl_secs() -> f64 {
    DEFAULT_TTL_SECS as f64
}

fn default_size() -> Option<usize> {
    Some(DEFAULT_SIZE)
}

impl From<CacheConfigFields> for CacheConfig {
    fn from(fields: CacheConfigFields) -> Self {
        CacheConfig::default()
            .with_ttl_secs(fields.ttl_secs)
            .with_size(fields.size.and_then(NonZeroUsize::new))
    }
}

// A cached lookup result. `item` is None when the store had no such flag. `read_at` is when the
// store read began (or when a write completed), so the entry reflects store state no older than it.
struct CacheEntry {
    item: Option<FeatureFlagStoreItem>,
    read_at: Instant,
}

/// CachedFeatureFlagStore fronts a slower store with a TTL-bounded LRU cache.
///
/// Reads go through the cache and remember misses as well as hits. Writes go to the wrapped store
/// first and then refresh the cached entry, so a reader never sees the pre-write value once the
/// write has returned. An entry is only replaced by a result read no earlier than it, so a slow
/// read that started before a write cannot overwrite the write's entry. `list` is always
/// answered by the wrapped store.
pub struct CachedFeatureFlagStore<S> {
    store: S,
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl<S: FeatureFlagStore> CachedFeatureFlagStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, CacheConfig::default())
    }

    pub fn with_config(store: S, config: CacheConfig) -> Self {
        let cache = match config.size {
            Some(size) => LruCache::new(size),
            None => LruCache::unbounded(),
        };
        CachedFeatureFlagStore {
            store,
            cache: Mutex::new(cache),
            ttl: config.ttl,
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Change the TTL. Existing entries are judged against the new value on their next lookup.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// Number of cached entries, negative ones included.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    // Freshness is tested and the value read under one lock, so an entry cannot expire between
    // the two. A None return always leads to a store fetch.
    fn lookup(&self, feature_name: &str) -> Option<Option<FeatureFlagStoreItem>> {
        let mut cache = self.cache.lock();
        let entry = cache.get(feature_name)?;
        if self.is_fresh(entry) {
            return Some(entry.item.clone());
        }
        None
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        if self.ttl <= Duration::zero() {
            return false;
        }
        match Duration::from_std(entry.read_at.elapsed()) {
            Ok(age) => age < self.ttl,
            Err(_) => false,
        }
    }

    // Newer entries win: a result read before the cached entry was taken is dropped.
    fn remember(&self, feature_name: &str, item: Option<FeatureFlagStoreItem>, read_at: Instant) {
        let mut cache = self.cache.lock();
        if let Some(existing) = cache.peek(feature_name) {
            if existing.read_at > read_at {
                trace!("Discarding stale read of feature flag {}", feature_name);
                return;
            }
        }
        cache.put(feature_name.to_string(), CacheEntry { item, read_at });
    }

    fn fetch(&self, feature_name: &str) -> Result<Option<FeatureFlagStoreItem>> {
        let read_at = Instant::now();
        let item = self.store.get(feature_name)?;
        self.remember(feature_name, item.clone(), read_at);
        Ok(item)
    }

    // Re-read a flag after writing it. If the read fails the entry is dropped, so the next get
    // goes to the store instead of serving the pre-write value.
    fn refresh(&self, feature_name: &str) -> Result<()> {
        if let Err(e) = self.fetch(feature_name) {
            warn!("Could not refresh cached feature flag {}: {}", feature_name, e);
            self.cache.lock().pop(feature_name);
            return Err(e);
        }
        Ok(())
    }
}

impl<S: FeatureFlagStore> FeatureFlagStore for CachedFeatureFlagStore<S> {
    fn create(
        &self,
        feature_name: &str,
        is_enabled: bool,
        client_data: Option<ClientData>,
    ) -> Result<FeatureFlagStoreItem> {
        let item = self.store.create(feature_name, is_enabled, client_data)?;
        self.remember(feature_name, Some(item.clone()), Instant::now());
        Ok(item)
    }

    fn get(&self, feature_name: &str) -> Result<Option<FeatureFlagStoreItem>> {
        if let Some(item) = self.lookup(feature_name) {
            trace!("Cache hit for feature flag {}", feature_name);
            return Ok(item);
        }
        debug!("Cache miss for feature flag {}, reading from store", feature_name);
        self.fetch(feature_name)
    }

    fn set(&self, feature_name: &str, is_enabled: bool) -> Result<()> {
        self.store.set(feature_name, is_enabled)?;
        self.refresh(feature_name)
    }

    fn delete(&self, feature_name: &str) -> Result<()> {
        self.store.delete(feature_name)?;
        self.remember(feature_name, None, Instant::now());
        Ok(())
    }

    fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<FeatureFlagStoreItem>> {
        self.store.list(limit, offset)
    }

    fn set_meta(&self, feature_name: &str, meta: FeatureFlagStoreMeta) -> Result<()> {
        self.store.set_meta(feature_name, meta)?;
        self.refresh(feature_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_common::{condition, names, CountingStore, NOW};
    use proptest::prelude::*;
    use spectral::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration as StdDuration;

    fn cached(ttl_secs: f64) -> (Arc<CountingStore>, CachedFeatureFlagStore<Arc<CountingStore>>) {
        let slow = Arc::new(CountingStore::new());
        let cache = CachedFeatureFlagStore::with_config(
            slow.clone(),
            CacheConfig::default().with_ttl_secs(ttl_secs),
        );
        (slow, cache)
    }

    #[test]
    fn config_defaults() {
        let config = CacheConfig::default();
        assert_that!(config.ttl).is_equal_to(Duration::seconds(15));
        assert_that!(config.size).contains_value(NonZeroUsize::new(5000).unwrap());
    }

    #[test]
    fn config_fractional_and_negative_ttl() {
        assert_that!(CacheConfig::default().with_ttl_secs(0.25).ttl)
            .is_equal_to(Duration::milliseconds(250));
        assert_that!(CacheConfig::default().with_ttl_secs(-10.0).ttl)
            .is_equal_to(Duration::seconds(-10));
    }

    #[test]
    fn config_deserialization() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"ttl_secs": 1.5, "size": 10}"#).unwrap();
        assert_that!(config.ttl).is_equal_to(Duration::milliseconds(1500));
        assert_that!(config.size).contains_value(NonZeroUsize::new(10).unwrap());

        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_that!(config).is_equal_to(CacheConfig::default());

        let config: CacheConfig = serde_json::from_str(r#"{"size": null}"#).unwrap();
        assert_that!(config.size).is_none();
    }

    #[test]
    fn create_is_served_from_cache() {
        let (slow, cache) = cached(100.0);
        let created = cache.create("flag", true, None).unwrap();
        assert_that!(cache.get("flag").unwrap()).contains_value(&created);
        assert_that!(slow.gets()).is_equal_to(0);
    }

    #[test]
    fn reads_within_ttl_ignore_store_changes() {
        let (slow, mut cache) = cached(100.0);
        cache.create("flag", false, None).unwrap();

        slow.set("flag", true).unwrap();
        let item = cache.get("flag").unwrap().unwrap();
        assert_that!(item.raw_is_enabled()).is_false();

        cache.set_ttl(Duration::seconds(-10));
        let item = cache.get("flag").unwrap().unwrap();
        assert_that!(item.raw_is_enabled()).is_true();
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (slow, cache) = cached(0.05);
        cache.create("flag", false, None).unwrap();
        slow.set("flag", true).unwrap();

        thread::sleep(StdDuration::from_millis(80));
        assert_that!(cache.get("flag").unwrap().unwrap().raw_is_enabled()).is_true();
        assert_that!(slow.gets()).is_equal_to(1);
    }

    #[test]
    fn non_positive_ttl_always_refetches() {
        let (slow, cache) = cached(0.0);
        cache.create("flag", true, None).unwrap();
        for _ in 0..3 {
            assert_that!(cache.get("flag").unwrap()).is_some();
        }
        assert_that!(slow.gets()).is_equal_to(3);
    }

    #[test]
    fn missing_flags_are_remembered() {
        let (slow, cache) = cached(100.0);
        for _ in 0..5 {
            assert_that!(cache.get("nope").unwrap()).is_none();
        }
        assert_that!(slow.gets()).is_equal_to(1);
    }

    #[test]
    fn create_replaces_remembered_miss() {
        let (_, cache) = cached(100.0);
        assert_that!(cache.get("flag").unwrap()).is_none();
        cache.create("flag", true, None).unwrap();
        assert_that!(cache.get("flag").unwrap()).is_some();
    }

    #[test]
    fn set_writes_through() {
        let (slow, cache) = cached(100.0);
        cache.create("flag", false, None).unwrap();
        cache.set("flag", true).unwrap();

        assert_that!(slow.inner_get("flag").raw_is_enabled()).is_true();
        let gets = slow.gets();
        assert_that!(cache.get("flag").unwrap().unwrap().raw_is_enabled()).is_true();
        assert_that!(slow.gets()).is_equal_to(gets);
    }

    #[test]
    fn set_meta_writes_through() {
        let (slow, cache) = cached(100.0);
        cache.create("flag", true, None).unwrap();
        let meta = FeatureFlagStoreMeta::new(NOW, None).with_conditions(vec![condition("a", 1)]);
        cache.set_meta("flag", meta.clone()).unwrap();

        assert_that!(slow.inner_get("flag").meta).is_equal_to(&meta);
        assert_that!(cache.get("flag").unwrap().unwrap().meta).is_equal_to(&meta);
    }

    #[test]
    fn set_meta_on_missing_flag_fails_without_caching() {
        let (_, cache) = cached(100.0);
        let result = cache.set_meta("nope", FeatureFlagStoreMeta::new(NOW, None));
        assert!(matches!(result, Err(Error::FlagNotFound(_))));
        assert_that!(cache.cached_len()).is_equal_to(0);
    }

    #[test]
    fn slow_read_does_not_overwrite_later_write() {
        let slow = Arc::new(CountingStore::with_first_read_stall(StdDuration::from_millis(150)));
        let cache = Arc::new(CachedFeatureFlagStore::with_config(
            slow.clone(),
            CacheConfig::default().with_ttl_secs(100.0),
        ));
        slow.create("flag", false, None).unwrap();

        let reader = {
            let cache = cache.clone();
            thread::spawn(move || cache.get("flag").unwrap())
        };
        thread::sleep(StdDuration::from_millis(30));
        cache.set("flag", true).unwrap();
        assert_that!(reader.join().unwrap()).is_some();

        let item = cache.get("flag").unwrap().unwrap();
        assert_that!(item.raw_is_enabled()).is_true();
        assert_that!(item).is_equal_to(slow.inner_get("flag"));
    }

    #[test]
    fn failed_refresh_after_write_drops_entry() {
        let (slow, cache) = cached(100.0);
        cache.create("flag", false, None).unwrap();

        slow.fail_reads(true);
        assert!(matches!(cache.set("flag", true), Err(Error::Store(_))));
        assert_that!(slow.inner_get("flag").raw_is_enabled()).is_true();
        assert_that!(cache.cached_len()).is_equal_to(0);

        slow.fail_reads(false);
        assert_that!(cache.get("flag").unwrap().unwrap().raw_is_enabled()).is_true();
    }

    #[test]
    fn accessors_expose_store_and_ttl() {
        let (slow, mut cache) = cached(2.5);
        assert_that!(cache.ttl()).is_equal_to(Duration::milliseconds(2500));
        cache.set_ttl(Duration::seconds(1));
        assert_that!(cache.ttl()).is_equal_to(Duration::seconds(1));

        cache.inner().create("flag", true, None).unwrap();
        assert_that!(slow.inner_get("flag").raw_is_enabled()).is_true();
        assert_that!(Arc::ptr_eq(cache.inner(), &slow)).is_true();
        assert_that!(cache.cached_len()).is_equal_to(0);
    }

    #[test]
    fn delete_writes_through() {
        let (slow, cache) = cached(100.0);
        cache.create("flag", true, None).unwrap();
        cache.delete("flag").unwrap();

        assert_that!(slow.get("flag").unwrap()).is_none();
        let gets = slow.gets();
        assert_that!(cache.get("flag").unwrap()).is_none();
        assert_that!(slow.gets()).is_equal_to(gets);
    }

    #[test]
    fn list_reflects_store() {
        let (slow, cache) = cached(100.0);
        for name in names(4) {
            slow.create(&name, false, None).unwrap();
        }
        let listed: Vec<String> = cache
            .list(Some(2), 1)
            .unwrap()
            .into_iter()
            .map(|item| item.feature_name)
            .collect();
        assert_that!(listed).is_equal_to(vec!["flag-01".to_string(), "flag-02".to_string()]);
    }

    #[test]
    fn bounded_size_evicts_and_refetches() {
        let slow = Arc::new(CountingStore::new());
        let cache = CachedFeatureFlagStore::with_config(
            slow.clone(),
            CacheConfig::default().with_size(NonZeroUsize::new(2)),
        );
        for name in ["a", "b", "c"] {
            cache.create(name, true, None).unwrap();
        }
        assert_that!(cache.cached_len()).is_equal_to(2);

        assert_that!(cache.get("a").unwrap()).is_some();
        assert_that!(slow.gets()).is_equal_to(1);
        assert_that!(cache.get("c").unwrap()).is_some();
        assert_that!(slow.gets()).is_equal_to(1);
    }

    #[test]
    fn clear_forces_refetch() {
        let (slow, cache) = cached(100.0);
        cache.create("flag", true, None).unwrap();
        cache.clear();
        assert_that!(cache.get("flag").unwrap()).is_some();
        assert_that!(slow.gets()).is_equal_to(1);
    }

    #[test]
    fn slow_store_never_yields_spurious_miss() {
        let slow = Arc::new(CountingStore::with_latency(StdDuration::from_millis(2)));
        let cache = Arc::new(CachedFeatureFlagStore::with_config(
            slow.clone(),
            CacheConfig::default().with_ttl_secs(0.001),
        ));
        cache.create("flag", true, None).unwrap();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        assert!(cache.get("flag").unwrap().is_some());
                    }
                })
            })
            .collect();
        let writer = {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    cache.set("flag", i % 2 == 0).unwrap();
                }
            })
        };
        for handle in readers {
            handle.join().unwrap();
        }
        writer.join().unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn cached_get_matches_store(ops in prop::collection::vec((0..4usize, 0..3u8), 1..30)) {
            let (slow, cache) = cached(100.0);
            for (key, op) in ops {
                let name = format!("flag-{}", key);
                match op {
                    0 => { cache.create(&name, true, None).unwrap(); }
                    1 => cache.set(&name, false).unwrap(),
                    _ => cache.delete(&name).unwrap(),
                }
                prop_assert_eq!(cache.get(&name).unwrap(), slow.get(&name).unwrap());
            }
        }
    }
}
