#![cfg(test)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::item::{ClientData, FeatureFlagStoreItem, FeatureFlagStoreMeta};
use crate::memory::MemoryFeatureFlagStore;
use crate::store::FeatureFlagStore;
use crate::{AttributeValue, Condition};

/// 2018-01-01T00:00:00Z
pub const NOW: i64 = 1_514_764_800;

/// A single-constraint condition; `key` may carry an operator suffix such as `age__gte`.
pub fn condition(key: &str, value: impl Into<AttributeValue>) -> Condition {
    Condition::new(vec![(key, value.into())]).expect("valid condition key")
}

/// `n` distinct flag names, deliberately not in sorted order.
pub fn names(n: usize) -> Vec<String> {
    (0..n).rev().map(|i| format!("flag-{:02}", i)).collect()
}

/// A memory store that counts reads and can be made slow or failing. Latency is spent after the
/// backing read, so a slow read returns what the store held when it started.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryFeatureFlagStore,
    gets: AtomicUsize,
    latency: Option<Duration>,
    first_read_only: bool,
    failing: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        CountingStore {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Only the first read is slow.
    pub fn with_first_read_stall(stall: Duration) -> Self {
        CountingStore {
            latency: Some(stall),
            first_read_only: true,
            ..Self::default()
        }
    }

    /// While set, every read fails with `Error::Store`.
    pub fn fail_reads(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Read straight from the backing memory store without counting. Panics on a missing flag.
    pub fn inner_get(&self, feature_name: &str) -> FeatureFlagStoreItem {
        self.inner
            .get(feature_name)
            .unwrap()
            .expect("flag present in backing store")
    }

    fn pause(&self, previous_gets: usize) {
        if self.first_read_only && previous_gets > 0 {
            return;
        }
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
    }
}

impl FeatureFlagStore for CountingStore {
    fn create(
        &self,
        feature_name: &str,
        is_enabled: bool,
        client_data: Option<ClientData>,
    ) -> Result<FeatureFlagStoreItem> {
        self.inner.create(feature_name, is_enabled, client_data)
    }

    fn get(&self, feature_name: &str) -> Result<Option<FeatureFlagStoreItem>> {
        let previous_gets = self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("unavailable".to_string()));
        }
        let item = self.inner.get(feature_name);
        self.pause(previous_gets);
        item
    }

    fn set(&self, feature_name: &str, is_enabled: bool) -> Result<()> {
        self.inner.set(feature_name, is_enabled)
    }

    fn delete(&self, feature_name: &str) -> Result<()> {
        self.inner.delete(feature_name)
    }

    fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<FeatureFlagStoreItem>> {
        self.inner.list(limit, offset)
    }

    fn set_meta(&self, feature_name: &str, meta: FeatureFlagStoreMeta) -> Result<()> {
        self.inner.set_meta(feature_name, meta)
    }
}
