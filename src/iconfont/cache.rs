//! Time-bounded cache of project detail lookups.
//!
//! Entries are keyed by project identifier and stamped with the time they
//! were captured. Freshness is always computed against the clock at read
//! time; an entry is never mutated in place, only replaced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::trace;

/// How long a project detail stays fresh: 5 minutes.
pub const DETAIL_CACHE_MAX_AGE_MS: i64 = 5 * 60 * 1000;

/// Source of "now" in Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle
/// and advance the clock seen by the code under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock reading `start_ms`.
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A cached value with its capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// The cached value.
    pub value: T,
    /// When the value was captured, in epoch milliseconds.
    pub captured_at_ms: i64,
}

impl<T> CacheEntry<T> {
    /// Returns the age of the entry at `now_ms`.
    #[must_use]
    pub const fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.captured_at_ms
    }
}

/// Returns `true` if `entry` is younger than `max_age_ms` at `now_ms`.
#[must_use]
pub const fn is_fresh<T>(entry: &CacheEntry<T>, max_age_ms: i64, now_ms: i64) -> bool {
    entry.age_ms(now_ms) < max_age_ms
}

/// Project detail cache keyed by project identifier.
pub struct DetailCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    clock: Arc<dyn Clock>,
    max_age_ms: i64,
}

impl<T> DetailCache<T> {
    /// Creates an empty cache using the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty cache reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
            max_age_ms: DETAIL_CACHE_MAX_AGE_MS,
        }
    }

    /// Returns the entry for `key`, fresh or not.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    /// Returns the entry for `key` only if it is still fresh.
    #[must_use]
    pub fn get_fresh(&self, key: &str) -> Option<&CacheEntry<T>> {
        let now = self.clock.now_millis();
        self.entries
            .get(key)
            .filter(|entry| is_fresh(entry, self.max_age_ms, now))
    }

    /// Inserts or replaces the entry for `key`, stamped with the current time.
    pub fn put(&mut self, key: &str, value: T) {
        let captured_at_ms = self.clock.now_millis();
        trace!(key = %key, captured_at_ms, "Caching project detail");
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                captured_at_ms,
            },
        );
    }

    /// Drops every entry and returns how many were removed.
    pub fn invalidate_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum age of a fresh entry.
    #[must_use]
    pub const fn max_age_ms(&self) -> i64 {
        self.max_age_ms
    }

    /// Returns the current time according to the cache's clock.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

impl<T> Default for DetailCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_at(start: i64) -> (DetailCache<&'static str>, ManualClock) {
        let clock = ManualClock::new(start);
        (DetailCache::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn put_then_get() {
        let (mut cache, _clock) = cache_at(1_000);
        assert!(cache.get("42").is_none());

        cache.put("42", "detail");
        let entry = cache.get("42").unwrap();
        assert_eq!(entry.value, "detail");
        assert_eq!(entry.captured_at_ms, 1_000);
    }

    #[test]
    fn freshness_boundary() {
        let entry = CacheEntry {
            value: (),
            captured_at_ms: 0,
        };
        assert!(is_fresh(&entry, DETAIL_CACHE_MAX_AGE_MS, 0));
        assert!(is_fresh(&entry, DETAIL_CACHE_MAX_AGE_MS, 299_999));
        assert!(!is_fresh(&entry, DETAIL_CACHE_MAX_AGE_MS, 300_000));
        assert!(!is_fresh(&entry, DETAIL_CACHE_MAX_AGE_MS, 400_000));
    }

    #[test]
    fn stale_entry_still_retrievable() {
        let (mut cache, clock) = cache_at(0);
        cache.put("42", "detail");

        clock.set(120_000);
        assert!(cache.get_fresh("42").is_some());

        clock.set(300_000);
        assert!(cache.get_fresh("42").is_none());
        assert_eq!(cache.get("42").map(|e| e.value), Some("detail"));
    }

    #[test]
    fn put_replaces_and_restamps() {
        let (mut cache, clock) = cache_at(0);
        cache.put("42", "old");
        clock.advance(400_000);
        cache.put("42", "new");

        assert_eq!(cache.len(), 1);
        let entry = cache.get_fresh("42").unwrap();
        assert_eq!(entry.value, "new");
        assert_eq!(entry.captured_at_ms, 400_000);
    }

    #[test]
    fn invalidate_all_clears() {
        let (mut cache, _clock) = cache_at(0);
        cache.put("1", "a");
        cache.put("2", "b");

        assert_eq!(cache.invalidate_all(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.invalidate_all(), 0);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
