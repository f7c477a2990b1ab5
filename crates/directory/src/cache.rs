//! Expiring key/value cache and atomic sequence counters.
//!
//! This is the in-process rendition of the shared cache the directory and
//! admission queue are specified against: set-with-ttl, get, delete, touch,
//! and atomic counter increment. Expiry is lazy — an expired entry is
//! dropped by whichever reader trips over it first.

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// A concurrent map with optional per-key time-to-live.
///
/// `ttl = None` means the entry never expires on its own; `touch` can later
/// attach a deadline (that is how a live presence entry is demoted to a
/// grace-window entry on disconnect).
pub struct ExpiringCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> ExpiringCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Inserts a value, returning the previous live value if the key was
    /// already present and not expired.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> Option<V> {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        self.entries
            .insert(key.into(), entry)
            .filter(|previous| !previous.is_expired(now))
            .map(|previous| previous.value)
    }

    /// Reads a value, evicting it instead when its deadline passed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.value)
    }

    /// Replaces the key's deadline. Returns false when the key is absent or
    /// already expired.
    pub fn touch(&self, key: &str, ttl: Option<Duration>) -> bool {
        self.touch_if(key, ttl, |_| true)
    }

    /// Replaces the deadline only when the predicate accepts the current
    /// value. The check and the update happen under the key's map guard, so
    /// a concurrent re-insert cannot be clobbered.
    pub fn touch_if(
        &self,
        key: &str,
        ttl: Option<Duration>,
        predicate: impl FnOnce(&V) -> bool,
    ) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                if entry.is_expired(now) || !predicate(&entry.value) {
                    return false;
                }
                entry.expires_at = ttl.map(|ttl| now + ttl);
                true
            }
            None => false,
        }
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Named monotonic counters, used for ticket, matchmaking-session, and
/// per-game player-id generation. The first `next` for a name returns 1.
#[derive(Default)]
pub struct SequenceCounter {
    counters: DashMap<String, u64>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, name: &str) -> u64 {
        let mut entry = self.counters.entry(name.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn entries_without_ttl_never_expire() {
        let cache = ExpiringCache::new();
        cache.insert("key", 1u32, None);
        sleep(Duration::from_millis(10));
        assert_eq!(cache.get("key"), Some(1));
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = ExpiringCache::new();
        cache.insert("key", 1u32, Some(Duration::from_millis(5)));
        sleep(Duration::from_millis(20));
        assert_eq!(cache.get("key"), None);
        assert_eq!(cache.remove("key"), None);
    }

    #[test]
    fn insert_reports_displaced_live_value_only() {
        let cache = ExpiringCache::new();
        assert_eq!(cache.insert("key", 1u32, Some(Duration::from_millis(5))), None);
        sleep(Duration::from_millis(20));
        // The previous entry is already dead; it must not be reported.
        assert_eq!(cache.insert("key", 2u32, None), None);
        assert_eq!(cache.insert("key", 3u32, None), Some(2));
    }

    #[test]
    fn touch_extends_and_touch_if_guards() {
        let cache = ExpiringCache::new();
        cache.insert("key", 7u32, Some(Duration::from_millis(5)));
        assert!(cache.touch("key", Some(Duration::from_secs(60))));
        sleep(Duration::from_millis(20));
        assert_eq!(cache.get("key"), Some(7));

        assert!(!cache.touch_if("key", Some(Duration::from_millis(1)), |v| *v == 99));
        assert!(cache.touch_if("key", None, |v| *v == 7));
        assert!(!cache.touch("missing", None));
    }

    #[test]
    fn counters_are_monotonic_per_name() {
        let counters = SequenceCounter::new();
        assert_eq!(counters.next("ticket"), 1);
        assert_eq!(counters.next("ticket"), 2);
        assert_eq!(counters.next("pid:42"), 1);
        assert_eq!(counters.next("ticket"), 3);
    }
}
