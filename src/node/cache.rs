//! Time-windowed record of previously seen message identifiers.
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;

/// First-seen cache used to suppress duplicate flooding.
/// A key counts as seen while its first-seen time is within `window` of the current time.
#[derive(Debug)]
pub struct DedupCache<K: Hash + Eq> {
    window: Duration,
    entries: HashMap<K, DateTime<Utc>>,
}

impl<K: Hash + Eq + Clone> DedupCache<K> {
    /// Creates an empty cache with the given window in milliseconds
    pub fn new(window_ms: u64) -> Self {
        DedupCache {
            window: Duration::milliseconds(window_ms as i64),
            entries: HashMap::new(),
        }
    }

    /// Records `key` as seen at `now`. Returns true if the key was already seen within the
    /// window, in which case the original first-seen time is kept.
    pub fn check_and_insert(&mut self, key: K, now: DateTime<Utc>) -> bool {
        if self.contains(&key, now) {
            return true;
        }
        self.entries.insert(key, now);
        false
    }

    /// Whether `key` has been seen within the window
    pub fn contains(&self, key: &K, now: DateTime<Utc>) -> bool {
        match self.entries.get(key) {
            Some(first_seen) => *first_seen + self.window > now,
            None => false,
        }
    }

    /// Deletes every entry whose window has elapsed. Returns how many were removed.
    pub fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.window;
        let before = self.entries.len();
        self.entries.retain(|_, first_seen| *first_seen + window > now);
        before - self.entries.len()
    }

    /// Keys currently stored
    pub fn keys(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_within_window() {
        let mut cache = DedupCache::new(30_000);
        let now = Utc::now();
        assert!(!cache.check_and_insert((String::from("1"), 5u32), now));
        assert!(cache.check_and_insert((String::from("1"), 5u32), now + Duration::seconds(29)));
        assert!(!cache.check_and_insert((String::from("1"), 6u32), now));
        assert_eq!(cache.keys().len(), 2);
    }

    #[test]
    fn test_expired_key_is_new_again() {
        let mut cache = DedupCache::new(1_000);
        let now = Utc::now();
        assert!(!cache.check_and_insert(String::from("abc"), now));

        let later = now + Duration::milliseconds(1_500);
        assert!(!cache.contains(&String::from("abc"), later));
        assert!(!cache.check_and_insert(String::from("abc"), later));
        assert!(cache.contains(&String::from("abc"), later));
    }

    #[test]
    fn test_purge() {
        let mut cache = DedupCache::new(1_000);
        let now = Utc::now();
        cache.check_and_insert(String::from("old"), now);
        cache.check_and_insert(String::from("new"), now + Duration::milliseconds(800));

        let removed = cache.purge(now + Duration::milliseconds(1_200));
        assert_eq!(removed, 1);
        assert_eq!(cache.keys(), vec![String::from("new")]);
    }
}
