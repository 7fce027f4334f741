//! Time-bounded response cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CacheEntry {
    response: String,
    expire_at: Instant,
}

/// Maps request URL (including any encoded GET body) to a stored response.
/// Entries are validated on read; an expired entry is removed and never
/// served.
#[derive(Default)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
}

impl ResponseCache {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn put(&mut self, key: impl Into<String>, response: impl Into<String>, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                response: response.into(),
                expire_at: Instant::now() + ttl,
            },
        );
    }

    /// Fetch a live entry, expiring on read.
    #[inline]
    #[must_use]
    pub fn get(&mut self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.expire_at => Some(entry.response.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ResponseCache;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn serves_until_deadline() {
        let mut cache = ResponseCache::new();
        cache.put("/a", "one", Duration::from_secs(60));
        assert_eq!(cache.get("/a").as_deref(), Some("one"));
        assert_eq!(cache.get("/a").as_deref(), Some("one"));
        assert_eq!(cache.get("/b"), None);
    }

    #[test]
    fn expires_and_removes_on_read() {
        let mut cache = ResponseCache::new();
        cache.put("/a", "one", Duration::from_millis(20));
        sleep(Duration::from_millis(40));
        assert_eq!(cache.get("/a"), None);
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn put_overwrites() {
        let mut cache = ResponseCache::new();
        cache.put("/a", "one", Duration::from_secs(60));
        cache.put("/a", "two", Duration::from_secs(60));
        assert_eq!(cache.get("/a").as_deref(), Some("two"));
    }
}
