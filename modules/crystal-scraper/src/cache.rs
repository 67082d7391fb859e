use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::content::ScrapedContent;

struct CacheEntry {
    value: ScrapedContent,
    inserted_at: Instant,
}

/// TTL cache of scrape results keyed by URL.
///
/// Expiry is lazy: a stale entry is removed by the first `get` that sees it.
/// There is no size bound and no background sweep.
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stored value for `key` if it is younger than the TTL.
    pub fn get(&self, key: &str) -> Option<ScrapedContent> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
        }

        // Re-check under the shard write lock so a fresh `set` racing with us survives.
        if self
            .entries
            .remove_if(key, |_, entry| entry.inserted_at.elapsed() >= self.ttl)
            .is_some()
        {
            debug!(url = key, "Cache entry expired");
        }
        None
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn set(&self, key: &str, value: ScrapedContent) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
