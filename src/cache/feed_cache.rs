//! Time-boxed cache for the rendered index listing.
//!
//! One slot under a fixed key, shared by every caller and every query string.
//! Writes to posts do not invalidate it: readers see the stored listing until
//! the TTL lapses or [`FeedCache::clear`] is called.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::lock::{rw_read, rw_write};
use super::response::CachedResponse;

pub const INDEX_CACHE_KEY: &str = "index_page";
pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(20);

const SOURCE: &str = "cache::feed_cache";

#[derive(Debug, Clone)]
struct Entry {
    stored_at: Instant,
    response: CachedResponse,
}

#[derive(Debug, Clone)]
pub struct FeedCache {
    slot: Arc<RwLock<Option<Entry>>>,
    ttl: Duration,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_TTL)
    }
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    /// The stored response, unless it is older than the TTL.
    pub fn get(&self) -> Option<CachedResponse> {
        {
            let guard = rw_read(&self.slot, SOURCE, "get");
            match guard.as_ref() {
                None => return None,
                Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                    return Some(entry.response.clone());
                }
                Some(_) => {}
            }
        }

        let mut guard = rw_write(&self.slot, SOURCE, "expire");
        if guard
            .as_ref()
            .is_some_and(|entry| entry.stored_at.elapsed() >= self.ttl)
        {
            debug!(key = INDEX_CACHE_KEY, "cached listing expired");
            *guard = None;
        }
        None
    }

    pub fn put(&self, response: CachedResponse) {
        *rw_write(&self.slot, SOURCE, "put") = Some(Entry {
            stored_at: Instant::now(),
            response,
        });
    }

    pub fn clear(&self) {
        if rw_write(&self.slot, SOURCE, "clear").take().is_some() {
            debug!(key = INDEX_CACHE_KEY, "cached listing cleared");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_populated(&self) -> bool {
        rw_read(&self.slot, SOURCE, "is_populated")
            .as_ref()
            .is_some_and(|entry| entry.stored_at.elapsed() < self.ttl)
    }
}
