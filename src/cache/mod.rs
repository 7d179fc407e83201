//! Index listing cache.
//!
//! The index page is cached as a whole rendered response for a short, fixed
//! TTL (`feed.index_cache_ttl_seconds`). Everything else is served live.

mod feed_cache;
pub(crate) mod lock;
mod middleware;
mod response;

pub use feed_cache::{DEFAULT_INDEX_TTL, FeedCache, INDEX_CACHE_KEY};
pub use middleware::{INDEX_CACHE_HIT_TOTAL, INDEX_CACHE_MISS_TOTAL, index_cache_layer};
pub use response::CachedResponse;
