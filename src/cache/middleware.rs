//! Index listing cache middleware.
//!
//! Wraps the index handler only. GET requests are answered from the
//! [`FeedCache`] when it holds a live entry; otherwise the handler runs and a
//! 200 response is stored.

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::feed_cache::{FeedCache, INDEX_CACHE_KEY};
use super::response::{buffer_response, should_store_response};

pub const INDEX_CACHE_HIT_TOTAL: &str = "yatube_index_cache_hit_total";
pub const INDEX_CACHE_MISS_TOTAL: &str = "yatube_index_cache_miss_total";

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn index_cache_layer(
    State(cache): State<FeedCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    if let Some(cached) = cache.get() {
        counter!(INDEX_CACHE_HIT_TOTAL).increment(1);
        debug!(key = INDEX_CACHE_KEY, outcome = "hit", "serving cached listing");
        return cached.into_response();
    }

    counter!(INDEX_CACHE_MISS_TOTAL).increment(1);
    debug!(key = INDEX_CACHE_KEY, outcome = "miss", "rendering listing");

    let response = next.run(request).await;
    if !should_store_response(&response) {
        return response;
    }

    match buffer_response(response).await {
        Ok((response, cached)) => {
            cache.put(cached);
            response
        }
        Err((response, error)) => {
            warn!(key = INDEX_CACHE_KEY, error = %error, "listing not cached");
            response
        }
    }
}
