//! Response cache overlay.
//!
//! Reads (`GET`) are answered from the store when possible; on a miss the
//! origin runs and its body is teed into the store as it streams to the
//! client. Every other method first drops the keys its invalidation patterns
//! match and then reaches the origin unchanged.
//!
//! Every store failure fails open: a broken store turns the overlay into
//! pass-through, never into an error response. Concurrency is not
//! coordinated either. A read that misses just before a write invalidates can
//! still populate a pre-write body afterwards, and concurrent misses for one
//! key all run the origin.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::{
    CacheConfig,
    keys::{CacheKey, CacheKeyBuilder, RequestParts},
    patterns::{InvalidationPattern, InvalidationPatternBuilder},
    store::{CacheStore, StoreError},
};

pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

pub(crate) const METRIC_CACHE_HIT: &str = "taskdeck_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "taskdeck_cache_miss_total";
pub(crate) const METRIC_CACHE_STORE: &str = "taskdeck_cache_store_total";
pub(crate) const METRIC_CACHE_INVALIDATED: &str = "taskdeck_cache_invalidated_keys_total";
pub(crate) const METRIC_CACHE_STORE_ERROR: &str = "taskdeck_cache_store_error_total";

/// Shared overlay state. The store handle is injected, never global.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<dyn CacheStore>,
    pub keys: CacheKeyBuilder,
    pub patterns: InvalidationPatternBuilder,
}

impl CacheState {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        let space = config.key_space();
        Self {
            keys: CacheKeyBuilder::new(space.clone()),
            patterns: InvalidationPatternBuilder::new(space),
            config,
            store,
        }
    }
}

/// Middleware for the response cache; install with
/// `axum::middleware::from_fn_with_state`.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled {
        return next.run(request).await;
    }

    let parts = RequestParts::from_request(&request);

    if parts.is_passthrough() {
        return next.run(request).await;
    }

    if parts.is_write() {
        let patterns = cache.patterns.build_patterns(&parts);
        invalidate(cache.store.as_ref(), &patterns).await;
        return next.run(request).await;
    }

    let key = cache.keys.build_key(&parts);

    match cache.store.get(key.as_str()).await {
        Ok(body) => {
            counter!(METRIC_CACHE_HIT).increment(1);
            debug!(cache = "response", outcome = "hit", key = %key, "serving cached response");
            return replay(body);
        }
        Err(StoreError::NotFound) => {
            debug!(cache = "response", outcome = "miss", key = %key, "cache miss, executing handler");
        }
        Err(err) => {
            record_store_error("get");
            warn!(key = %key, error = %err, "cache lookup failed, treating as miss");
        }
    }
    counter!(METRIC_CACHE_MISS).increment(1);

    let response = next.run(request).await;
    if !is_cacheable_status(response.status()) {
        debug!(status = response.status().as_u16(), key = %key, "response not cacheable");
        return response;
    }

    let (parts, body) = response.into_parts();
    let populate = Populate {
        store: cache.store.clone(),
        key,
        ttl: cache.config.ttl,
        max_body_bytes: cache.config.max_body_bytes,
    };
    Response::from_parts(parts, tee_body(body, populate))
}

/// Only plain successful bodies are worth replaying as `200 OK`.
fn is_cacheable_status(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

/// Deletes every live key matched by `patterns`, returning how many were removed.
/// Failures are logged and skipped.
async fn invalidate(store: &dyn CacheStore, patterns: &[InvalidationPattern]) -> usize {
    let mut removed: HashSet<String> = HashSet::new();

    for pattern in patterns {
        let keys = match store.keys_matching(pattern.as_str()).await {
            Ok(keys) => keys,
            Err(err) => {
                record_store_error("keys_matching");
                warn!(pattern = %pattern, error = %err, "failed to enumerate keys for invalidation");
                continue;
            }
        };

        for key in keys {
            if removed.contains(&key) {
                continue;
            }
            match store.delete(&key).await {
                Ok(()) => {
                    debug!(key = %key, pattern = %pattern, "invalidated cache key");
                    removed.insert(key);
                }
                Err(err) => {
                    record_store_error("delete");
                    warn!(key = %key, error = %err, "failed to delete cache key");
                }
            }
        }
    }

    counter!(METRIC_CACHE_INVALIDATED).increment(removed.len() as u64);
    removed.len()
}

fn replay(body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
    response
}

/// Pending write of a captured body, performed once the body has fully streamed.
struct Populate {
    store: Arc<dyn CacheStore>,
    key: CacheKey,
    ttl: Duration,
    max_body_bytes: usize,
}

impl Populate {
    async fn commit(self, body: Bytes) {
        match self.store.set(self.key.as_str(), body, self.ttl).await {
            Ok(()) => {
                counter!(METRIC_CACHE_STORE).increment(1);
                debug!(key = %self.key, ttl_secs = self.ttl.as_secs(), "cached response");
            }
            Err(err) => {
                record_store_error("set");
                warn!(key = %self.key, error = %err, "failed to cache response");
            }
        }
    }
}

/// Forwards every chunk unmodified while keeping a copy. The copy is written
/// only if the stream ends cleanly; a dropped body (client gone, request
/// cancelled) or a stream error writes nothing.
fn tee_body(body: Body, populate: Populate) -> Body {
    let mut upstream = body.into_data_stream();

    Body::from_stream(async_stream::stream! {
        let mut captured = BytesMut::new();
        let mut oversized = false;

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    if !oversized {
                        if captured.len() + bytes.len() > populate.max_body_bytes {
                            oversized = true;
                            captured = BytesMut::new();
                        } else {
                            captured.extend_from_slice(&bytes);
                        }
                    }
                    yield Ok::<Bytes, axum::Error>(bytes);
                }
                Err(err) => {
                    warn!(key = %populate.key, error = %err, "response body failed, not caching");
                    yield Err(err);
                    return;
                }
            }
        }

        if oversized {
            debug!(
                key = %populate.key,
                limit = populate.max_body_bytes,
                "response body exceeds cache limit, not caching"
            );
            return;
        }

        populate.commit(captured.freeze()).await;
    })
}

fn record_store_error(op: &'static str) {
    counter!(METRIC_CACHE_STORE_ERROR, "op" => op).increment(1);
}
