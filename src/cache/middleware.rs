//! Response cache middleware for the global feed.
//!
//! Serves stored `200 OK` responses to GET requests until their TTL runs
//! out. Writes never invalidate entries; staleness is bounded by the TTL.
//! Only anonymous requests read or fill the cache, since pages rendered for a
//! signed-in viewer carry that viewer's navigation and edit links.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use super::{
    CacheConfig,
    keys::ResponseKey,
    store::{CachedResponse, Lookup, ResponseStore},
};
use crate::domain::types::Viewer;
use crate::infra::telemetry::{CACHE_EXPIRED_TOTAL, CACHE_HIT_TOTAL, CACHE_MISS_TOTAL};

const MAX_CACHED_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<ResponseStore>,
}

impl CacheState {
    pub fn new(config: CacheConfig) -> Self {
        let store = Arc::new(ResponseStore::new(&config));
        Self { config, store }
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled || request.method() != Method::GET || is_personal(&request) {
        return next.run(request).await;
    }

    let key = ResponseKey::from_uri(request.uri());

    match cache.store.lookup(&key) {
        Lookup::Hit(cached) => {
            metrics::counter!(CACHE_HIT_TOTAL).increment(1);
            debug!(cache = "response", outcome = "hit", "serving cached response");
            return build_response(cached);
        }
        Lookup::Expired => {
            metrics::counter!(CACHE_EXPIRED_TOTAL).increment(1);
            debug!(cache = "response", outcome = "expired", "cached response expired");
        }
        Lookup::Miss => {
            metrics::counter!(CACHE_MISS_TOTAL).increment(1);
            debug!(cache = "response", outcome = "miss", "cache miss, executing handler");
        }
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(cache = "response", %error, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        body: bytes.clone(),
    };

    if let Some(evicted) = cache.store.insert(key, cached) {
        debug!(
            cache = "response",
            evicted_path = %evicted.path,
            evicted_query = %evicted.query,
            "evicted least recently used response"
        );
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn is_personal(request: &Request<Body>) -> bool {
    request
        .extensions()
        .get::<Viewer>()
        .is_some_and(Viewer::is_authenticated)
}

/// Build a response from cached data.
fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
