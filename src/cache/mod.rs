//! Response cache for the global feed.
//!
//! Stores rendered `GET /` responses keyed by path and query string. Each
//! entry lives for `cache.response_ttl_seconds`; there is no invalidation
//! on write, so a change to the feed becomes visible at the latest one TTL
//! after it happened.
//!
//! ```toml
//! [cache]
//! enabled = true
//! response_ttl_seconds = 20
//! max_entries = 200
//! ```

mod config;
mod keys;
mod lock;
mod middleware;
mod store;

pub use config::CacheConfig;
pub use keys::ResponseKey;
pub use middleware::{CacheState, response_cache_layer};
pub use store::{CachedResponse, Lookup, ResponseStore};
