//! Response cache keys.

use axum::http::Uri;

/// Identifies a cached response by exact path and raw query string.
///
/// `/?page=2` and `/?page=02` are distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    pub path: String,
    pub query: String,
}

impl ResponseKey {
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
        }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self::new(uri.path(), uri.query().unwrap_or(""))
    }
}
