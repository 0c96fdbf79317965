//! Cached responses for offline fallback.
//!
//! The client consults a [`ResponseCache`] when the host is unreachable (or
//! when a request's cache policy asks for cached data) and stores successful
//! GET responses into it.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use url::Url;

/// Identifies equivalent requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The request method
    pub method: Method,
    /// The full request URL
    pub url: Url,
}

impl CacheKey {
    /// Creates a key for `method` requests to `url`.
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }
}

/// A previously received response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// The HTTP status code
    pub status: StatusCode,
    /// The response headers
    pub headers: HeaderMap,
    /// The response body
    pub body: Bytes,
    /// The URL the response came from
    pub url: Url,
}

/// Synchronous response lookup and storage.
///
/// Implementations must be cheap enough to call from the thread submitting
/// a request.
pub trait ResponseCache: Send + Sync + 'static {
    /// Returns the response cached for `key`, if any.
    fn lookup(&self, key: &CacheKey) -> Option<CachedResponse>;

    /// Stores `response` for `key`, replacing any earlier entry.
    fn store(&self, key: CacheKey, response: CachedResponse);
}

/// Bounded in-memory cache that evicts the least recently used response.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<LruCache<CacheKey, CachedResponse>>,
}

impl MemoryCache {
    /// Creates a cache holding at most `capacity` responses (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached responses.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(128)
    }
}

impl ResponseCache for MemoryCache {
    fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn store(&self, key: CacheKey, response: CachedResponse) {
        let evicted = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key, response);
        if let Some((old, _)) = evicted {
            tracing::trace!(url = %old.url, "Cache entry replaced or evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: &Url, body: &'static str) -> CachedResponse {
        CachedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            url: url.clone(),
        }
    }

    #[test]
    fn test_lookup_by_method_and_url() {
        let cache = MemoryCache::new(4);
        let url = Url::parse("https://api.example.com/a").unwrap();
        cache.store(CacheKey::new(Method::GET, url.clone()), response(&url, "{}"));

        assert!(cache
            .lookup(&CacheKey::new(Method::GET, url.clone()))
            .is_some());
        assert!(cache
            .lookup(&CacheKey::new(Method::POST, url.clone()))
            .is_none());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        let urls: Vec<Url> = ["a", "b", "c"]
            .iter()
            .map(|p| Url::parse(&format!("https://api.example.com/{p}")).unwrap())
            .collect();

        cache.store(CacheKey::new(Method::GET, urls[0].clone()), response(&urls[0], "a"));
        cache.store(CacheKey::new(Method::GET, urls[1].clone()), response(&urls[1], "b"));
        // Touch "a" so "b" becomes the oldest
        cache.lookup(&CacheKey::new(Method::GET, urls[0].clone()));
        cache.store(CacheKey::new(Method::GET, urls[2].clone()), response(&urls[2], "c"));

        assert_eq!(cache.len(), 2);
        assert!(cache
            .lookup(&CacheKey::new(Method::GET, urls[1].clone()))
            .is_none());
        assert_eq!(
            &cache
                .lookup(&CacheKey::new(Method::GET, urls[0].clone()))
                .unwrap()
                .body[..],
            b"a"
        );
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = MemoryCache::new(0);
        let url = Url::parse("https://api.example.com/a").unwrap();
        cache.store(CacheKey::new(Method::GET, url.clone()), response(&url, "{}"));
        assert_eq!(cache.len(), 1);
    }
}
