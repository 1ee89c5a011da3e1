//! In-memory response cache.
//!
//! Reference implementation of [`CacheStorage`] used by tests and by hosts
//! that do not need responses to survive a restart. Entries are kept in
//! insertion order and matched by URL (fragment removed).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use parking_lot::RwLock;
use tracing::trace;

use crate::cache::{Cache, CacheStorage, MatchOptions};
use crate::error::Result;
use crate::message::{Request, Response, strip_fragment};

/// A single named in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    name: String,
    entries: RwLock<Vec<(Request, Response)>>,
}

impl MemoryCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Compare a stored request against a lookup request.
fn request_matches(stored: &Request, lookup: &Request, options: &MatchOptions) -> bool {
    if !options.ignore_method && lookup.method() != Method::GET && lookup.method() != Method::HEAD
    {
        return false;
    }

    if options.ignore_search {
        let mut a = stored.url().clone();
        let mut b = lookup.url().clone();
        a.set_query(None);
        b.set_query(None);
        strip_fragment(&a) == strip_fragment(&b)
    } else {
        stored.cache_key() == lookup.cache_key()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .find(|(stored, _)| request_matches(stored, request, options))
            .map(|(_, response)| response.clone()))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<()> {
        let key = request.cache_key();
        let mut entries = self.entries.write();
        entries.retain(|(stored, _)| stored.cache_key() != key);
        entries.push((request.clone(), response));
        trace!(cache = %self.name, url = %key, size = entries.len(), "entry stored");
        Ok(())
    }

    async fn delete(&self, request: &Request, options: &MatchOptions) -> Result<bool> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(stored, _)| !request_matches(stored, request, options));
        Ok(entries.len() != before)
    }

    async fn keys(&self) -> Result<Vec<Request>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(request, _)| request.clone())
            .collect())
    }
}

/// In-memory [`CacheStorage`].
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStorage {
    caches: Arc<RwLock<HashMap<String, Arc<MemoryCache>>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the concrete cache called `name`.
    pub fn cache(&self, name: &str) -> Arc<MemoryCache> {
        if let Some(cache) = self.caches.read().get(name) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write();
        Arc::clone(
            caches
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryCache::new(name))),
        )
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>> {
        Ok(self.cache(name))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.caches.read().contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.write().remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
