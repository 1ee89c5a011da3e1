//! Response cache collaborator traits.
//!
//! The response store is provided by the host. A [`CacheStorage`] hands out
//! named [`Cache`] handles; strategies read and write through them and the
//! expiration engine deletes from them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::{Request, Response};

/// Options controlling how a request is matched against cached entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Ignore the query string when comparing URLs.
    pub ignore_search: bool,
    /// Match regardless of the request method.
    pub ignore_method: bool,
}

impl MatchOptions {
    pub fn ignore_search(mut self, ignore: bool) -> Self {
        self.ignore_search = ignore;
        self
    }

    pub fn ignore_method(mut self, ignore: bool) -> Self {
        self.ignore_method = ignore;
        self
    }
}

/// A named store of request → response entries.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Find the response stored for `request`.
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>>;

    /// Store `response` for `request`, replacing any previous entry.
    async fn put(&self, request: &Request, response: Response) -> Result<()>;

    /// Remove the entry for `request`. Returns whether an entry was removed;
    /// removing a missing entry is not an error.
    async fn delete(&self, request: &Request, options: &MatchOptions) -> Result<bool>;

    /// The requests currently stored.
    async fn keys(&self) -> Result<Vec<Request>>;
}

/// Opens named caches.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open (creating if needed) the cache called `name`.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>>;

    /// Whether a cache called `name` exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete the cache called `name`. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all caches.
    async fn keys(&self) -> Result<Vec<String>>;
}
