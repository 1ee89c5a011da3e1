//! Network fetch collaborator.

use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;

use crate::error::Result;
use crate::message::{Request, Response};

/// Options applied to every network request made by a strategy.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra headers merged into each outgoing request.
    pub headers: HeaderMap,
    /// Transport-level timeout enforced by the fetcher.
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Performs network requests on behalf of strategies.
///
/// Implementations return `Err(Error::Transport)` when the network is
/// unreachable. A reachable server answering with an error status is a
/// successful fetch.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request, options: &FetchOptions) -> Result<Response>;
}
