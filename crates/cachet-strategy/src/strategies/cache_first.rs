use async_trait::async_trait;
use cachet_types::{Request, Response, Result};
use tracing::debug;

use crate::handler::StrategyHandler;
use crate::runner::Strategy;

/// Serve from the cache; on a miss, fetch and cache the network response.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheFirst;

#[async_trait]
impl Strategy for CacheFirst {
    fn name(&self) -> &'static str {
        "CacheFirst"
    }

    async fn run(&self, request: Request, handler: &StrategyHandler) -> Result<Response> {
        if let Some(cached) = handler.cache_match(&request).await? {
            debug!(url = %request.url(), cache = handler.cache_name(), "serving from cache");
            return Ok(cached);
        }

        debug!(url = %request.url(), "no cached response, fetching");
        handler.fetch_and_cache_put(request).await
    }
}
