use async_trait::async_trait;
use cachet_types::{Request, Response, Result};

use super::no_response;
use crate::handler::StrategyHandler;
use crate::runner::Strategy;

/// Serve from the cache only. A miss is a `NoResponse` error.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOnly;

#[async_trait]
impl Strategy for CacheOnly {
    fn name(&self) -> &'static str {
        "CacheOnly"
    }

    async fn run(&self, request: Request, handler: &StrategyHandler) -> Result<Response> {
        handler
            .cache_match(&request)
            .await?
            .ok_or_else(|| no_response(self.name(), &request))
    }
}
