use async_trait::async_trait;
use cachet_types::{Request, Response, Result};
use futures::FutureExt;
use tracing::debug;

use super::no_response;
use crate::handler::StrategyHandler;
use crate::runner::Strategy;

/// Serve the cached response immediately and refresh the cache from the
/// network in the background. On a miss, wait for the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleWhileRevalidate;

#[async_trait]
impl Strategy for StaleWhileRevalidate {
    fn name(&self) -> &'static str {
        "StaleWhileRevalidate"
    }

    fn requires_cacheable_filter(&self) -> bool {
        true
    }

    async fn run(&self, request: Request, handler: &StrategyHandler) -> Result<Response> {
        let revalidate = {
            let handler = handler.clone();
            let request = request.clone();
            async move { handler.fetch_and_cache_put(request).await }
                .boxed()
                .shared()
        };

        let background = revalidate.clone();
        let url = request.url().clone();
        handler.wait_until(async move {
            if let Err(error) = background.await {
                debug!(url = %url, error = %error, "revalidation failed");
            }
            Ok(())
        });

        match handler.cache_match(&request).await? {
            Some(cached) => {
                debug!(url = %request.url(), "serving stale response while revalidating");
                Ok(cached)
            }
            None => match revalidate.await {
                Ok(response) => Ok(response),
                Err(error) if error.is_transport() => {
                    debug!(url = %request.url(), error = %error, "no cached response and network failed");
                    Err(no_response(self.name(), &request))
                }
                Err(error) => Err(error),
            },
        }
    }
}
