use std::time::Duration;

use async_trait::async_trait;
use cachet_types::{Request, Response, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use super::no_response;
use crate::handler::StrategyHandler;
use crate::runner::Strategy;

/// Prefer the network, falling back to the cache when the network fails or
/// does not answer within `network_timeout`.
///
/// Successful network responses are cached in the background. When the
/// timeout fires and a cached response is served, the network request keeps
/// running as an extension so the cache is still refreshed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkFirst {
    network_timeout: Option<Duration>,
}

impl NetworkFirst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }
}

enum Race {
    Network(Result<Option<Response>>),
    TimedOut,
}

#[async_trait]
impl Strategy for NetworkFirst {
    fn name(&self) -> &'static str {
        "NetworkFirst"
    }

    fn requires_cacheable_filter(&self) -> bool {
        true
    }

    async fn run(&self, request: Request, handler: &StrategyHandler) -> Result<Response> {
        let mut network = network_or_cache(handler.clone(), request.clone());

        let response = match self.network_timeout {
            None => network.await?,
            Some(timeout) => {
                let race = tokio::select! {
                    result = &mut network => Race::Network(result),
                    _ = tokio::time::sleep(timeout) => Race::TimedOut,
                };

                match race {
                    Race::Network(result) => result?,
                    Race::TimedOut => {
                        debug!(?timeout, url = %request.url(), "network timed out, trying cache");
                        match handler.cache_match(&request).await? {
                            Some(cached) => {
                                handler.wait_until(network.map(|result| result.map(|_| ())));
                                Some(cached)
                            }
                            None => network.await?,
                        }
                    }
                }
            }
        };

        response.ok_or_else(|| no_response(self.name(), &request))
    }
}

/// Fetch and cache; on network failure, look the request up in the cache.
fn network_or_cache(
    handler: StrategyHandler,
    request: Request,
) -> BoxFuture<'static, Result<Option<Response>>> {
    async move {
        match handler.fetch_and_cache_put(request.clone()).await {
            Ok(response) => Ok(Some(response)),
            Err(error) => {
                debug!(url = %request.url(), error = %error, "network failed, falling back to cache");
                handler.cache_match(&request).await
            }
        }
    }
    .boxed()
}
