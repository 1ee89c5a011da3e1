use std::time::Duration;

use async_trait::async_trait;
use cachet_types::{Error, Request, Response, Result};
use tracing::debug;

use crate::handler::StrategyHandler;
use crate::runner::Strategy;

/// Always go to the network. Nothing is cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkOnly {
    network_timeout: Option<Duration>,
}

impl NetworkOnly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `Error::Timeout` if the network has not answered in time.
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Strategy for NetworkOnly {
    fn name(&self) -> &'static str {
        "NetworkOnly"
    }

    async fn run(&self, request: Request, handler: &StrategyHandler) -> Result<Response> {
        let fetch = handler.fetch(request);
        match self.network_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(?timeout, url = %handler.request().url(), "network timed out");
                    Err(Error::Timeout(timeout))
                }
            },
            None => fetch.await,
        }
    }
}
