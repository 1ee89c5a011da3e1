//! Common test utilities for strategy integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cachet_strategy::{Strategy, StrategyConfig, StrategyRunner};
use cachet_types::{
    Error, FetchOptions, Fetcher, MatchOptions, MemoryCacheStorage, Method, Request, Response,
    Result,
};
use parking_lot::Mutex;

/// Scripted network: answers from a URL → response table and records every
/// URL it was asked for.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.responses.lock().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request, _options: &FetchOptions) -> Result<Response> {
        self.calls.lock().push(request.url().to_string());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("network unreachable".into()));
        }

        let response = self.responses.lock().get(request.url().as_str()).cloned();
        Ok(response.unwrap_or_else(|| Response::new(404, "not found")))
    }
}

pub struct Harness {
    pub storage: MemoryCacheStorage,
    pub fetcher: Arc<MockFetcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            storage: MemoryCacheStorage::new(),
            fetcher: MockFetcher::new(),
        }
    }

    pub fn runner<S: Strategy + 'static>(&self, strategy: S, config: StrategyConfig) -> StrategyRunner {
        StrategyRunner::new(
            strategy,
            config,
            Arc::new(self.storage.clone()),
            self.fetcher.clone(),
        )
        .unwrap()
    }

    pub async fn seed(&self, cache_name: &str, url: &str, body: &'static str) {
        use cachet_types::Cache;
        self.storage
            .cache(cache_name)
            .put(&get(url), Response::ok(body))
            .await
            .unwrap();
    }

    pub async fn cached_body(&self, cache_name: &str, url: &str) -> Option<String> {
        use cachet_types::Cache;
        self.storage
            .cache(cache_name)
            .match_request(&get(url), &MatchOptions::default())
            .await
            .unwrap()
            .map(|r| String::from_utf8_lossy(r.body()).into_owned())
    }
}

pub fn get(url: &str) -> Request {
    Request::parse(Method::GET, url).unwrap()
}

pub fn body(response: &Response) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}
