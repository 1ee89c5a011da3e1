//! Per-request strategy execution context.
//!
//! A [`StrategyHandler`] is created for every request a strategy handles. It
//! exposes the fetch / cache-match / cache-put primitives strategies are
//! written against, and makes sure every one of them runs the relevant plugin
//! callbacks. It also owns the list of background extensions that must finish
//! before the request counts as complete.

use std::future::Future;
use std::sync::Arc;

use cachet_types::{
    CacheStorage, Error, FetchEvent, Fetcher, Method, Request, Response, Result,
    RouteParams,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::plugin::{
    CacheKeyMode, CacheUpdate, LifecycleEvent, Plugin, PluginChain, PluginHook, wrap_plugin_error,
};
use crate::runner::StrategyConfig;

/// Lifecycle position of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Created,
    WillStart,
    Executing,
    Errored,
    Recovering,
    WillRespond,
    Responded,
    Completing,
    Completed,
}

/// Everything a strategy needs to serve one request.
pub(crate) struct HandlerParts {
    pub strategy_name: &'static str,
    pub config: Arc<StrategyConfig>,
    pub plugins: Arc<PluginChain>,
    pub storage: Arc<dyn CacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
}

struct HandlerInner {
    request: Request,
    event: Option<FetchEvent>,
    params: Option<RouteParams>,
    parts: HandlerParts,
    extensions: Mutex<Vec<JoinHandle<Result<()>>>>,
    state: Mutex<HandlerState>,
}

/// Per-request execution context. Cloning is cheap and shares state, so
/// background work can hold its own handle.
#[derive(Clone)]
pub struct StrategyHandler {
    inner: Arc<HandlerInner>,
}

impl std::fmt::Debug for StrategyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyHandler")
            .field("strategy", &self.inner.parts.strategy_name)
            .field("url", &self.inner.request.url().as_str())
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}

impl StrategyHandler {
    pub(crate) fn new(
        request: Request,
        event: Option<FetchEvent>,
        params: Option<RouteParams>,
        parts: HandlerParts,
    ) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                request,
                event,
                params,
                parts,
                extensions: Mutex::new(Vec::new()),
                state: Mutex::new(HandlerState::Created),
            }),
        }
    }

    /// The request being handled.
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    pub fn event(&self) -> Option<&FetchEvent> {
        self.inner.event.as_ref()
    }

    pub fn params(&self) -> Option<&RouteParams> {
        self.inner.params.as_ref()
    }

    pub fn cache_name(&self) -> &str {
        &self.inner.parts.config.cache_name
    }

    pub fn strategy_name(&self) -> &'static str {
        self.inner.parts.strategy_name
    }

    pub fn state(&self) -> HandlerState {
        *self.inner.state.lock()
    }

    pub(crate) fn set_state(&self, state: HandlerState) {
        trace!(strategy = self.strategy_name(), ?state, "handler state");
        *self.inner.state.lock() = state;
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state() == HandlerState::Completed {
            return Err(Error::HandlerDestroyed);
        }
        Ok(())
    }

    fn config(&self) -> &StrategyConfig {
        &self.inner.parts.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Plugin access
    // ─────────────────────────────────────────────────────────────────────

    pub fn has_callback(&self, hook: PluginHook) -> bool {
        self.inner.parts.plugins.has_callback(hook)
    }

    pub fn iterate_callbacks(&self, hook: PluginHook) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.inner.parts.plugins.iterate_callbacks(hook)
    }

    pub async fn run_callbacks(&self, event: &LifecycleEvent<'_>) -> Vec<Result<()>> {
        self.inner.parts.plugins.run_callbacks(self, event).await
    }

    /// Run notification callbacks whose failures must not alter control flow.
    pub(crate) async fn notify(&self, event: &LifecycleEvent<'_>) {
        for result in self.run_callbacks(event).await {
            if let Err(e) = result {
                warn!(hook = %event.hook(), error = %e, "plugin callback failed");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Network
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch `request` from the network, running `requestWillFetch`,
    /// `fetchDidSucceed` and (on failure) `fetchDidFail` callbacks.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        self.ensure_active()?;

        let original = request.clone();
        let mut request = request;
        for plugin in self.iterate_callbacks(PluginHook::RequestWillFetch) {
            request = plugin
                .request_will_fetch(self, request)
                .await
                .map_err(|e| wrap_plugin_error(plugin.as_ref(), e))?;
        }

        let options = &self.config().fetch_options;
        match self.inner.parts.fetcher.fetch(&request, options).await {
            Ok(mut response) => {
                debug!(
                    url = %request.url(),
                    status = response.status(),
                    "network response received"
                );
                for plugin in self.iterate_callbacks(PluginHook::FetchDidSucceed) {
                    response = plugin
                        .fetch_did_succeed(self, &request, response)
                        .await
                        .map_err(|e| wrap_plugin_error(plugin.as_ref(), e))?;
                }
                Ok(response)
            }
            Err(error) => {
                debug!(url = %request.url(), error = %error, "network request failed");
                self.notify(&LifecycleEvent::FetchDidFail {
                    original_request: &original,
                    request: &request,
                    error: &error,
                })
                .await;
                Err(error)
            }
        }
    }

    /// Fetch `request` and write a copy of the response to the cache in the
    /// background.
    pub async fn fetch_and_cache_put(&self, request: Request) -> Result<Response> {
        let response = self.fetch(request.clone()).await?;

        let handler = self.clone();
        let to_cache = response.clone();
        self.wait_until(async move { handler.cache_put(&request, to_cache).await.map(|_| ()) });

        Ok(response)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cache
    // ─────────────────────────────────────────────────────────────────────

    /// Apply `cacheKeyWillBeUsed` callbacks to `request`.
    pub async fn get_cache_key(&self, request: &Request, mode: CacheKeyMode) -> Result<Request> {
        let mut key = request.clone();
        for plugin in self.iterate_callbacks(PluginHook::CacheKeyWillBeUsed) {
            key = plugin
                .cache_key_will_be_used(self, key, mode)
                .await
                .map_err(|e| wrap_plugin_error(plugin.as_ref(), e))?;
        }
        Ok(key)
    }

    /// Look `key` up in the strategy's cache, passing any hit through the
    /// `cachedResponseWillBeUsed` callbacks.
    pub async fn cache_match(&self, key: &Request) -> Result<Option<Response>> {
        self.ensure_active()?;

        let effective = self.get_cache_key(key, CacheKeyMode::Read).await?;
        let cache_name = self.cache_name();
        let cache = self.inner.parts.storage.open(cache_name).await?;
        let mut cached = cache
            .match_request(&effective, &self.config().match_options)
            .await?;

        if cached.is_some() {
            debug!(cache = %cache_name, url = %effective.url(), "cache hit");
        } else {
            debug!(cache = %cache_name, url = %effective.url(), "cache miss");
        }

        for plugin in self.iterate_callbacks(PluginHook::CachedResponseWillBeUsed) {
            cached = plugin
                .cached_response_will_be_used(self, cache_name, &effective, cached)
                .await
                .map_err(|e| wrap_plugin_error(plugin.as_ref(), e))?;
        }

        Ok(cached)
    }

    /// Write `response` to the cache under `key`.
    ///
    /// Returns `false` when the response was not cached because it varies on
    /// everything or a `cacheWillUpdate` callback (or the default 200-only
    /// filter) rejected it. Non-GET requests are an error.
    pub async fn cache_put(&self, key: &Request, response: Response) -> Result<bool> {
        self.ensure_active()?;

        let effective = self.get_cache_key(key, CacheKeyMode::Write).await?;
        if *effective.method() != Method::GET {
            return Err(Error::NonGetCachePut {
                method: effective.method().to_string(),
                url: effective.url().to_string(),
            });
        }

        if response.varies_on_everything() {
            warn!(
                url = %effective.url(),
                "response has 'Vary: *' and cannot be cached"
            );
            return Ok(false);
        }

        let Some(response) = self.ensure_response_safe_to_cache(&effective, response).await? else {
            debug!(url = %effective.url(), "response not cached");
            return Ok(false);
        };

        let cache_name = self.cache_name().to_string();
        let cache = self.inner.parts.storage.open(&cache_name).await?;

        let old_response = if self.has_callback(PluginHook::CacheDidUpdate) {
            cache
                .match_request(&effective, &self.config().match_options)
                .await?
        } else {
            None
        };

        cache.put(&effective, response.clone()).await?;
        debug!(cache = %cache_name, url = %effective.url(), "response cached");

        let update = CacheUpdate {
            cache_name,
            request: effective,
            old_response,
            new_response: response,
        };
        for result in self
            .run_callbacks(&LifecycleEvent::CacheDidUpdate(&update))
            .await
        {
            result?;
        }

        Ok(true)
    }

    async fn ensure_response_safe_to_cache(
        &self,
        request: &Request,
        response: Response,
    ) -> Result<Option<Response>> {
        let mut candidate = Some(response);
        let mut filtered = false;

        for plugin in self.iterate_callbacks(PluginHook::CacheWillUpdate) {
            filtered = true;
            let Some(response) = candidate.take() else {
                break;
            };
            candidate = plugin
                .cache_will_update(self, request, response)
                .await
                .map_err(|e| wrap_plugin_error(plugin.as_ref(), e))?;
            if candidate.is_none() {
                break;
            }
        }

        if !filtered {
            candidate = candidate.filter(|r| r.status() == 200);
        }

        Ok(candidate)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Background work
    // ─────────────────────────────────────────────────────────────────────

    /// Register background work that must finish before the request's
    /// completion signal resolves. The work also extends the host event, if
    /// there is one. Work registered after the handler is destroyed is
    /// dropped without running.
    pub fn wait_until<F>(&self, future: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self.state() == HandlerState::Completed {
            warn!(url = %self.request().url(), "wait_until after completion ignored");
            return;
        }
        let handle = match &self.inner.event {
            Some(event) => event.wait_until(future),
            None => tokio::spawn(future),
        };
        self.inner.extensions.lock().push(handle);
    }

    /// Wait for every registered extension, including ones registered while
    /// waiting. All extensions run to completion; the first failure is
    /// returned.
    pub async fn done_waiting(&self) -> Result<()> {
        let mut first_error = None;
        loop {
            let pending = std::mem::take(&mut *self.inner.extensions.lock());
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                let outcome = match handle.await {
                    Ok(result) => result,
                    Err(join_error) => Err(Error::from(join_error)),
                };
                if let Err(e) = outcome {
                    warn!(url = %self.request().url(), error = %e, "background work failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Release the handler. Further fetch and cache operations fail.
    pub fn destroy(&self) {
        self.set_state(HandlerState::Completed);
        self.inner.extensions.lock().clear();
    }
}
