//! Strategy trait and the fixed orchestration pipeline around it.
//!
//! A [`Strategy`] only supplies the caching algorithm. [`StrategyRunner`]
//! wraps it with everything that is the same for every strategy: creating a
//! [`StrategyHandler`] per request, the handler lifecycle callbacks, error
//! recovery through `handlerDidError`, and the split between the response and
//! the completion of background work.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cachet_types::{
    CacheStorage, Error, FetchEvent, FetchOptions, Fetcher, MatchOptions, Request, Response,
    Result, RouteHandler, RouteHandlerContext, RouteParams,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::handler::{HandlerParts, HandlerState, StrategyHandler};
use crate::plugin::{LifecycleEvent, Plugin, PluginChain, PluginHook, wrap_plugin_error};
use crate::plugins::CacheOkAndOpaque;

/// Cache used when a strategy is not given a name.
pub const DEFAULT_CACHE_NAME: &str = "cachet-runtime";

/// A caching algorithm.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name used in logs and `NoResponse` errors.
    fn name(&self) -> &'static str;

    /// Whether the strategy may write non-200 responses, in which case it
    /// needs a `cacheWillUpdate` filter that lets opaque responses through.
    fn requires_cacheable_filter(&self) -> bool {
        false
    }

    /// Produce a response for `request` using the handler's primitives.
    async fn run(&self, request: Request, handler: &StrategyHandler) -> Result<Response>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Per-strategy settings shared by every request the strategy handles.
#[derive(Clone)]
pub struct StrategyConfig {
    pub cache_name: String,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub fetch_options: FetchOptions,
    pub match_options: MatchOptions,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            plugins: Vec::new(),
            fetch_options: FetchOptions::default(),
            match_options: MatchOptions::default(),
        }
    }
}

impl fmt::Debug for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyConfig")
            .field("cache_name", &self.cache_name)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("fetch_options", &self.fetch_options)
            .field("match_options", &self.match_options)
            .finish()
    }
}

impl StrategyConfig {
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            ..Self::default()
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_plugins(mut self, plugins: impl IntoIterator<Item = Arc<dyn Plugin>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = options;
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.match_options = options;
        self
    }
}

/// What a strategy is invoked with.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub request: Request,
    pub event: Option<FetchEvent>,
    pub params: Option<RouteParams>,
}

impl From<Request> for HandlerOptions {
    fn from(request: Request) -> Self {
        Self {
            request,
            event: None,
            params: None,
        }
    }
}

impl From<FetchEvent> for HandlerOptions {
    fn from(event: FetchEvent) -> Self {
        Self {
            request: event.request().clone(),
            event: Some(event),
            params: None,
        }
    }
}

impl From<RouteHandlerContext> for HandlerOptions {
    fn from(ctx: RouteHandlerContext) -> Self {
        Self {
            request: ctx.request,
            event: ctx.event,
            params: ctx.params,
        }
    }
}

/// Resolves with the strategy's response.
pub type ResponseFuture = BoxFuture<'static, Result<Response>>;

/// Resolves once all background work for the request has finished.
pub type DoneFuture = BoxFuture<'static, Result<()>>;

// ─────────────────────────────────────────────────────────────────────────────
// Runner
// ─────────────────────────────────────────────────────────────────────────────

/// A strategy bound to its configuration and collaborators.
#[derive(Clone)]
pub struct StrategyRunner {
    strategy: Arc<dyn Strategy>,
    config: Arc<StrategyConfig>,
    plugins: Arc<PluginChain>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl fmt::Debug for StrategyRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRunner")
            .field("strategy", &self.strategy.name())
            .field("cache_name", &self.config.cache_name)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl StrategyRunner {
    /// Bind `strategy` to `config`.
    ///
    /// Fails if more than one plugin implements `cacheWillUpdate`.
    pub fn new<S>(
        strategy: S,
        config: StrategyConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self>
    where
        S: Strategy + 'static,
    {
        let strategy: Arc<dyn Strategy> = Arc::new(strategy);

        let mut plugins = config.plugins.clone();
        let has_filter = plugins
            .iter()
            .any(|p| p.hooks().contains(&PluginHook::CacheWillUpdate));
        if strategy.requires_cacheable_filter() && !has_filter {
            plugins.insert(0, Arc::new(CacheOkAndOpaque));
        }
        let plugins = PluginChain::new(plugins)?;

        debug!(
            strategy = strategy.name(),
            cache = %config.cache_name,
            plugins = plugins.len(),
            "strategy configured"
        );

        Ok(Self {
            strategy,
            config: Arc::new(config),
            plugins: Arc::new(plugins),
            storage,
            fetcher,
        })
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    /// The effective plugin chain, including any implicit filter.
    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }

    /// Run the strategy and return its response. Background work keeps
    /// running after this returns.
    pub async fn handle(&self, options: impl Into<HandlerOptions>) -> Result<Response> {
        let (response, _done) = self.handle_all(options);
        response.await
    }

    /// Run the strategy, returning the response and a completion future
    /// that resolves after every background extension has settled.
    ///
    /// The pipeline runs on its own task, so both futures make progress
    /// whether or not the caller polls them. Must be called within a Tokio
    /// runtime.
    pub fn handle_all(&self, options: impl Into<HandlerOptions>) -> (ResponseFuture, DoneFuture) {
        let options = options.into();
        let event = options.event.clone();
        let handler = StrategyHandler::new(
            options.request,
            options.event,
            options.params,
            self.handler_parts(),
        );

        let (tx, rx) = oneshot::channel();
        let runner = self.clone();
        let pipeline = async move { runner.run_pipeline(handler, tx).await };
        let task = match &event {
            Some(event) => event.wait_until(pipeline),
            None => tokio::spawn(pipeline),
        };

        let response = async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::Internal(
                    "strategy pipeline ended without a response".to_string(),
                )),
            }
        }
        .boxed();

        let done = async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => Err(Error::from(join_error)),
            }
        }
        .boxed();

        (response, done)
    }

    fn handler_parts(&self) -> HandlerParts {
        HandlerParts {
            strategy_name: self.strategy.name(),
            config: Arc::clone(&self.config),
            plugins: Arc::clone(&self.plugins),
            storage: Arc::clone(&self.storage),
            fetcher: Arc::clone(&self.fetcher),
        }
    }

    async fn run_pipeline(
        self,
        handler: StrategyHandler,
        tx: oneshot::Sender<Result<Response>>,
    ) -> Result<()> {
        let request = handler.request().clone();
        let strategy = self.strategy.name();
        debug!(strategy, url = %request.url(), "handling request");

        handler.set_state(HandlerState::WillStart);
        handler
            .notify(&LifecycleEvent::HandlerWillStart { request: &request })
            .await;

        handler.set_state(HandlerState::Executing);
        let outcome = match self.strategy.run(request.clone(), &handler).await {
            Ok(response) if response.is_error() => Err(Error::NoResponse {
                strategy: strategy.to_string(),
                url: request.url().to_string(),
            }),
            other => other,
        };

        let outcome = match outcome {
            Ok(response) => Ok(response),
            Err(error) => {
                handler.set_state(HandlerState::Errored);
                recover(&handler, &request, error).await
            }
        };

        let outcome = match outcome {
            Ok(response) => {
                handler.set_state(HandlerState::WillRespond);
                will_respond(&handler, &request, response).await
            }
            Err(error) => Err(error),
        };

        if let Err(error) = &outcome {
            warn!(strategy, url = %request.url(), error = %error, "strategy failed");
        }
        let response = outcome.as_ref().ok().cloned();
        handler.set_state(HandlerState::Responded);
        // The caller may have dropped the response half.
        let _ = tx.send(outcome);

        let mut failure = None;
        for result in handler
            .run_callbacks(&LifecycleEvent::HandlerDidRespond {
                request: &request,
                response: response.as_ref(),
            })
            .await
        {
            if let Err(e) = result {
                failure.get_or_insert(e);
            }
        }

        handler.set_state(HandlerState::Completing);
        if let Err(e) = handler.done_waiting().await {
            failure.get_or_insert(e);
        }

        handler
            .notify(&LifecycleEvent::HandlerDidComplete {
                request: &request,
                response: response.as_ref(),
                error: failure.as_ref(),
            })
            .await;
        // Extensions registered by handlerDidComplete itself.
        if let Err(e) = handler.done_waiting().await {
            failure.get_or_insert(e);
        }
        handler.destroy();

        debug!(strategy, url = %request.url(), ok = failure.is_none(), "request complete");
        failure.map_or(Ok(()), Err)
    }
}

/// Offer `error` to each `handlerDidError` callback; the first response wins.
async fn recover(handler: &StrategyHandler, request: &Request, error: Error) -> Result<Response> {
    if !handler.has_callback(PluginHook::HandlerDidError) {
        return Err(error);
    }

    handler.set_state(HandlerState::Recovering);
    for plugin in handler.iterate_callbacks(PluginHook::HandlerDidError) {
        match plugin.handler_did_error(handler, request, &error).await {
            Ok(Some(response)) => {
                debug!(
                    plugin = plugin.name(),
                    url = %request.url(),
                    error = %error,
                    "recovered from strategy error"
                );
                return Ok(response);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(plugin = plugin.name(), error = %e, "handlerDidError callback failed");
            }
        }
    }
    Err(error)
}

async fn will_respond(
    handler: &StrategyHandler,
    request: &Request,
    response: Response,
) -> Result<Response> {
    let mut response = response;
    for plugin in handler.iterate_callbacks(PluginHook::HandlerWillRespond) {
        response = plugin
            .handler_will_respond(handler, request, response)
            .await
            .map_err(|e| wrap_plugin_error(plugin.as_ref(), e))?;
    }
    Ok(response)
}

#[async_trait]
impl RouteHandler for StrategyRunner {
    async fn handle(&self, ctx: RouteHandlerContext) -> Result<Response> {
        StrategyRunner::handle(self, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachet_types::MemoryCacheStorage;

    struct Unreachable;

    #[async_trait]
    impl Fetcher for Unreachable {
        async fn fetch(&self, _request: &Request, _options: &FetchOptions) -> Result<Response> {
            Err(Error::Transport("offline".into()))
        }
    }

    struct Echo {
        filtered: bool,
    }

    #[async_trait]
    impl Strategy for Echo {
        fn name(&self) -> &'static str {
            "Echo"
        }

        fn requires_cacheable_filter(&self) -> bool {
            self.filtered
        }

        async fn run(&self, request: Request, _handler: &StrategyHandler) -> Result<Response> {
            Ok(Response::ok(request.url().path().to_string()))
        }
    }

    fn runner(strategy: Echo, config: StrategyConfig) -> Result<StrategyRunner> {
        StrategyRunner::new(
            strategy,
            config,
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(Unreachable),
        )
    }

    #[test]
    fn test_default_cache_name() {
        assert_eq!(StrategyConfig::default().cache_name, DEFAULT_CACHE_NAME);
        assert_eq!(StrategyConfig::new("static").cache_name, "static");
    }

    #[test]
    fn test_cacheable_filter_added_when_required() {
        let filtered = runner(Echo { filtered: true }, StrategyConfig::default()).unwrap();
        assert!(filtered.plugins().has_callback(PluginHook::CacheWillUpdate));

        let plain = runner(Echo { filtered: false }, StrategyConfig::default()).unwrap();
        assert!(plain.plugins().is_empty());
    }

    #[tokio::test]
    async fn test_handle_returns_strategy_response() {
        let runner = runner(Echo { filtered: false }, StrategyConfig::default()).unwrap();
        let request = Request::parse(cachet_types::Method::GET, "https://a.test/page").unwrap();

        let (response, done) = runner.handle_all(request);
        assert_eq!(response.await.unwrap().body().as_ref(), b"/page");
        done.await.unwrap();
    }
}
