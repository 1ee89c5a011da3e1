//! Plugin lifecycle callbacks and the per-strategy plugin chain.
//!
//! A plugin implements any subset of the hooks in [`PluginHook`]. It declares
//! that subset through [`Plugin::hooks`]; the chain groups plugins by hook so
//! each phase only visits the plugins that asked for it. Every callback has a
//! pass-through default, so a plugin only writes the methods it declares.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cachet_types::{Error, Request, Response, Result};

use crate::handler::StrategyHandler;

/// A named lifecycle point at which plugins are called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginHook {
    /// May rewrite the request used as a cache key.
    CacheKeyWillBeUsed,
    /// May rewrite a request before it goes to the network.
    RequestWillFetch,
    /// Notified when a network request fails.
    FetchDidFail,
    /// May replace a successful network response.
    FetchDidSucceed,
    /// Decides whether a response may be cached. At most one per chain.
    CacheWillUpdate,
    /// Notified after a cache write.
    CacheDidUpdate,
    /// May replace or drop a response read from the cache.
    CachedResponseWillBeUsed,
    /// Notified before the strategy runs.
    HandlerWillStart,
    /// May recover from a strategy failure with a fallback response.
    HandlerDidError,
    /// May replace the response about to be returned.
    HandlerWillRespond,
    /// Notified once the response has been handed back.
    HandlerDidRespond,
    /// Notified after all background work for the request finished.
    HandlerDidComplete,
}

impl fmt::Display for PluginHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginHook::CacheKeyWillBeUsed => "cacheKeyWillBeUsed",
            PluginHook::RequestWillFetch => "requestWillFetch",
            PluginHook::FetchDidFail => "fetchDidFail",
            PluginHook::FetchDidSucceed => "fetchDidSucceed",
            PluginHook::CacheWillUpdate => "cacheWillUpdate",
            PluginHook::CacheDidUpdate => "cacheDidUpdate",
            PluginHook::CachedResponseWillBeUsed => "cachedResponseWillBeUsed",
            PluginHook::HandlerWillStart => "handlerWillStart",
            PluginHook::HandlerDidError => "handlerDidError",
            PluginHook::HandlerWillRespond => "handlerWillRespond",
            PluginHook::HandlerDidRespond => "handlerDidRespond",
            PluginHook::HandlerDidComplete => "handlerDidComplete",
        };
        f.write_str(name)
    }
}

/// Whether a cache key is being computed for a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKeyMode {
    Read,
    Write,
}

/// Details of a completed cache write.
#[derive(Debug, Clone)]
pub struct CacheUpdate {
    pub cache_name: String,
    pub request: Request,
    pub old_response: Option<Response>,
    pub new_response: Response,
}

/// A strategy plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// The hooks this plugin implements.
    fn hooks(&self) -> &[PluginHook];

    async fn cache_key_will_be_used(
        &self,
        _handler: &StrategyHandler,
        request: Request,
        _mode: CacheKeyMode,
    ) -> Result<Request> {
        Ok(request)
    }

    async fn request_will_fetch(
        &self,
        _handler: &StrategyHandler,
        request: Request,
    ) -> Result<Request> {
        Ok(request)
    }

    async fn fetch_did_fail(
        &self,
        _handler: &StrategyHandler,
        _original_request: &Request,
        _request: &Request,
        _error: &Error,
    ) -> Result<()> {
        Ok(())
    }

    async fn fetch_did_succeed(
        &self,
        _handler: &StrategyHandler,
        _request: &Request,
        response: Response,
    ) -> Result<Response> {
        Ok(response)
    }

    /// Return `None` to prevent the response from being cached.
    async fn cache_will_update(
        &self,
        _handler: &StrategyHandler,
        _request: &Request,
        response: Response,
    ) -> Result<Option<Response>> {
        Ok(Some(response))
    }

    async fn cache_did_update(
        &self,
        _handler: &StrategyHandler,
        _update: &CacheUpdate,
    ) -> Result<()> {
        Ok(())
    }

    /// Return `None` to treat the entry as a cache miss.
    async fn cached_response_will_be_used(
        &self,
        _handler: &StrategyHandler,
        _cache_name: &str,
        _request: &Request,
        cached: Option<Response>,
    ) -> Result<Option<Response>> {
        Ok(cached)
    }

    async fn handler_will_start(
        &self,
        _handler: &StrategyHandler,
        _request: &Request,
    ) -> Result<()> {
        Ok(())
    }

    /// Return a response to recover from `error`.
    async fn handler_did_error(
        &self,
        _handler: &StrategyHandler,
        _request: &Request,
        _error: &Error,
    ) -> Result<Option<Response>> {
        Ok(None)
    }

    async fn handler_will_respond(
        &self,
        _handler: &StrategyHandler,
        _request: &Request,
        response: Response,
    ) -> Result<Response> {
        Ok(response)
    }

    async fn handler_did_respond(
        &self,
        _handler: &StrategyHandler,
        _request: &Request,
        _response: Option<&Response>,
    ) -> Result<()> {
        Ok(())
    }

    async fn handler_did_complete(
        &self,
        _handler: &StrategyHandler,
        _request: &Request,
        _response: Option<&Response>,
        _error: Option<&Error>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Arguments for the notification hooks run by [`PluginChain::run_callbacks`].
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    HandlerWillStart {
        request: &'a Request,
    },
    HandlerDidRespond {
        request: &'a Request,
        response: Option<&'a Response>,
    },
    HandlerDidComplete {
        request: &'a Request,
        response: Option<&'a Response>,
        error: Option<&'a Error>,
    },
    FetchDidFail {
        original_request: &'a Request,
        request: &'a Request,
        error: &'a Error,
    },
    CacheDidUpdate(&'a CacheUpdate),
}

impl LifecycleEvent<'_> {
    /// The hook this event is delivered to.
    pub fn hook(&self) -> PluginHook {
        match self {
            LifecycleEvent::HandlerWillStart { .. } => PluginHook::HandlerWillStart,
            LifecycleEvent::HandlerDidRespond { .. } => PluginHook::HandlerDidRespond,
            LifecycleEvent::HandlerDidComplete { .. } => PluginHook::HandlerDidComplete,
            LifecycleEvent::FetchDidFail { .. } => PluginHook::FetchDidFail,
            LifecycleEvent::CacheDidUpdate(_) => PluginHook::CacheDidUpdate,
        }
    }
}

/// Plugins of one strategy, grouped by hook in registration order.
#[derive(Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
    by_hook: HashMap<PluginHook, Vec<Arc<dyn Plugin>>>,
}

impl fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginChain")
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PluginChain {
    /// Build a chain, rejecting more than one `cacheWillUpdate` implementation.
    ///
    /// Every registration counts, so a plugin registered twice runs twice. A
    /// hook listed twice in one plugin's [`Plugin::hooks`] is only added once.
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Result<Self> {
        let mut by_hook: HashMap<PluginHook, Vec<Arc<dyn Plugin>>> = HashMap::new();
        for plugin in &plugins {
            let mut seen: Vec<PluginHook> = Vec::new();
            for hook in plugin.hooks() {
                if seen.contains(hook) {
                    continue;
                }
                seen.push(*hook);
                by_hook.entry(*hook).or_default().push(Arc::clone(plugin));
            }
        }

        if let Some(updaters) = by_hook.get(&PluginHook::CacheWillUpdate) {
            if updaters.len() > 1 {
                let names: Vec<&str> = updaters.iter().map(|p| p.name()).collect();
                return Err(Error::InvalidConfig(format!(
                    "at most one plugin may implement {}, found: {}",
                    PluginHook::CacheWillUpdate,
                    names.join(", ")
                )));
            }
        }

        Ok(Self { plugins, by_hook })
    }

    /// All plugins in registration order.
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins implementing `hook`, in registration order.
    pub fn iterate_callbacks(&self, hook: PluginHook) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.by_hook.get(&hook).into_iter().flatten()
    }

    pub fn has_callback(&self, hook: PluginHook) -> bool {
        self.by_hook.get(&hook).is_some_and(|v| !v.is_empty())
    }

    /// Deliver a notification to every plugin implementing its hook, in
    /// order, collecting each outcome. Failures do not stop the chain.
    pub async fn run_callbacks(
        &self,
        handler: &StrategyHandler,
        event: &LifecycleEvent<'_>,
    ) -> Vec<Result<()>> {
        let mut results = Vec::new();
        for plugin in self.iterate_callbacks(event.hook()) {
            let outcome = match *event {
                LifecycleEvent::HandlerWillStart { request } => {
                    plugin.handler_will_start(handler, request).await
                }
                LifecycleEvent::HandlerDidRespond { request, response } => {
                    plugin.handler_did_respond(handler, request, response).await
                }
                LifecycleEvent::HandlerDidComplete {
                    request,
                    response,
                    error,
                } => {
                    plugin
                        .handler_did_complete(handler, request, response, error)
                        .await
                }
                LifecycleEvent::FetchDidFail {
                    original_request,
                    request,
                    error,
                } => {
                    plugin
                        .fetch_did_fail(handler, original_request, request, error)
                        .await
                }
                LifecycleEvent::CacheDidUpdate(update) => {
                    plugin.cache_did_update(handler, update).await
                }
            };
            results.push(outcome.map_err(|e| wrap_plugin_error(plugin.as_ref(), e)));
        }
        results
    }
}

/// Attribute an error to the plugin that raised it.
pub(crate) fn wrap_plugin_error(plugin: &dyn Plugin, error: Error) -> Error {
    match error {
        Error::Plugin { .. } => error,
        other => Error::plugin(plugin.name(), other),
    }
}
