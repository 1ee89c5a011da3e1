//! Caching strategies for Cachet.
//!
//! A [`Strategy`] is the caching algorithm (cache-first, network-first, ...).
//! [`StrategyRunner`] binds a strategy to its [`StrategyConfig`] and the host
//! collaborators and runs the fixed per-request pipeline: a fresh
//! [`StrategyHandler`] per request, plugin lifecycle callbacks, error
//! recovery and background-work tracking.
//!
//! ```ignore
//! let runner = StrategyRunner::new(
//!     CacheFirst,
//!     StrategyConfig::new("static"),
//!     Arc::new(MemoryCacheStorage::new()),
//!     Arc::new(HttpFetcher::new()),
//! )?;
//! let (response, done) = runner.handle_all(request);
//! ```

pub mod fetcher;
pub mod handler;
pub mod plugin;
pub mod plugins;
pub mod runner;
pub mod strategies;

pub use fetcher::HttpFetcher;
pub use handler::{HandlerState, StrategyHandler};
pub use plugin::{CacheKeyMode, CacheUpdate, LifecycleEvent, Plugin, PluginChain, PluginHook};
pub use plugins::{CacheOkAndOpaque, CacheableResponse, CacheableResponsePlugin};
pub use runner::{
    DEFAULT_CACHE_NAME, DoneFuture, HandlerOptions, ResponseFuture, Strategy, StrategyConfig,
    StrategyRunner,
};
pub use strategies::{CacheFirst, CacheOnly, NetworkFirst, NetworkOnly, StaleWhileRevalidate};
