//! Shared types for the Cachet request-interception cache.
//!
//! These types are shared between `cachet-routing` (which dispatches requests),
//! `cachet-strategy` (which produces responses) and `cachet-expiration` (which
//! keeps caches bounded). The host runtime plugs in through the collaborator
//! traits defined here: [`Fetcher`] for the network and [`CacheStorage`] /
//! [`Cache`] for the response store.

pub mod cache;
pub mod error;
pub mod event;
pub mod fetch;
pub mod handler;
pub mod message;
pub mod memory;

pub use cache::{Cache, CacheStorage, MatchOptions};
pub use error::{Error, Result};
pub use event::FetchEvent;
pub use fetch::{FetchOptions, Fetcher};
pub use handler::{
    RouteHandler, RouteHandlerContext, RouteParams, SharedRouteHandler, handler_fn,
};
pub use message::{Request, RequestMode, Response, ResponseKind};
pub use memory::{MemoryCache, MemoryCacheStorage};

pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
pub use ::url::Url;
