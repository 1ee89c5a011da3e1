//! Error types for request interception and caching.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the Cachet error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type shared by routing, strategies and expiration.
///
/// Payloads are plain strings so the error is `Clone`: a failed request is
/// reported on both halves of a strategy's `handle_all` result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid or missing configuration detected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A route could not be registered.
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// No routes are registered for the method of the route being removed.
    #[error("No routes registered for method {method}")]
    RouteNotFound { method: String },

    /// The route being removed is not registered under its method.
    #[error("Route is not registered for method {method}")]
    RouteNotRegistered { method: String },

    /// A URL could not be parsed or resolved.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The network fetch failed.
    #[error("Network error: {0}")]
    Transport(String),

    /// The network did not answer within the configured timeout.
    #[error("Network request timed out after {0:?}")]
    Timeout(Duration),

    /// A strategy finished without a usable response.
    #[error("{strategy} produced no response for {url}")]
    NoResponse { strategy: String, url: String },

    /// Only GET requests may be written to a cache.
    #[error("Cannot cache non-GET request: {method} {url}")]
    NonGetCachePut { method: String, url: String },

    /// A plugin callback failed.
    #[error("Plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    /// The response cache or timestamp index failed.
    #[error("Store error: {0}")]
    Store(String),

    /// An expiry check was requested on an engine without a max age.
    #[error("Expiration check requires max_age to be configured")]
    ExpirationWithoutMaxAge,

    /// The strategy handler was used after it completed.
    #[error("Strategy handler has already completed")]
    HandlerDestroyed,

    /// Internal failure (task panicked, channel closed, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a failure raised inside a plugin callback.
    pub fn plugin(plugin: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error came from the network layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout(_))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("background task failed: {err}"))
    }
}
