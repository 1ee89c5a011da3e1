//! Built-in caching strategies.

mod cache_first;
mod cache_only;
mod network_first;
mod network_only;
mod stale_while_revalidate;

pub use cache_first::CacheFirst;
pub use cache_only::CacheOnly;
pub use network_first::NetworkFirst;
pub use network_only::NetworkOnly;
pub use stale_while_revalidate::StaleWhileRevalidate;

use cachet_types::{Error, Request};

pub(crate) fn no_response(strategy: &str, request: &Request) -> Error {
    Error::NoResponse {
        strategy: strategy.to_string(),
        url: request.url().to_string(),
    }
}
