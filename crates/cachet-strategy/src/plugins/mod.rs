//! Built-in plugins.

mod cacheable;

pub use cacheable::{CacheOkAndOpaque, CacheableResponse, CacheableResponsePlugin};
