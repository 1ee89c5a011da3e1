//! Cache expiration for Cachet.
//!
//! Each named cache can be bounded by age, by entry count, or both. The time
//! each URL was last written is kept in a SQLite index ([`IndexDb`]) so the
//! bounds survive restarts; [`ExpirationEngine`] uses it to decide what to
//! evict and deletes from both the response cache and the index.
//!
//! [`ExpirationPlugin`] wires an engine per cache into a strategy's plugin
//! chain: every cache write refreshes the URL's timestamp and runs a sweep.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod plugin;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ExpirationConfig;
pub use engine::ExpirationEngine;
pub use error::{ExpirationError, Result};
pub use index::{IndexDb, IndexLocation, TimestampIndex, TimestampRecord};
pub use plugin::ExpirationPlugin;
