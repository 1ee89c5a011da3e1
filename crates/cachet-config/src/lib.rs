//! Configuration system for Cachet.
//!
//! Provides TOML-based configuration with:
//! - The origin requests are judged same-origin against
//! - The location of the expiration index
//! - Log level, format and optional log directory
//! - An ordered list of routes, each naming a strategy, a cache and optional
//!   expiration and cacheability rules
//!
//! Files are layered: the user config dir first, then `./cachet.toml`.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
