//! CLI command handlers.

pub mod check;
pub mod fetch;
pub mod index;

use cachet_config::CachetConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// The loaded (merged) configuration.
    pub config: CachetConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}
