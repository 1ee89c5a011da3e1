//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! origin = "https://app.example.com"
//!
//! [index]                  # expiration index location
//! [logging]                # log level and format
//! [[routes]]               # ordered; the first matching route wins
//! [routes.expiration]      # optional bounds for that route's cache
//! [routes.cacheable]       # optional cacheability rule
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// Methods a route may name.
pub const ROUTE_METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "DELETE", "PATCH"];

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so partial configs (e.g. a project-local
/// override) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachetConfig {
    /// Origin that counts as same-origin when matching routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Expiration index settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexConfig>,

    /// Logging settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// Routes in precedence order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteConfig>,
}

impl CachetConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Routes are an ordered list, so a layer that defines any routes
    /// replaces the whole list rather than interleaving with it.
    pub fn merge(&mut self, other: CachetConfig) {
        if other.origin.is_some() {
            self.origin = other.origin;
        }

        if other.index.is_some() {
            self.index = other.index;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }

        if !other.routes.is_empty() {
            self.routes = other.routes;
        }
    }

    /// The parsed origin, if one is configured.
    pub fn origin_url(&self) -> Result<Option<Url>> {
        let Some(origin) = &self.origin else {
            return Ok(None);
        };
        let url = Url::parse(origin).map_err(|e| ConfigError::invalid("origin", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "origin",
                format!("'{origin}' must be an http or https URL"),
            ));
        }
        Ok(Some(url))
    }

    /// Path of the expiration index; `None` means in-memory.
    pub fn index_path(&self) -> Option<&PathBuf> {
        self.index.as_ref().and_then(|i| i.path.as_ref())
    }

    /// Check everything that parsing alone does not.
    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;
        for (position, route) in self.routes.iter().enumerate() {
            route.validate(position)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Index / Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Where expiration timestamps are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// SQLite database file. Omitted means an in-memory index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Log output settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `cachet_strategy=debug`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Also write daily-rotated log files here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Routes
// ─────────────────────────────────────────────────────────────────────────────

/// Caching strategy a route uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    CacheFirst,
    CacheOnly,
    NetworkFirst,
    NetworkOnly,
    StaleWhileRevalidate,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheFirst => "cache-first",
            Self::CacheOnly => "cache-only",
            Self::NetworkFirst => "network-first",
            Self::NetworkOnly => "network-only",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }

    /// Whether the strategy honours a network timeout.
    pub fn supports_network_timeout(&self) -> bool {
        matches!(self, Self::NetworkFirst | Self::NetworkOnly)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[[routes]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Regular expression over the full request URL.
    pub pattern: String,

    /// HTTP method; defaults to GET.
    #[serde(default = "default_method")]
    pub method: String,

    pub strategy: StrategyKind,

    /// Cache the strategy reads and writes. Defaults to the runtime cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<ExpirationSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cacheable: Option<CacheableSection>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RouteConfig {
    pub fn new(pattern: impl Into<String>, strategy: StrategyKind) -> Self {
        Self {
            pattern: pattern.into(),
            method: default_method(),
            strategy,
            cache_name: None,
            network_timeout_seconds: None,
            expiration: None,
            cacheable: None,
        }
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_seconds.map(Duration::from_secs)
    }

    fn validate(&self, position: usize) -> Result<()> {
        let context = format!("route #{} ('{}')", position + 1, self.pattern);

        if !ROUTE_METHODS.contains(&self.method.as_str()) {
            return Err(ConfigError::invalid(
                context,
                format!(
                    "method '{}' is not one of {}",
                    self.method,
                    ROUTE_METHODS.join(", ")
                ),
            ));
        }

        if let Err(e) = regex::Regex::new(&self.pattern) {
            return Err(ConfigError::invalid(context, e.to_string()));
        }

        if let Some(seconds) = self.network_timeout_seconds {
            if !self.strategy.supports_network_timeout() {
                return Err(ConfigError::invalid(
                    context,
                    format!("{} does not take a network timeout", self.strategy),
                ));
            }
            if seconds == 0 {
                return Err(ConfigError::invalid(
                    context,
                    "network_timeout_seconds must be positive",
                ));
            }
        }

        if let Some(expiration) = &self.expiration {
            expiration.validate(&context)?;
        }

        if let Some(cacheable) = &self.cacheable
            && cacheable.statuses.is_empty()
            && cacheable.headers.is_empty()
        {
            return Err(ConfigError::invalid(
                context,
                "[cacheable] needs statuses or headers",
            ));
        }

        Ok(())
    }
}

/// Bounds for a route's cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirationSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<u64>,
}

impl ExpirationSection {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_seconds.map(Duration::from_secs)
    }

    fn validate(&self, context: &str) -> Result<()> {
        if self.max_entries.is_none() && self.max_age_seconds.is_none() {
            return Err(ConfigError::invalid(
                context,
                "[expiration] needs max_entries or max_age_seconds",
            ));
        }
        if self.max_entries == Some(0) {
            return Err(ConfigError::invalid(context, "max_entries must be positive"));
        }
        Ok(())
    }
}

/// Which responses a route may cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheableSection {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<u16>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
origin = "https://app.example.com"

[index]
path = "/var/lib/cachet/index.db"

[logging]
level = "debug"
json = true

[[routes]]
pattern = "^https://app\\.example\\.com/static/"
strategy = "cache-first"
cache_name = "static"

[routes.expiration]
max_entries = 50
max_age_seconds = 86400

[routes.cacheable]
statuses = [0, 200]

[[routes]]
pattern = "/api/"
method = "GET"
strategy = "network-first"
network_timeout_seconds = 3
"#;

    #[test]
    fn test_parse_full_config() {
        let config = CachetConfig::from_toml(FULL).unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.origin_url().unwrap().unwrap().as_str(),
            "https://app.example.com/"
        );
        assert_eq!(
            config.index_path(),
            Some(&PathBuf::from("/var/lib/cachet/index.db"))
        );
        assert!(config.logging.as_ref().unwrap().json);
        assert_eq!(config.routes.len(), 2);

        let statics = &config.routes[0];
        assert_eq!(statics.method, "GET");
        assert_eq!(statics.strategy, StrategyKind::CacheFirst);
        assert_eq!(statics.cache_name.as_deref(), Some("static"));
        let expiration = statics.expiration.as_ref().unwrap();
        assert_eq!(expiration.max_entries, Some(50));
        assert_eq!(expiration.max_age(), Some(Duration::from_secs(86400)));
        assert_eq!(statics.cacheable.as_ref().unwrap().statuses, vec![0, 200]);

        let api = &config.routes[1];
        assert_eq!(api.strategy, StrategyKind::NetworkFirst);
        assert_eq!(api.network_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_empty_config() {
        let config = CachetConfig::from_toml("").unwrap();
        assert_eq!(config, CachetConfig::new());
        config.validate().unwrap();
        assert!(config.origin_url().unwrap().is_none());
        assert!(config.index_path().is_none());
    }

    #[test]
    fn test_unknown_strategy_fails_to_parse() {
        let err = CachetConfig::from_toml(
            r#"
[[routes]]
pattern = "/"
strategy = "cache-sometimes"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = CachetConfig::from_toml(FULL).unwrap();
        let reparsed = CachetConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_merge_overrides_sections() {
        let mut base = CachetConfig::from_toml(FULL).unwrap();
        let overlay = CachetConfig::from_toml(
            r#"
origin = "https://staging.example.com"

[[routes]]
pattern = "/"
strategy = "network-only"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.origin.as_deref(), Some("https://staging.example.com"));
        // Untouched sections survive.
        assert!(base.index.is_some());
        assert_eq!(base.logging.as_ref().unwrap().level.as_deref(), Some("debug"));
        // Routes are replaced wholesale.
        assert_eq!(base.routes.len(), 1);
        assert_eq!(base.routes[0].strategy, StrategyKind::NetworkOnly);
    }

    #[test]
    fn test_merge_without_routes_keeps_routes() {
        let mut base = CachetConfig::from_toml(FULL).unwrap();
        base.merge(CachetConfig::from_toml("[logging]\nlevel = \"warn\"").unwrap());
        assert_eq!(base.routes.len(), 2);
        assert_eq!(base.logging.unwrap().level.as_deref(), Some("warn"));
    }

    fn invalid_message(config: &CachetConfig) -> String {
        match config.validate().unwrap_err() {
            ConfigError::Invalid { message, .. } => message,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    fn one_route(route: RouteConfig) -> CachetConfig {
        CachetConfig {
            routes: vec![route],
            ..CachetConfig::new()
        }
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let config = CachetConfig {
            origin: Some("ftp://files.example.com".into()),
            ..CachetConfig::new()
        };
        assert!(invalid_message(&config).contains("http or https"));

        let config = CachetConfig {
            origin: Some("not a url".into()),
            ..CachetConfig::new()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_routes() {
        let mut route = RouteConfig::new("/", StrategyKind::CacheFirst);
        route.method = "OPTIONS".into();
        assert!(invalid_message(&one_route(route)).contains("OPTIONS"));

        let route = RouteConfig::new("(unclosed", StrategyKind::CacheFirst);
        assert!(one_route(route).validate().is_err());

        let mut route = RouteConfig::new("/", StrategyKind::CacheFirst);
        route.network_timeout_seconds = Some(3);
        assert!(invalid_message(&one_route(route)).contains("network timeout"));

        let mut route = RouteConfig::new("/", StrategyKind::CacheFirst);
        route.expiration = Some(ExpirationSection::default());
        assert!(invalid_message(&one_route(route)).contains("max_entries or max_age_seconds"));

        let mut route = RouteConfig::new("/", StrategyKind::CacheFirst);
        route.expiration = Some(ExpirationSection {
            max_entries: Some(0),
            max_age_seconds: None,
        });
        assert!(invalid_message(&one_route(route)).contains("positive"));

        let mut route = RouteConfig::new("/", StrategyKind::StaleWhileRevalidate);
        route.cacheable = Some(CacheableSection::default());
        assert!(invalid_message(&one_route(route)).contains("statuses or headers"));
    }

    #[test]
    fn test_strategy_kind_names() {
        assert_eq!(StrategyKind::StaleWhileRevalidate.to_string(), "stale-while-revalidate");
        assert!(StrategyKind::NetworkOnly.supports_network_timeout());
        assert!(!StrategyKind::CacheOnly.supports_network_timeout());
    }
}
