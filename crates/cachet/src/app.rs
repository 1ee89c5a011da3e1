//! Building a router from configuration.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use cachet_config::{CachetConfig, RouteConfig, StrategyKind};
use cachet_expiration::{ExpirationConfig, ExpirationPlugin, IndexDb};
use cachet_routing::{Route, Router};
use cachet_strategy::{
    CacheFirst, CacheOnly, CacheableResponse, CacheableResponsePlugin, DEFAULT_CACHE_NAME,
    HttpFetcher, NetworkFirst, NetworkOnly, StaleWhileRevalidate, StrategyConfig, StrategyRunner,
};
use cachet_types::{
    CacheStorage, FetchEvent, FetchOptions, Fetcher, MemoryCacheStorage, Method, Request,
    Response, Url,
};
use tracing::{debug, info};

/// A configured router together with the collaborators it was built over.
pub struct App {
    pub router: Router,
    pub storage: Arc<MemoryCacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
    pub index: Arc<IndexDb>,
}

/// What [`App::fetch`] produced.
#[derive(Debug)]
pub struct Outcome {
    pub response: Response,
    /// Whether a route (or the default handler) answered, as opposed to the
    /// plain network fallback.
    pub routed: bool,
}

impl App {
    /// Build from `config` with the HTTP fetcher.
    pub fn from_config(config: &CachetConfig) -> Result<Self> {
        Self::with_fetcher(config, Arc::new(HttpFetcher::new()))
    }

    pub fn with_fetcher(config: &CachetConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;
        let origin = config.origin_url()?;

        let storage = Arc::new(MemoryCacheStorage::new());
        let shared: Arc<dyn CacheStorage> = storage.clone();
        let index = Arc::new(match config.index_path() {
            Some(path) => IndexDb::open(path),
            None => IndexDb::in_memory(),
        });

        let mut router = match &origin {
            Some(origin) => Router::with_origin(origin.clone()),
            None => Router::new(),
        };

        for (position, route_config) in config.routes.iter().enumerate() {
            let runner = build_runner(
                route_config,
                origin.as_ref(),
                &shared,
                &fetcher,
                &index,
            )
            .with_context(|| format!("route #{} ('{}')", position + 1, route_config.pattern))?;
            let method = Method::from_bytes(route_config.method.as_bytes())?;
            router.register_route(Route::regex(&route_config.pattern, Arc::new(runner), method)?)?;
        }

        info!(
            routes = config.routes.len(),
            index = ?index.location(),
            "router built from config"
        );

        Ok(Self {
            router,
            storage,
            fetcher,
            index,
        })
    }

    /// Route `request`, falling back to the plain network when no route
    /// handles it, then wait for the request's background work to finish.
    pub async fn fetch(&self, request: Request) -> Result<Outcome> {
        let event = FetchEvent::new(request.clone());
        let outcome = match self.router.handle_request(request.clone(), Some(event.clone())) {
            Some(future) => future.await.map(|response| (response, true)),
            None => {
                debug!(url = %request.url(), "unrouted, fetching from network");
                self.fetcher
                    .fetch(&request, &FetchOptions::default())
                    .await
                    .map(|response| (response, false))
            }
        };
        event.settled().await;

        let (response, routed) = outcome?;
        Ok(Outcome { response, routed })
    }
}

fn build_runner(
    route: &RouteConfig,
    origin: Option<&Url>,
    storage: &Arc<dyn CacheStorage>,
    fetcher: &Arc<dyn Fetcher>,
    index: &Arc<IndexDb>,
) -> Result<StrategyRunner> {
    let cache_name = route.cache_name.as_deref().unwrap_or(DEFAULT_CACHE_NAME);
    let mut config = StrategyConfig::new(cache_name);

    if let Some(cacheable) = &route.cacheable {
        let rule = CacheableResponse::new(cacheable.statuses.clone(), cacheable.headers.clone())?;
        config = config.with_plugin(Arc::new(CacheableResponsePlugin::new(rule)));
    }

    if let Some(section) = &route.expiration {
        let mut bounds = ExpirationConfig::new();
        if let Some(max_entries) = section.max_entries {
            bounds = bounds.with_max_entries(max_entries);
        }
        if let Some(max_age) = section.max_age() {
            bounds = bounds.with_max_age(max_age);
        }
        let mut plugin = ExpirationPlugin::new(bounds, Arc::clone(storage), Arc::clone(index))?;
        if let Some(origin) = origin {
            plugin = plugin.with_base_url(origin.clone());
        }
        config = config.with_plugin(Arc::new(plugin));
    }

    let storage = Arc::clone(storage);
    let fetcher = Arc::clone(fetcher);
    let timeout = route.network_timeout();
    let runner = match route.strategy {
        StrategyKind::CacheFirst => StrategyRunner::new(CacheFirst, config, storage, fetcher)?,
        StrategyKind::CacheOnly => StrategyRunner::new(CacheOnly, config, storage, fetcher)?,
        StrategyKind::NetworkFirst => {
            let mut strategy = NetworkFirst::new();
            if let Some(timeout) = timeout {
                strategy = strategy.with_network_timeout(timeout);
            }
            StrategyRunner::new(strategy, config, storage, fetcher)?
        }
        StrategyKind::NetworkOnly => {
            let mut strategy = NetworkOnly::new();
            if let Some(timeout) = timeout {
                strategy = strategy.with_network_timeout(timeout);
            }
            StrategyRunner::new(strategy, config, storage, fetcher)?
        }
        StrategyKind::StaleWhileRevalidate => {
            StrategyRunner::new(StaleWhileRevalidate, config, storage, fetcher)?
        }
    };

    debug!(
        strategy = route.strategy.as_str(),
        cache = cache_name,
        pattern = %route.pattern,
        plugins = runner.plugins().len(),
        "route configured"
    );
    Ok(runner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cachet_expiration::TimestampIndex;
    use cachet_types::Cache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(
            &self,
            request: &Request,
            _options: &FetchOptions,
        ) -> cachet_types::Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::ok(request.url().path().to_string()).with_url(request.url().clone()))
        }
    }

    fn config(toml: &str) -> CachetConfig {
        CachetConfig::from_toml(toml).unwrap()
    }

    fn get(url: &str) -> Request {
        Request::parse(Method::GET, url).unwrap()
    }

    #[tokio::test]
    async fn test_cache_first_route_serves_from_cache() {
        let fetcher = Arc::new(CountingFetcher::default());
        let app = App::with_fetcher(
            &config(
                r#"
origin = "https://app.test"

[[routes]]
pattern = "/static/"
strategy = "cache-first"
cache_name = "static"
"#,
            ),
            fetcher.clone(),
        )
        .unwrap();

        for _ in 0..3 {
            let outcome = app.fetch(get("https://app.test/static/app.js")).await.unwrap();
            assert!(outcome.routed);
            assert_eq!(outcome.response.body().as_ref(), b"/static/app.js");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.storage.cache("static").len(), 1);
    }

    #[tokio::test]
    async fn test_unrouted_request_uses_network() {
        let fetcher = Arc::new(CountingFetcher::default());
        let app = App::with_fetcher(&CachetConfig::new(), fetcher.clone()).unwrap();

        let outcome = app.fetch(get("https://app.test/page")).await.unwrap();
        assert!(!outcome.routed);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiration_bounds_route_cache() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        let toml = format!(
            r#"
origin = "https://app.test"

[index]
path = "{}"

[[routes]]
pattern = "/img/"
strategy = "stale-while-revalidate"
cache_name = "images"

[routes.expiration]
max_entries = 1
"#,
            db_path.display()
        );
        let app = App::with_fetcher(&config(&toml), Arc::new(CountingFetcher::default())).unwrap();

        app.fetch(get("https://app.test/img/a.png")).await.unwrap();
        app.fetch(get("https://app.test/img/b.png")).await.unwrap();

        let keys = app.storage.cache("images").keys().await.unwrap();
        let urls: Vec<&str> = keys.iter().map(|r| r.url().as_str()).collect();
        assert_eq!(urls, vec!["https://app.test/img/b.png"]);

        let index = TimestampIndex::new(Arc::clone(&app.index), "images");
        let records = index.get_all_timestamps().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://app.test/img/b.png");
        assert!(db_path.exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = App::with_fetcher(
            &config(
                r#"
[[routes]]
pattern = "(unclosed"
strategy = "cache-first"
"#,
            ),
            Arc::new(CountingFetcher::default()),
        );
        assert!(result.is_err());
    }
}
