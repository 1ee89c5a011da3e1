//! Strategy plugin that enforces expiration bounds on the caches it sees.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cachet_strategy::{CacheUpdate, Plugin, PluginHook, StrategyHandler};
use cachet_types::{CacheStorage, Request, Response, Url, header};
use chrono::DateTime;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ExpirationConfig;
use crate::engine::ExpirationEngine;
use crate::error::Result;
use crate::index::IndexDb;

/// Applies one [`ExpirationConfig`] to every cache written through the
/// strategies it is attached to. Engines are created per cache name on first
/// use.
pub struct ExpirationPlugin {
    config: ExpirationConfig,
    storage: Arc<dyn CacheStorage>,
    db: Arc<IndexDb>,
    clock: Arc<dyn Clock>,
    base: Option<Url>,
    engines: Mutex<HashMap<String, Arc<ExpirationEngine>>>,
}

impl std::fmt::Debug for ExpirationPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirationPlugin")
            .field("config", &self.config)
            .field("db", &self.db)
            .field("engines", &self.engines.lock().len())
            .finish_non_exhaustive()
    }
}

impl ExpirationPlugin {
    pub fn new(
        config: ExpirationConfig,
        storage: Arc<dyn CacheStorage>,
        db: Arc<IndexDb>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            db,
            clock: Arc::new(SystemClock),
            base: None,
            engines: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    pub fn config(&self) -> &ExpirationConfig {
        &self.config
    }

    /// The engine for `cache_name`, created on first request.
    pub fn engine(&self, cache_name: &str) -> Result<Arc<ExpirationEngine>> {
        let mut engines = self.engines.lock();
        if let Some(engine) = engines.get(cache_name) {
            return Ok(Arc::clone(engine));
        }

        let mut engine = ExpirationEngine::new(
            cache_name,
            self.config,
            Arc::clone(&self.storage),
            Arc::clone(&self.db),
        )?
        .with_clock(Arc::clone(&self.clock));
        if let Some(base) = &self.base {
            engine = engine.with_base_url(base.clone());
        }

        let engine = Arc::new(engine);
        engines.insert(cache_name.to_string(), Arc::clone(&engine));
        debug!(cache = %cache_name, "expiration engine created");
        Ok(engine)
    }

    /// Delete every cache this plugin manages together with its index rows.
    pub async fn delete_cache_and_metadata(&self) -> Result<()> {
        let engines: Vec<Arc<ExpirationEngine>> = self.engines.lock().drain().map(|(_, e)| e).collect();
        for engine in engines {
            self.storage.delete(engine.cache_name()).await?;
            engine.delete().await?;
        }
        Ok(())
    }

    /// Whether the response's `Date` header is within the max age. Responses
    /// without a parseable `Date` count as fresh.
    fn is_response_date_fresh(&self, response: &Response) -> bool {
        let Some(cutoff) = self.config.cutoff(self.clock.now_millis()) else {
            return true;
        };
        let Some(date) = response
            .header_str(header::DATE)
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        else {
            return true;
        };

        date.timestamp_millis() >= cutoff
    }
}

/// Sweep if `url` may be stale, or unconditionally when only a count bound is
/// configured.
async fn sweep_if_stale(engine: Arc<ExpirationEngine>, url: String) -> Result<()> {
    let stale = match engine.config().max_age {
        Some(_) => engine.is_entry_expired(&url).await?,
        None => true,
    };
    if stale {
        engine.expire_entries().await?;
    }
    Ok(())
}

#[async_trait]
impl Plugin for ExpirationPlugin {
    fn name(&self) -> &str {
        "expiration"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheDidUpdate, PluginHook::CachedResponseWillBeUsed]
    }

    async fn cache_did_update(
        &self,
        _handler: &StrategyHandler,
        update: &CacheUpdate,
    ) -> cachet_types::Result<()> {
        let engine = self.engine(&update.cache_name)?;
        engine.update_timestamp(update.request.url().as_str()).await?;
        engine.expire_entries().await?;
        Ok(())
    }

    async fn cached_response_will_be_used(
        &self,
        handler: &StrategyHandler,
        cache_name: &str,
        request: &Request,
        cached: Option<Response>,
    ) -> cachet_types::Result<Option<Response>> {
        let Some(response) = cached else {
            return Ok(None);
        };

        let engine = self.engine(cache_name)?;
        let url = request.url().to_string();
        handler.wait_until(async move {
            sweep_if_stale(engine, url).await.map_err(|e| {
                warn!(error = %e, "background expiration failed");
                cachet_types::Error::from(e)
            })
        });

        if self.is_response_date_fresh(&response) {
            Ok(Some(response))
        } else {
            debug!(url = %request.url(), cache = %cache_name, "cached response is past max age");
            Ok(None)
        }
    }
}
