//! Bounded eviction for one named cache.

use std::sync::Arc;

use cachet_types::{CacheStorage, MatchOptions, Request, Url};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::ExpirationConfig;
use crate::error::{ExpirationError, Result};
use crate::index::{IndexDb, TimestampIndex, TimestampRecord};

#[derive(Debug, Default)]
struct SweepState {
    running: bool,
    rerun: bool,
}

/// Marks a sweep as running. Dropping it (on error, or when the sweeping
/// future is cancelled) clears the state so later sweeps are not locked out.
struct SweepGuard<'a> {
    state: &'a Mutex<SweepState>,
    held: bool,
}

impl<'a> SweepGuard<'a> {
    /// Start a sweep, or request a rerun of the one in progress.
    fn acquire(state: &'a Mutex<SweepState>) -> Option<Self> {
        let mut sweep = state.lock();
        if sweep.running {
            sweep.rerun = true;
            return None;
        }
        sweep.running = true;
        Some(Self { state, held: true })
    }

    /// Clear the rerun flag, or release the sweep if none was set. Both
    /// happen under one lock so a concurrent request is never lost.
    fn take_rerun(&mut self) -> bool {
        let mut sweep = self.state.lock();
        if sweep.rerun {
            sweep.rerun = false;
            true
        } else {
            sweep.running = false;
            self.held = false;
            false
        }
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        if self.held {
            *self.state.lock() = SweepState::default();
        }
    }
}

/// Keeps one cache within its age and count bounds.
///
/// Timestamps are refreshed on every write, so the count bound evicts the
/// least recently written entries first.
pub struct ExpirationEngine {
    cache_name: String,
    config: ExpirationConfig,
    storage: Arc<dyn CacheStorage>,
    index: TimestampIndex,
    clock: Arc<dyn Clock>,
    sweep: Mutex<SweepState>,
}

impl std::fmt::Debug for ExpirationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirationEngine")
            .field("cache_name", &self.cache_name)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl ExpirationEngine {
    /// Create an engine for `cache_name`. Fails if `config` sets no bound or
    /// a zero entry bound.
    pub fn new(
        cache_name: impl Into<String>,
        config: ExpirationConfig,
        storage: Arc<dyn CacheStorage>,
        db: Arc<IndexDb>,
    ) -> Result<Self> {
        config.validate()?;
        let cache_name = cache_name.into();
        Ok(Self {
            index: TimestampIndex::new(db, cache_name.clone()),
            cache_name,
            config,
            storage,
            clock: Arc::new(SystemClock),
            sweep: Mutex::new(SweepState::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resolve relative URLs against `base` before indexing.
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.index = self.index.with_base(base);
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn config(&self) -> &ExpirationConfig {
        &self.config
    }

    pub fn index(&self) -> &TimestampIndex {
        &self.index
    }

    /// Evict everything outside the bounds, returning the evicted URLs
    /// oldest first.
    ///
    /// A call made while a sweep is already running returns an empty list
    /// and makes the running sweep go round once more.
    pub async fn expire_entries(&self) -> Result<Vec<String>> {
        let Some(mut guard) = SweepGuard::acquire(&self.sweep) else {
            trace!(cache = %self.cache_name, "sweep already running, rerun requested");
            return Ok(Vec::new());
        };

        let mut evicted = Vec::new();
        loop {
            evicted.append(&mut self.sweep_once().await?);
            if !guard.take_rerun() {
                break;
            }
        }
        Ok(evicted)
    }

    async fn sweep_once(&self) -> Result<Vec<String>> {
        let now = self.clock.now_millis();
        let mut expired: Vec<TimestampRecord> = Vec::new();

        if let Some(cutoff) = self.config.cutoff(now) {
            expired = self.index.entries_older_than(cutoff).await?;
        }

        if let Some(max_entries) = self.config.max_entries {
            let all = self.index.get_all_timestamps().await?;
            let excess = all.len().saturating_sub(max_entries);
            for record in all.into_iter().take(excess) {
                if !expired.iter().any(|r| r.id == record.id) {
                    expired.push(record);
                }
            }
        }

        if expired.is_empty() {
            return Ok(Vec::new());
        }
        expired.sort_by_key(|r| r.timestamp);

        let cache = self.storage.open(&self.cache_name).await?;
        let options = MatchOptions::default();
        let mut urls = Vec::with_capacity(expired.len());
        for record in expired {
            let request = Request::get(Url::parse(&record.url)?);
            cache.delete(&request, &options).await?;
            self.index.delete_id(&record.url).await?;
            urls.push(record.url);
        }

        debug!(
            cache = %self.cache_name,
            evicted = urls.len(),
            "expired cache entries"
        );
        Ok(urls)
    }

    /// Record `url` as written now.
    pub async fn update_timestamp(&self, url: &str) -> Result<()> {
        self.index
            .set_timestamp(url, self.clock.now_millis())
            .await
    }

    /// Whether `url` is older than the max age. URLs with no timestamp count
    /// as expired. Fails when no max age is configured.
    pub async fn is_entry_expired(&self, url: &str) -> Result<bool> {
        let cutoff = self
            .config
            .cutoff(self.clock.now_millis())
            .ok_or(ExpirationError::MissingMaxAge)?;
        match self.index.get_timestamp(url).await? {
            None => Ok(true),
            Some(timestamp) => Ok(timestamp < cutoff),
        }
    }

    /// Forget every timestamp for this cache.
    pub async fn delete(&self) -> Result<()> {
        let removed = self.index.delete_all().await?;
        debug!(cache = %self.cache_name, removed, "expiration metadata deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachet_types::MemoryCacheStorage;

    fn storage() -> Arc<dyn CacheStorage> {
        Arc::new(MemoryCacheStorage::new())
    }

    #[test]
    fn test_engine_requires_bound() {
        let result = ExpirationEngine::new(
            "static",
            ExpirationConfig::new(),
            storage(),
            Arc::new(IndexDb::in_memory()),
        );
        assert!(matches!(result, Err(ExpirationError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_is_entry_expired_requires_max_age() {
        let engine = ExpirationEngine::new(
            "static",
            ExpirationConfig::new().with_max_entries(3),
            storage(),
            Arc::new(IndexDb::in_memory()),
        )
        .unwrap();

        let result = engine.is_entry_expired("https://a.test/a").await;
        assert!(matches!(result, Err(ExpirationError::MissingMaxAge)));
    }

    #[tokio::test]
    async fn test_unknown_url_counts_as_expired() {
        let engine = ExpirationEngine::new(
            "static",
            ExpirationConfig::new().with_max_age(std::time::Duration::from_secs(60)),
            storage(),
            Arc::new(IndexDb::in_memory()),
        )
        .unwrap();

        assert!(engine.is_entry_expired("https://a.test/never").await.unwrap());
    }

    #[tokio::test]
    async fn test_huge_max_age_keeps_entries() {
        let engine = ExpirationEngine::new(
            "static",
            ExpirationConfig::new().with_max_age(std::time::Duration::from_secs(u64::MAX)),
            storage(),
            Arc::new(IndexDb::in_memory()),
        )
        .unwrap();

        engine.update_timestamp("https://a.test/a").await.unwrap();
        assert!(!engine.is_entry_expired("https://a.test/a").await.unwrap());
        assert!(engine.expire_entries().await.unwrap().is_empty());
        assert_eq!(engine.index().len().await.unwrap(), 1);
    }

    fn bounded_engine() -> ExpirationEngine {
        ExpirationEngine::new(
            "static",
            ExpirationConfig::new().with_max_entries(1),
            storage(),
            Arc::new(IndexDb::in_memory()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_dropped_sweep_releases_guard() {
        let engine = bounded_engine();
        engine.update_timestamp("https://a.test/a").await.unwrap();
        engine.update_timestamp("https://a.test/b").await.unwrap();

        let guard = SweepGuard::acquire(&engine.sweep).unwrap();
        assert!(engine.expire_entries().await.unwrap().is_empty());
        drop(guard);

        assert!(!engine.sweep.lock().running);
        assert!(!engine.sweep.lock().rerun);
        assert_eq!(engine.expire_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_sweep_does_not_block_later_sweeps() {
        let engine = bounded_engine();
        engine.update_timestamp("https://a.test/a").await.unwrap();
        engine.update_timestamp("https://a.test/b").await.unwrap();

        {
            let mut sweep = Box::pin(engine.expire_entries());
            tokio::select! {
                biased;
                _ = &mut sweep => {}
                _ = std::future::ready(()) => {}
            }
        }

        engine.expire_entries().await.unwrap();
        assert_eq!(engine.index().len().await.unwrap(), 1);
    }
}
