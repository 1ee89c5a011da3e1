//! Persistent timestamp index backed by SQLite.
//!
//! One database holds the index for every cache; rows are keyed by
//! `"<cache name>|<url>"` and carry the time the URL was last written. The
//! connection is opened on first use. All queries run on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cachet_types::Url;
use cachet_types::message::strip_fragment;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{ExpirationError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Where the index lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    Memory,
    File(PathBuf),
}

// ─────────────────────────────────────────────────────────────────────────────
// Database
// ─────────────────────────────────────────────────────────────────────────────

/// Lazily opened SQLite database shared by all timestamp indexes.
pub struct IndexDb {
    location: IndexLocation,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for IndexDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDb")
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish()
    }
}

impl IndexDb {
    /// Index stored in the file at `path`. Nothing is touched until first use.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            location: IndexLocation::File(path.as_ref().to_path_buf()),
            conn: Mutex::new(None),
        }
    }

    /// Index that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            location: IndexLocation::Memory,
            conn: Mutex::new(None),
        }
    }

    pub fn location(&self) -> &IndexLocation {
        &self.location
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Drop the connection. The next query reopens it.
    pub fn close(&self) {
        if self.conn.lock().take().is_some() {
            debug!(location = ?self.location, "index connection closed");
        }
    }

    /// Run `f` against the connection, opening it first if needed.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(ExpirationError::Task(
                "index connection unavailable".to_string(),
            )),
        }
    }

    /// Names of every cache with at least one indexed entry.
    pub fn cache_names(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT cache_name FROM cache_entries ORDER BY cache_name")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match &self.location {
            IndexLocation::Memory => Connection::open_in_memory()?,
            IndexLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path)?
            }
        };

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrate(&conn)?;

        info!(location = ?self.location, "timestamp index opened");
        Ok(conn)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current_version >= SCHEMA_VERSION {
        debug!("Index schema up to date (version {})", current_version);
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            id TEXT PRIMARY KEY,
            cache_name TEXT NOT NULL,
            url TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );

        -- Oldest-first scans per cache
        CREATE INDEX IF NOT EXISTS idx_cache_entries_cache_timestamp
            ON cache_entries(cache_name, timestamp);
        "#,
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    info!("Index schema created (version {})", SCHEMA_VERSION);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-cache view
// ─────────────────────────────────────────────────────────────────────────────

/// One indexed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampRecord {
    pub id: String,
    pub cache_name: String,
    pub url: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl TimestampRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cache_name: row.get(1)?,
            url: row.get(2)?,
            timestamp: row.get(3)?,
        })
    }
}

/// The slice of the index belonging to one cache.
#[derive(Debug, Clone)]
pub struct TimestampIndex {
    db: Arc<IndexDb>,
    cache_name: String,
    base: Option<Url>,
}

impl TimestampIndex {
    pub fn new(db: Arc<IndexDb>, cache_name: impl Into<String>) -> Self {
        Self {
            db,
            cache_name: cache_name.into(),
            base: None,
        }
    }

    /// Resolve relative URLs against `base`.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Canonical form of `url`: absolute, without fragment.
    pub fn normalize_url(&self, url: &str) -> Result<String> {
        let parsed = match &self.base {
            Some(base) => base.join(url)?,
            None => Url::parse(url)?,
        };
        Ok(strip_fragment(&parsed))
    }

    fn record_id(&self, url: &str) -> String {
        format!("{}|{}", self.cache_name, url)
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| ExpirationError::Task(e.to_string()))?
    }

    /// Insert or replace the timestamp for `url`.
    pub async fn set_timestamp(&self, url: &str, timestamp: i64) -> Result<()> {
        let url = self.normalize_url(url)?;
        let id = self.record_id(&url);
        let cache_name = self.cache_name.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries (id, cache_name, url, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, cache_name, url, timestamp],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_timestamp(&self, url: &str) -> Result<Option<i64>> {
        let id = self.record_id(&self.normalize_url(url)?);
        self.run(move |conn| {
            let timestamp = conn
                .query_row(
                    "SELECT timestamp FROM cache_entries WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(timestamp)
        })
        .await
    }

    /// Every record for this cache, oldest first. Equal timestamps keep
    /// write order.
    pub async fn get_all_timestamps(&self) -> Result<Vec<TimestampRecord>> {
        let cache_name = self.cache_name.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, cache_name, url, timestamp FROM cache_entries
                 WHERE cache_name = ?1
                 ORDER BY timestamp ASC, rowid ASC",
            )?;
            let records = stmt
                .query_map(params![cache_name], TimestampRecord::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    /// Records written strictly before `cutoff`, oldest first.
    pub async fn entries_older_than(&self, cutoff: i64) -> Result<Vec<TimestampRecord>> {
        let cache_name = self.cache_name.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, cache_name, url, timestamp FROM cache_entries
                 WHERE cache_name = ?1 AND timestamp < ?2
                 ORDER BY timestamp ASC, rowid ASC",
            )?;
            let records = stmt
                .query_map(params![cache_name, cutoff], TimestampRecord::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    /// Remove the record for `url`. Missing records are not an error.
    pub async fn delete_id(&self, url: &str) -> Result<bool> {
        let id = self.record_id(&self.normalize_url(url)?);
        self.run(move |conn| {
            let deleted = conn.execute("DELETE FROM cache_entries WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Remove every record for this cache.
    pub async fn delete_all(&self) -> Result<usize> {
        let cache_name = self.cache_name.clone();
        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM cache_entries WHERE cache_name = ?1",
                params![cache_name],
            )?;
            Ok(deleted)
        })
        .await
    }

    pub async fn len(&self) -> Result<usize> {
        let cache_name = self.cache_name.clone();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?1",
                params![cache_name],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(name: &str) -> TimestampIndex {
        TimestampIndex::new(Arc::new(IndexDb::in_memory()), name)
    }

    #[tokio::test]
    async fn test_lazy_open() {
        let db = Arc::new(IndexDb::in_memory());
        assert!(!db.is_open());

        let idx = TimestampIndex::new(Arc::clone(&db), "static");
        assert!(idx.is_empty().await.unwrap());
        assert!(db.is_open());
    }

    #[tokio::test]
    async fn test_set_and_get_timestamp() {
        let idx = index("static");
        idx.set_timestamp("https://a.test/app.js", 100).await.unwrap();
        idx.set_timestamp("https://a.test/app.js#v2", 200).await.unwrap();

        assert_eq!(
            idx.get_timestamp("https://a.test/app.js").await.unwrap(),
            Some(200)
        );
        assert_eq!(idx.len().await.unwrap(), 1);
        assert_eq!(idx.get_timestamp("https://a.test/other.js").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_relative_urls_resolve_against_base() {
        let base = Url::parse("https://a.test/app/").unwrap();
        let idx = index("static").with_base(base);

        idx.set_timestamp("img/logo.png", 1).await.unwrap();
        assert_eq!(
            idx.get_timestamp("https://a.test/app/img/logo.png")
                .await
                .unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_ordering_and_ties() {
        let idx = index("static");
        idx.set_timestamp("https://a.test/c", 30).await.unwrap();
        idx.set_timestamp("https://a.test/a", 10).await.unwrap();
        idx.set_timestamp("https://a.test/b2", 20).await.unwrap();
        idx.set_timestamp("https://a.test/b1", 20).await.unwrap();

        let urls: Vec<String> = idx
            .get_all_timestamps()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://a.test/a",
                "https://a.test/b2",
                "https://a.test/b1",
                "https://a.test/c"
            ]
        );

        let old = idx.entries_older_than(20).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].url, "https://a.test/a");
    }

    #[tokio::test]
    async fn test_caches_are_isolated() {
        let db = Arc::new(IndexDb::in_memory());
        let a = TimestampIndex::new(Arc::clone(&db), "a");
        let b = TimestampIndex::new(Arc::clone(&db), "b");

        a.set_timestamp("https://x.test/1", 1).await.unwrap();
        b.set_timestamp("https://x.test/1", 2).await.unwrap();

        assert_eq!(a.delete_all().await.unwrap(), 1);
        assert!(a.is_empty().await.unwrap());
        assert_eq!(b.len().await.unwrap(), 1);
        assert_eq!(db.cache_names().unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let idx = index("static");
        idx.set_timestamp("https://a.test/a", 1).await.unwrap();

        assert!(idx.delete_id("https://a.test/a").await.unwrap());
        assert!(!idx.delete_id("https://a.test/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_reopen_keeps_schema_version_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let db = Arc::new(IndexDb::open(&path));
        let idx = TimestampIndex::new(Arc::clone(&db), "static");
        idx.set_timestamp("https://a.test/a", 7).await.unwrap();

        db.close();
        assert!(!db.is_open());

        let version: i32 = db
            .with_conn(|conn| Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        assert_eq!(idx.get_timestamp("https://a.test/a").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_corrupt_file_reports_database_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        std::fs::write(&path, vec![0x5a; 4096]).unwrap();

        let idx = TimestampIndex::new(Arc::new(IndexDb::open(&path)), "static");
        let result = idx.len().await;
        assert!(matches!(result, Err(ExpirationError::Database(_))));
    }
}
