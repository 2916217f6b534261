//! Database handle with transparent result caching.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use qcache_core::{Metadata, Store, StoreConfig, Table};

use crate::error::ClientError;
use crate::executor::QueryExecutor;
use crate::session::Session;

/// Version recorded in the metadata of every entry this client writes.
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How a single query call uses the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Execute even if a cached entry exists (and overwrite it).
    pub force: bool,
    /// Read from and write to the cache at all.
    pub cache: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { force: false, cache: true }
    }
}

impl QueryOptions {
    /// Always execute and refresh the cached entry.
    pub fn forced() -> Self {
        Self { force: true, cache: true }
    }

    /// Execute without touching the cache.
    pub fn uncached() -> Self {
        Self { force: false, cache: false }
    }
}

/// A named database whose query results are cached on disk.
pub struct CachedDatabase<E> {
    name: String,
    store: Store,
    executor: E,
    username: String,
}

impl<E: QueryExecutor> CachedDatabase<E> {
    /// Open the database `name`, caching under `<config.root>/<name>`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if `config` fails validation, or
    /// `ClientError::Cache` if the store directory cannot be created.
    pub fn open(name: impl Into<String>, executor: E, config: &StoreConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let name = name.into();
        let store = Store::open(&StoreConfig { root: config.root.join(&name), ..config.clone() })?;
        tracing::debug!(database = %name, dir = %store.dir().display(), "opened cached database");
        Ok(Self { name, store, executor, username: config.resolved_username() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run `query`, serving it from the cache when allowed.
    ///
    /// The query is recorded in `session` once it returns results, whether
    /// or not it hit the cache. Failed queries are never recorded.
    pub fn query(&self, query: &str, options: QueryOptions, session: &mut Session) -> Result<Table, ClientError> {
        if options.cache && !options.force && self.store.exists(query) {
            let (results, metadata) = self.store.load(query)?;
            tracing::info!(
                database = %self.name,
                executed_at = %metadata.executed_at,
                duration_secs = metadata.duration,
                "loaded results from cache"
            );
            session.record(query);
            return Ok(results);
        }

        tracing::info!(database = %self.name, force = options.force, "executing query");
        let executed_at = Local::now();
        let started = Instant::now();
        let results = self
            .executor
            .execute(query)
            .map_err(|source| ClientError::QueryFailed { database: self.name.clone(), source })?;
        let duration = started.elapsed();
        tracing::info!(database = %self.name, duration_ms = duration.as_millis() as u64, "query finished");

        if options.cache {
            let metadata = Metadata::new(executed_at, duration)
                .with_extra("db_name", self.name.as_str())
                .with_extra("qcache", CLIENT_VERSION)
                .with_extra("username", self.username.as_str());
            self.store.dump(query, &results, metadata)?;
            tracing::info!(database = %self.name, "stored results in cache");
        }

        session.record(query);
        Ok(results)
    }

    pub fn exists_in_cache(&self, query: &str) -> bool {
        self.store.exists(query)
    }

    /// Export the cache entries of every query recorded in `session`.
    pub fn export_session(&self, path: impl AsRef<Path>, session: &Session) -> Result<PathBuf, ClientError> {
        let queries: Vec<&str> = session.iter().collect();
        Ok(self.store.export(path, Some(&queries))?)
    }
}

impl<E> std::fmt::Debug for CachedDatabase<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDatabase").field("name", &self.name).field("store", &self.store).finish_non_exhaustive()
    }
}
