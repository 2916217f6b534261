//! Client error types.

use qcache_core::ConfigError;

use crate::executor::BoxError;

/// Errors from the cached database client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The executor failed to run the query.
    #[error("query failed on database {database:?}: {source}")]
    QueryFailed {
        database: String,
        #[source]
        source: BoxError,
    },

    /// Reading or writing the cache failed.
    #[error(transparent)]
    Cache(#[from] qcache_core::Error),

    /// The store configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// True if the failure came from the executor rather than the cache.
    pub fn is_query_failure(&self) -> bool {
        matches!(self, ClientError::QueryFailed { .. })
    }
}
