//! Client code for qcache.
//!
//! This crate wraps a query executor with the disk cache from `qcache-core`:
//! results are served from the cache when present, otherwise the query runs
//! and its results are stored with provenance metadata.

pub mod database;
pub mod error;
pub mod executor;
pub mod session;

pub use database::{CachedDatabase, QueryOptions};
pub use error::ClientError;
pub use executor::{BoxError, QueryExecutor};
pub use session::Session;
