//! File-backed cache for query results.
//!
//! This module provides a persistent, content-addressed cache on the local
//! filesystem. It supports:
//!
//! - Query normalization so formatting differences share one entry
//! - Content-addressed keys using SHA-256 hashing
//! - Pluggable payload serializers (parquet, msgpack)
//! - Listing, zip export and import of entries

pub mod archive;
pub mod hash;
pub mod listing;
pub mod metadata;
pub mod normalize;
pub mod store;

pub use crate::Error;

pub use hash::{CacheKey, KeyDeriver, hash_query};
pub use listing::LIST_COLUMNS;
pub use metadata::Metadata;
pub use normalize::{Normalizer, normalize_query};
pub use store::Store;
