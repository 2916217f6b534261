//! Core types and shared functionality for qcache.
//!
//! This crate provides:
//! - A disk-backed cache store for tabular query results
//! - SQL normalization and cache key derivation
//! - Parquet and MessagePack serializers
//! - Unified error types
//! - Configuration structures

mod atomic;
pub mod cache;
pub mod config;
pub mod error;
pub mod serializer;
pub mod table;

pub use cache::{CacheKey, KeyDeriver, Metadata, Normalizer, Store, hash_query, normalize_query};
pub use config::{ConfigError, StoreConfig};
pub use error::Error;
pub use serializer::{Backend, ParquetCodec, Serializer, TableCodec};
pub use table::{Table, Value, ValueKind};
