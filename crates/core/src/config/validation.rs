//! Configuration validation rules.
//!
//! This module provides validation logic for `StoreConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::StoreConfig;
use crate::serializer::{Backend, MAX_COMPRESSION_LEVEL};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl StoreConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `root` is empty
    /// - `compression_level` exceeds 9
    /// - `max_normalize_length` or `memo_capacity` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "root".into(), reason: "must not be empty".into() });
        }

        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(ConfigError::Invalid {
                field: "compression_level".into(),
                reason: format!("must be between 0 and {MAX_COMPRESSION_LEVEL}"),
            });
        }

        if self.max_normalize_length == 0 {
            return Err(ConfigError::Invalid {
                field: "max_normalize_length".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.memo_capacity == 0 {
            return Err(ConfigError::Invalid { field: "memo_capacity".into(), reason: "must be greater than 0".into() });
        }

        if self.backend == Backend::Parquet && self.compression_level > 0 {
            tracing::warn!(
                compression_level = self.compression_level,
                "compression_level only applies to the msgpack backend; \
                 use parquet_codec to compress parquet payloads"
            );
        }

        Ok(())
    }
}
