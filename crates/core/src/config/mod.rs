//! Store configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (QCACHE_*)
//! 2. TOML config file (if QCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::normalize::{DEFAULT_MAX_LENGTH, DEFAULT_MEMO_CAPACITY};
use crate::serializer::{Backend, ParquetCodec};

mod validation;

pub use validation::ConfigError;

/// Settings a store is built from. A store never changes them after opening.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (QCACHE_*)
/// 2. TOML config file (if QCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Cache root directory. Each backend writes below `<root>/<format>`.
    ///
    /// Set via QCACHE_ROOT environment variable.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Serializer backend, `parquet` or `msgpack`.
    ///
    /// Set via QCACHE_BACKEND environment variable.
    #[serde(default)]
    pub backend: Backend,

    /// Whether queries are normalized before hashing.
    ///
    /// Set via QCACHE_NORMALIZE environment variable.
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Page compression of the parquet backend.
    ///
    /// Set via QCACHE_PARQUET_CODEC environment variable.
    #[serde(default)]
    pub parquet_codec: ParquetCodec,

    /// Gzip level (0-9) of the msgpack backend. 0 disables compression.
    ///
    /// Set via QCACHE_COMPRESSION_LEVEL environment variable.
    #[serde(default)]
    pub compression_level: u32,

    /// Queries longer than this many characters are hashed as-is.
    ///
    /// Set via QCACHE_MAX_NORMALIZE_LENGTH environment variable.
    #[serde(default = "default_max_normalize_length")]
    pub max_normalize_length: usize,

    /// Number of normalized queries kept in memory.
    #[serde(default = "default_memo_capacity")]
    pub memo_capacity: usize,

    /// Recorded in metadata as the executing user. Falls back to the
    /// `USER`/`USERNAME` environment variables.
    #[serde(default)]
    pub username: Option<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from("./.qcache")
}

fn default_true() -> bool {
    true
}

fn default_max_normalize_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_memo_capacity() -> usize {
    DEFAULT_MEMO_CAPACITY
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            backend: Backend::default(),
            normalize: true,
            parquet_codec: ParquetCodec::default(),
            compression_level: 0,
            max_normalize_length: default_max_normalize_length(),
            memo_capacity: default_memo_capacity(),
            username: None,
        }
    }
}

impl StoreConfig {
    /// Defaults rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), ..Default::default() }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `QCACHE_`
    /// 2. TOML file from `QCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("QCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(Env::prefixed("QCACHE_").map(|key| key.as_str().to_lowercase().into()).split("__"));

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The executing user recorded in metadata, `"unknown"` if not resolvable.
    pub fn resolved_username(&self) -> String {
        self.username
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".into())
    }
}
