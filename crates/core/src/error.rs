//! Unified error types for qcache.
//!
//! Every failure in the cache core surfaces as one of these variants. Nothing
//! is retried or swallowed inside the core.

use std::path::{Path, PathBuf};

/// Unified error types for the query cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No cached payload and/or metadata for the given query.
    #[error("NOT_FOUND: {what} not found for the given query ({})", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    /// The active serializer cannot encode a value present in the table.
    #[error("FORMAT_UNSUPPORTED: {message}. Consider using the msgpack backend instead: backend = \"msgpack\"")]
    FormatUnsupported { message: String },

    /// Filesystem-level failure.
    #[error("IO_ERROR: {}{}", source, path.as_ref().map_or(String::new(), |p| format!(" ({})", p.display())))]
    Io {
        #[source]
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// Payload bytes could not be encoded or decoded.
    #[error("CODEC_ERROR: {0}")]
    Codec(String),

    /// Archive could not be written or read.
    #[error("ARCHIVE_ERROR: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Metadata artifact is not valid JSON or misses required fields.
    #[error("METADATA_ERROR: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Invalid cache key format.
    #[error("INVALID_KEY: {0:?} is not a 64 character hex digest")]
    InvalidKey(String),

    /// Invalid input (e.g., a row with the wrong number of values).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Wrap an I/O error together with the path it happened on.
    pub fn io(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Error::Io { source, path: Some(path.as_ref().to_path_buf()) }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Error::FormatUnsupported { message: message.into() }
    }

    /// True for errors a caller can recover from by recomputing the result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io { source: err, path: None }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        let path = err.file.path().to_path_buf();
        Error::io(err.error, path)
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Error::Codec(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(err: arrow::error::ArrowError) -> Self {
        Error::Codec(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Error::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound { what: "Metadata", path: PathBuf::from("/tmp/abc.json") };
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("abc.json"));
    }

    #[test]
    fn test_unsupported_names_fallback() {
        let err = Error::unsupported("column \"id\" mixes int and text values");
        let message = err.to_string();
        assert!(message.contains("FORMAT_UNSUPPORTED"));
        assert!(message.contains("backend = \"msgpack\""));
    }

    #[test]
    fn test_is_not_found() {
        let err = Error::NotFound { what: "Cached results", path: PathBuf::new() };
        assert!(err.is_not_found());
        assert!(!Error::InvalidKey("x".into()).is_not_found());
    }
}
