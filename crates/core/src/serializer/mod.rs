//! Serialization backends for cached tables.
//!
//! A backend is picked once, when the store is built:
//!
//! - [`ParquetSerializer`]: columnar, compact and portable, but every column
//!   must hold a single scalar type
//! - [`MsgPackSerializer`]: encodes any table, optionally gzip-compressed

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::{Error, Table};

mod columnar;
mod msgpack;

pub use columnar::{ParquetCodec, ParquetSerializer};
pub use msgpack::{MAX_COMPRESSION_LEVEL, MsgPackSerializer};

/// Encoding strategy for the payload artifact of a cache entry.
pub trait TableCodec {
    /// Short name used as the store's subdirectory.
    fn format_tag(&self) -> &'static str;

    /// File extension of payload artifacts, without the dot.
    fn extension(&self) -> &'static str;

    fn encode(&self, table: &Table, out: &mut File) -> Result<(), Error>;

    fn decode(&self, file: File) -> Result<Table, Error>;

    /// Write `table` to `path`. The file at `path` is replaced only on success.
    fn dump(&self, table: &Table, path: &Path) -> Result<(), Error> {
        write_atomic(path, |file| self.encode(table, file))
    }

    fn load(&self, path: &Path) -> Result<Table, Error> {
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        self.decode(file)
    }
}

/// Serializer backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Parquet,
    #[serde(alias = "fallback")]
    MsgPack,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Parquet => "parquet",
            Backend::MsgPack => "msgpack",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" | "columnar" => Ok(Backend::Parquet),
            "msgpack" | "fallback" => Ok(Backend::MsgPack),
            other => Err(Error::InvalidInput(format!("unknown backend {other:?}, expected parquet or msgpack"))),
        }
    }
}

/// The serializer variant a store was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serializer {
    Parquet(ParquetSerializer),
    MsgPack(MsgPackSerializer),
}

impl Serializer {
    /// Build the serializer for `backend`. Only the parameter relevant to
    /// the chosen backend is used.
    pub fn new(backend: Backend, codec: ParquetCodec, compression_level: u32) -> Self {
        match backend {
            Backend::Parquet => Serializer::Parquet(ParquetSerializer::new(codec)),
            Backend::MsgPack => Serializer::MsgPack(MsgPackSerializer::new(compression_level)),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Serializer::Parquet(_) => Backend::Parquet,
            Serializer::MsgPack(_) => Backend::MsgPack,
        }
    }

    fn inner(&self) -> &dyn TableCodec {
        match self {
            Serializer::Parquet(s) => s,
            Serializer::MsgPack(s) => s,
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Serializer::Parquet(ParquetSerializer::default())
    }
}

impl TableCodec for Serializer {
    fn format_tag(&self) -> &'static str {
        self.inner().format_tag()
    }

    fn extension(&self) -> &'static str {
        self.inner().extension()
    }

    fn encode(&self, table: &Table, out: &mut File) -> Result<(), Error> {
        self.inner().encode(table, out)
    }

    fn decode(&self, file: File) -> Result<Table, Error> {
        self.inner().decode(file)
    }
}
