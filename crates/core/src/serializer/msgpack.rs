//! MessagePack backend, the fallback for tables parquet cannot hold.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use super::TableCodec;
use crate::{Error, Table};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Highest gzip compression level.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Serializer that encodes the whole table with MessagePack.
///
/// `compression_level` 0 writes plain MessagePack; 1-9 wraps it in gzip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgPackSerializer {
    compression_level: u32,
}

impl MsgPackSerializer {
    /// Levels above 9 are clamped.
    pub fn new(compression_level: u32) -> Self {
        Self { compression_level: compression_level.min(MAX_COMPRESSION_LEVEL) }
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }
}

impl TableCodec for MsgPackSerializer {
    fn format_tag(&self) -> &'static str {
        "msgpack"
    }

    fn extension(&self) -> &'static str {
        "msgpack"
    }

    fn encode(&self, table: &Table, out: &mut File) -> Result<(), Error> {
        let bytes = rmp_serde::to_vec_named(table)?;
        let mut out = BufWriter::new(out);
        if self.compression_level == 0 {
            out.write_all(&bytes)?;
        } else {
            let mut encoder = GzEncoder::new(&mut out, Compression::new(self.compression_level));
            encoder.write_all(&bytes)?;
            encoder.finish()?;
        }
        out.flush()?;
        Ok(())
    }

    fn decode(&self, file: File) -> Result<Table, Error> {
        let mut bytes = Vec::new();
        BufReader::new(file).read_to_end(&mut bytes)?;
        if bytes.starts_with(&GZIP_MAGIC) {
            let mut inflated = Vec::new();
            GzDecoder::new(bytes.as_slice()).read_to_end(&mut inflated)?;
            bytes = inflated;
        }
        Ok(rmp_serde::from_slice(&bytes)?)
    }
}
