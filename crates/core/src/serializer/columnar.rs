//! Parquet backend.
//!
//! Tables are converted to a single Arrow record batch and written with the
//! parquet Arrow writer. Each column must hold one scalar kind.

use std::any::Any;
use std::fs::File;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, LargeBinaryArray,
    LargeStringArray, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};

use super::TableCodec;
use crate::{Error, Table, Value, ValueKind};

/// Page compression used for parquet payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCodec {
    None,
    /// Fast.
    #[default]
    Snappy,
    /// Better ratio, slower.
    Zstd,
}

impl ParquetCodec {
    fn compression(self) -> Compression {
        match self {
            ParquetCodec::None => Compression::UNCOMPRESSED,
            ParquetCodec::Snappy => Compression::SNAPPY,
            ParquetCodec::Zstd => Compression::ZSTD(ZstdLevel::default()),
        }
    }
}

impl std::str::FromStr for ParquetCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(ParquetCodec::None),
            "snappy" => Ok(ParquetCodec::Snappy),
            "zstd" => Ok(ParquetCodec::Zstd),
            other => Err(Error::InvalidInput(format!("unknown parquet codec {other:?}"))),
        }
    }
}

/// Columnar serializer writing Apache Parquet files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParquetSerializer {
    codec: ParquetCodec,
}

impl ParquetSerializer {
    pub fn new(codec: ParquetCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> ParquetCodec {
        self.codec
    }
}

impl TableCodec for ParquetSerializer {
    fn format_tag(&self) -> &'static str {
        "parquet"
    }

    fn extension(&self) -> &'static str {
        "parquet"
    }

    fn encode(&self, table: &Table, out: &mut File) -> Result<(), Error> {
        let batch = to_record_batch(table)?;
        let props = WriterProperties::builder().set_compression(self.codec.compression()).build();
        let mut writer = ArrowWriter::try_new(out, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    fn decode(&self, file: File) -> Result<Table, Error> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let columns: Vec<String> = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
        let reader = builder.build()?;

        let mut table = Table::new(columns);
        for batch in reader {
            let batch = batch?;
            let mut decoded = batch
                .columns()
                .iter()
                .map(|column| column_values(column.as_ref()).map(Vec::into_iter))
                .collect::<Result<Vec<_>, Error>>()?;
            for _ in 0..batch.num_rows() {
                table.push_row(decoded.iter_mut().map(|column| column.next().unwrap_or(Value::Null)).collect())?;
            }
        }
        Ok(table)
    }
}

fn to_record_batch(table: &Table) -> Result<RecordBatch, Error> {
    if table.num_columns() == 0 {
        return Err(Error::unsupported("a table without columns cannot be stored as parquet"));
    }

    let mut fields = Vec::with_capacity(table.num_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.num_columns());
    for (index, name) in table.columns().iter().enumerate() {
        let kind = table
            .column_kind(index)
            .map_err(|(first, other)| Error::unsupported(format!("column {name:?} mixes {first} and {other} values")))?;
        let values = table.rows().iter().map(|row| &row[index]);

        let array: ArrayRef = match kind {
            Some(ValueKind::Int) => Arc::new(values.map(Value::as_i64).collect::<Int64Array>()),
            Some(ValueKind::Float) => Arc::new(
                values
                    .map(|v| match v {
                        Value::Float(f) => Some(*f),
                        _ => None,
                    })
                    .collect::<Float64Array>(),
            ),
            Some(ValueKind::Bool) => Arc::new(
                values
                    .map(|v| match v {
                        Value::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect::<BooleanArray>(),
            ),
            Some(ValueKind::Bytes) => Arc::new(
                values
                    .map(|v| match v {
                        Value::Bytes(b) => Some(b.as_slice()),
                        _ => None,
                    })
                    .collect::<BinaryArray>(),
            ),
            Some(ValueKind::Text) | None => Arc::new(values.map(Value::as_str).collect::<StringArray>()),
            Some(ValueKind::Json) => {
                return Err(Error::unsupported(format!(
                    "column {name:?} holds nested values that have no parquet column type"
                )));
            }
        };
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
}

fn downcast<T: 'static>(array: &dyn Any) -> Result<&T, Error> {
    array.downcast_ref::<T>().ok_or_else(|| Error::Codec("parquet column does not match its declared type".into()))
}

fn column_values(array: &dyn Array) -> Result<Vec<Value>, Error> {
    let any = array.as_any();
    let values = match array.data_type() {
        DataType::Int64 => downcast::<Int64Array>(any)?.iter().map(|v| v.map_or(Value::Null, Value::Int)).collect(),
        DataType::Int32 => {
            downcast::<Int32Array>(any)?.iter().map(|v| v.map_or(Value::Null, |i| Value::Int(i64::from(i)))).collect()
        }
        DataType::Float64 => {
            downcast::<Float64Array>(any)?.iter().map(|v| v.map_or(Value::Null, Value::Float)).collect()
        }
        DataType::Float32 => downcast::<Float32Array>(any)?
            .iter()
            .map(|v| v.map_or(Value::Null, |f| Value::Float(f64::from(f))))
            .collect(),
        DataType::Boolean => {
            downcast::<BooleanArray>(any)?.iter().map(|v| v.map_or(Value::Null, Value::Bool)).collect()
        }
        DataType::Utf8 => downcast::<StringArray>(any)?.iter().map(Value::from).collect(),
        DataType::LargeUtf8 => downcast::<LargeStringArray>(any)?.iter().map(Value::from).collect(),
        DataType::Binary => {
            downcast::<BinaryArray>(any)?.iter().map(|v| v.map_or(Value::Null, |b| Value::Bytes(b.to_vec()))).collect()
        }
        DataType::LargeBinary => downcast::<LargeBinaryArray>(any)?
            .iter()
            .map(|v| v.map_or(Value::Null, |b| Value::Bytes(b.to_vec())))
            .collect(),
        DataType::Null => vec![Value::Null; array.len()],
        other => return Err(Error::Codec(format!("unsupported parquet column type {other}"))),
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::tests::mixed_table;

    fn round_trip(serializer: ParquetSerializer, table: &Table) -> Table {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        serializer.dump(table, &path).unwrap();
        serializer.load(&path).unwrap()
    }

    #[test]
    fn test_round_trip_every_codec() {
        for codec in [ParquetCodec::None, ParquetCodec::Snappy, ParquetCodec::Zstd] {
            assert_eq!(round_trip(ParquetSerializer::new(codec), &mixed_table()), mixed_table());
        }
    }

    #[test]
    fn test_round_trip_keeps_column_order() {
        let table = Table::from_rows(
            ["z", "a", "m"],
            vec![vec![Value::Int(0), Value::Int(0), Value::Int(0)], vec![Value::Int(1), Value::Int(1), Value::Int(1)]],
        )
        .unwrap();
        let back = round_trip(ParquetSerializer::default(), &table);
        assert_eq!(back.columns(), ["z", "a", "m"]);
        assert_eq!(back, table);
    }

    #[test]
    fn test_round_trip_empty_and_null_columns() {
        let empty = Table::new(["a", "b"]);
        assert_eq!(round_trip(ParquetSerializer::default(), &empty), empty);

        let nulls = Table::from_rows(["n"], vec![vec![Value::Null], vec![Value::Null]]).unwrap();
        assert_eq!(round_trip(ParquetSerializer::default(), &nulls), nulls);
    }

    #[test]
    fn test_round_trip_bytes() {
        let table = Table::from_rows(["raw"], vec![vec![Value::Bytes(vec![0, 159, 255])], vec![Value::Null]]).unwrap();
        assert_eq!(round_trip(ParquetSerializer::default(), &table), table);
    }

    #[test]
    fn test_rejects_nested_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let table = Table::from_rows(
            ["uuid_col"],
            vec![vec![Value::Json(serde_json::json!({"uuid": "a1"}))], vec![Value::Json(serde_json::json!([1, 2]))]],
        )
        .unwrap();

        let err = ParquetSerializer::default().dump(&table, &path).unwrap_err();
        assert!(matches!(err, Error::FormatUnsupported { .. }));
        assert!(err.to_string().contains("msgpack"));
        assert!(err.to_string().contains("uuid_col"));
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_mixed_columns() {
        let table = Table::from_rows(["m"], vec![vec![Value::Int(1)], vec![Value::from("one")]]).unwrap();
        let err = to_record_batch(&table).unwrap_err();
        assert!(err.to_string().contains("mixes int and text"));
    }
}
