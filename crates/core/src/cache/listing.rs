//! Enumeration of the entries held by a store.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use super::metadata::Metadata;
use super::store::{METADATA_EXTENSION, Store};
use crate::{Error, Table, Value};

/// Columns every listing starts with, in order.
pub const LIST_COLUMNS: [&str; 4] = ["query", "cache_file", "executed_at", "duration"];

impl Store {
    /// Metadata of every entry, ordered by metadata file name.
    pub fn entries(&self) -> Result<Vec<Metadata>, Error> {
        self.metadata_files()?
            .into_iter()
            .map(|path| {
                let text = fs::read_to_string(&path).map_err(|e| Error::io(e, &path))?;
                Ok(serde_json::from_str(&text)?)
            })
            .collect()
    }

    /// One row per entry.
    ///
    /// The table starts with [`LIST_COLUMNS`], followed by every additional
    /// metadata key seen in the store (sorted). Entries without a given key
    /// hold `Null` there. An empty store yields zero rows and only the
    /// leading columns.
    pub fn list(&self) -> Result<Table, Error> {
        let entries = self.entries()?;
        let extra_keys: BTreeSet<&str> =
            entries.iter().flat_map(|m| m.extra.keys().map(String::as_str)).collect();

        let mut table = Table::new(LIST_COLUMNS.into_iter().chain(extra_keys.iter().copied()));
        for metadata in &entries {
            let mut row = vec![
                Value::from(metadata.query.as_str()),
                Value::from(metadata.cache_file.as_str()),
                Value::from(metadata.executed_at.as_str()),
                Value::Float(metadata.duration),
            ];
            row.extend(extra_keys.iter().map(|key| metadata.get_extra(key).cloned().map_or(Value::Null, Value::from)));
            table.push_row(row)?;
        }
        tracing::debug!(dir = %self.dir().display(), entries = table.num_rows(), "listed cache entries");
        Ok(table)
    }

    fn metadata_files(&self) -> Result<Vec<PathBuf>, Error> {
        let dir = self.dir();
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| Error::io(e, dir))? {
            let path = entry.map_err(|e| Error::io(e, dir))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == METADATA_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
