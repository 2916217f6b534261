//! File-backed cache store.
//!
//! Each cached query owns two sibling files under `<root>/<format>/`:
//! the serialized table (`<key>.<ext>`) and its metadata (`<key>.json`).
//! The payload is always written first and both files are replaced
//! atomically, so an entry only counts as present once both exist.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::hash::{CacheKey, KeyDeriver};
use super::metadata::Metadata;
use super::normalize::Normalizer;
use crate::atomic::write_atomic;
use crate::config::StoreConfig;
use crate::serializer::{Serializer, TableCodec};
use crate::{Error, Table};

pub(crate) const METADATA_EXTENSION: &str = "json";

/// Disk store for query results and their metadata.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    dir: PathBuf,
    serializer: Serializer,
    keys: KeyDeriver,
}

impl Store {
    /// Open (and create if needed) the store described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, Error> {
        let normalizer = Arc::new(Normalizer::new(config.max_normalize_length, config.memo_capacity));
        let serializer = Serializer::new(config.backend, config.parquet_codec, config.compression_level);
        Self::with_parts(&config.root, serializer, KeyDeriver::new(normalizer, config.normalize))
    }

    /// Open a store at `root` with default settings.
    pub fn open_default(root: impl Into<PathBuf>) -> Result<Self, Error> {
        Self::open(&StoreConfig::new(root))
    }

    /// Open a store from already built components.
    pub fn with_parts(root: &Path, serializer: Serializer, keys: KeyDeriver) -> Result<Self, Error> {
        let dir = root.join(serializer.format_tag());
        fs::create_dir_all(&dir).map_err(|e| Error::io(e, &dir))?;
        tracing::debug!(dir = %dir.display(), backend = %serializer.backend(), "opened cache store");
        Ok(Self { root: root.to_path_buf(), dir, serializer, keys })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding this store's artifacts (`<root>/<format>`).
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    pub fn normalizes(&self) -> bool {
        self.keys.normalizes()
    }

    pub fn key(&self, query: &str) -> CacheKey {
        self.keys.derive(query)
    }

    /// Path of the payload artifact for `query`. Does not touch the disk.
    pub fn cache_filepath(&self, query: &str) -> PathBuf {
        self.artifact_path(&self.key(query), self.serializer.extension())
    }

    /// Path of the metadata artifact for `query`. Does not touch the disk.
    pub fn metadata_filepath(&self, query: &str) -> PathBuf {
        self.artifact_path(&self.key(query), METADATA_EXTENSION)
    }

    fn artifact_path(&self, key: &CacheKey, extension: &str) -> PathBuf {
        self.dir.join(format!("{key}.{extension}"))
    }

    /// True if both the payload and the metadata of `query` are on disk.
    pub fn exists(&self, query: &str) -> bool {
        let key = self.key(query);
        self.artifact_path(&key, METADATA_EXTENSION).is_file()
            && self.artifact_path(&key, self.serializer.extension()).is_file()
    }

    pub fn load_metadata(&self, query: &str) -> Result<Metadata, Error> {
        let path = self.metadata_filepath(query);
        require(&path, "Metadata")?;
        let text = fs::read_to_string(&path).map_err(|e| Error::io(e, &path))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn load_results(&self, query: &str) -> Result<Table, Error> {
        let path = self.cache_filepath(query);
        require(&path, "Cached results")?;
        self.serializer.load(&path)
    }

    /// Load both the results and the metadata of `query`.
    pub fn load(&self, query: &str) -> Result<(Table, Metadata), Error> {
        let results = self.load_results(query)?;
        let metadata = self.load_metadata(query)?;
        Ok((results, metadata))
    }

    /// Serialize `results` as the payload artifact of `query`.
    ///
    /// # Errors
    ///
    /// `Error::FormatUnsupported` if the active backend cannot encode the table.
    pub fn dump_results(&self, query: &str, results: &Table) -> Result<(), Error> {
        let path = self.cache_filepath(query);
        self.serializer.dump(results, &path)?;
        tracing::debug!(path = %path.display(), rows = results.num_rows(), "wrote cached results");
        Ok(())
    }

    /// Write the metadata artifact of `query`.
    ///
    /// `cache_file` and `query` are overwritten with the payload file name and
    /// the canonical query text. Returns the metadata as written.
    pub fn dump_metadata(&self, query: &str, mut metadata: Metadata) -> Result<Metadata, Error> {
        let key = self.key(query);
        metadata.cache_file = format!("{key}.{}", self.serializer.extension());
        metadata.query = self.keys.canonical_query(query).into_owned();

        let path = self.artifact_path(&key, METADATA_EXTENSION);
        write_atomic(&path, |file| Ok(serde_json::to_writer_pretty(file, &metadata)?))?;
        tracing::debug!(path = %path.display(), "wrote cache metadata");
        Ok(metadata)
    }

    /// Store `results` and `metadata` for `query`.
    ///
    /// Metadata is only written once the results are on disk.
    pub fn dump(&self, query: &str, results: &Table, metadata: Metadata) -> Result<Metadata, Error> {
        self.dump_results(query, results)?;
        self.dump_metadata(query, metadata)
    }
}

pub(crate) fn require(path: &Path, what: &'static str) -> Result<(), Error> {
    if path.is_file() { Ok(()) } else { Err(Error::NotFound { what, path: path.to_path_buf() }) }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::normalize::normalize_query;
    use crate::serializer::Backend;
    use crate::Value;
    use std::time::Duration;

    pub(crate) const QUERY: &str = "select top 3 * from Receipts";

    pub(crate) fn results() -> Table {
        Table::from_rows(
            ["a", "b", "c"],
            vec![vec![Value::Int(0), Value::Int(0), Value::Int(0)], vec![Value::Int(1), Value::Int(1), Value::Int(1)]],
        )
        .unwrap()
    }

    pub(crate) fn metadata() -> Metadata {
        let mut metadata = Metadata::now(Duration::from_secs(600));
        metadata.query = "SELECT top 3 *\nFROM Receipts".into();
        metadata.cache_file = "cache_file.parquet".into();
        metadata
    }

    pub(crate) fn store(root: &Path) -> Store {
        Store::open(&StoreConfig { normalize: true, ..StoreConfig::new(root) }).unwrap()
    }

    #[test]
    fn test_open_creates_format_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_default(dir.path()).unwrap();
        assert!(store.dir().is_dir());
        assert_eq!(store.dir(), dir.path().join("parquet"));
        assert_eq!(store.serializer().backend(), Backend::Parquet);

        let msgpack = Store::open(&StoreConfig { backend: Backend::MsgPack, ..StoreConfig::new(dir.path()) }).unwrap();
        assert_eq!(msgpack.dir(), dir.path().join("msgpack"));
    }

    #[test]
    fn test_filepaths() {
        let dir = tempfile::tempdir().unwrap();
        for backend in [Backend::Parquet, Backend::MsgPack] {
            let store = Store::open(&StoreConfig { backend, ..StoreConfig::new(dir.path()) }).unwrap();
            let key = store.key(QUERY);
            let tag = backend.as_str();
            assert_eq!(store.metadata_filepath(QUERY), dir.path().join(tag).join(format!("{key}.json")));
            assert_eq!(store.cache_filepath(QUERY), dir.path().join(tag).join(format!("{key}.{tag}")));
            assert!(!store.cache_filepath(QUERY).exists());
        }
    }

    #[test]
    fn test_dump_load_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let written = store.dump_metadata(QUERY, metadata()).unwrap();
        assert!(store.metadata_filepath(QUERY).exists());

        let loaded = store.load_metadata(QUERY).unwrap();
        assert_eq!(loaded, written);
        assert_ne!(loaded.query, QUERY);
        assert_eq!(loaded.query, normalize_query(QUERY));
        assert_eq!(loaded.cache_file, store.cache_filepath(QUERY).file_name().unwrap().to_str().unwrap());

        let err = store.load_metadata("select * from dummy").unwrap_err();
        assert!(err.to_string().contains("Metadata not found for the given query"));
    }

    #[test]
    fn test_dump_load_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.dump_results(QUERY, &results()).unwrap();
        assert!(store.cache_filepath(QUERY).exists());
        assert_eq!(store.load_results(QUERY).unwrap(), results());

        let err = store.load_results("select * from dummy").unwrap_err();
        assert!(err.to_string().contains("Cached results not found for the given query"));
    }

    #[test]
    fn test_dump_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let metadata = metadata().with_extra("db_name", "dbtest");
        let written = store.dump(QUERY, &results(), metadata.clone()).unwrap();

        let (loaded_results, loaded_metadata) = store.load(QUERY).unwrap();
        assert_eq!(loaded_results, results());
        assert_eq!(loaded_metadata, written);
        assert_eq!(loaded_metadata.extra, metadata.extra);
        assert_eq!(loaded_metadata.executed_at, metadata.executed_at);

        assert!(store.load("select * from dummy").unwrap_err().is_not_found());
    }

    #[test]
    fn test_exists_requires_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(!store.exists(QUERY));

        store.dump_results(QUERY, &results()).unwrap();
        assert!(!store.exists(QUERY));

        store.dump_metadata(QUERY, metadata()).unwrap();
        assert!(store.exists(QUERY));

        fs::remove_file(store.cache_filepath(QUERY)).unwrap();
        assert!(!store.exists(QUERY));
    }

    #[test]
    fn test_cache_independent_from_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let query1 = "select top 3 * from receipts";
        let query2 = "SELECT top 3 * FROM receipts";

        for query in [query1, query2] {
            assert!(!store.exists(query));
        }
        store.dump(query1, &results(), metadata()).unwrap();
        for query in [query1, query2] {
            assert!(store.metadata_filepath(query).exists());
            assert!(store.exists(query));
        }
    }

    #[test]
    fn test_without_normalization_keys_differ() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&StoreConfig { normalize: false, ..StoreConfig::new(dir.path()) }).unwrap();
        store.dump("select 1", &results(), metadata()).unwrap();
        assert!(store.exists("select 1"));
        assert!(!store.exists("SELECT 1"));
        assert_eq!(store.load_metadata("select 1").unwrap().query, "select 1");
    }

    #[test]
    fn test_unsupported_results_leave_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let exotic =
            Table::from_rows(["uuid_col"], vec![vec![Value::Json(serde_json::json!({"uuid": "9b2c"}))]]).unwrap();

        let err = store.dump(QUERY, &exotic, metadata()).unwrap_err();
        assert!(matches!(err, Error::FormatUnsupported { .. }));
        assert!(err.to_string().contains("backend = \"msgpack\""));
        assert!(!store.metadata_filepath(QUERY).exists());
        assert!(!store.cache_filepath(QUERY).exists());
        assert!(!store.exists(QUERY));

        let fallback = Store::open(&StoreConfig { backend: Backend::MsgPack, ..StoreConfig::new(dir.path()) }).unwrap();
        fallback.dump(QUERY, &exotic, metadata()).unwrap();
        assert_eq!(fallback.load_results(QUERY).unwrap(), exotic);
    }

    #[test]
    fn test_forced_refresh_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.dump(QUERY, &results(), metadata()).unwrap();

        let refreshed = Table::from_rows(["a"], vec![vec![Value::Int(9)]]).unwrap();
        store.dump(QUERY, &refreshed, metadata().with_extra("refresh", true)).unwrap();
        let (loaded, meta) = store.load(QUERY).unwrap();
        assert_eq!(loaded, refreshed);
        assert_eq!(meta.get_extra("refresh"), Some(&serde_json::json!(true)));
    }
}
