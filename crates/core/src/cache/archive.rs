//! Zip export and import of cache entries.
//!
//! Archives are flat: each entry contributes its payload and metadata file
//! under their plain file names, so an archive written by one store can be
//! imported into any store using the same backend.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::store::{METADATA_EXTENSION, Store, require};
use crate::Error;
use crate::atomic::write_atomic;

/// Extension appended to export paths that have none.
pub const ARCHIVE_EXTENSION: &str = "zip";

fn archive_path(path: &Path) -> PathBuf {
    if path.extension().is_none() { path.with_extension(ARCHIVE_EXTENSION) } else { path.to_path_buf() }
}

fn file_name(path: &Path) -> Result<&str, Error> {
    path.file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| Error::InvalidInput(format!("{} has no usable file name", path.display())))
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

impl Store {
    /// Write a zip archive of cache entries to `path`.
    ///
    /// With `queries`, exactly those entries are exported and each one must
    /// exist. Without, every entry currently listed is exported. A `.zip`
    /// extension is added when `path` has none. Returns the path written.
    pub fn export(&self, path: impl AsRef<Path>, queries: Option<&[&str]>) -> Result<PathBuf, Error> {
        let path = archive_path(path.as_ref());
        let mut files = match queries {
            Some(queries) => queries
                .iter()
                .map(|query| {
                    let payload = self.cache_filepath(query);
                    let metadata = self.metadata_filepath(query);
                    require(&payload, "Cached results")?;
                    require(&metadata, "Metadata")?;
                    Ok((payload, metadata))
                })
                .collect::<Result<Vec<_>, Error>>()?,
            None => self.listed_files()?,
        };
        files.sort();
        files.dedup();

        write_atomic(&path, |out| {
            let mut zip = ZipWriter::new(out);
            for file in files.iter().flat_map(|(payload, metadata)| [payload, metadata]) {
                zip.start_file(file_name(file)?, entry_options())?;
                let mut source = File::open(file).map_err(|e| Error::io(e, file))?;
                io::copy(&mut source, &mut zip).map_err(|e| Error::io(e, file))?;
            }
            zip.finish()?;
            Ok(())
        })?;

        tracing::info!(path = %path.display(), entries = files.len(), "exported cache entries");
        Ok(path)
    }

    /// Payload and metadata paths of every listed entry whose payload exists.
    fn listed_files(&self) -> Result<Vec<(PathBuf, PathBuf)>, Error> {
        let mut files = Vec::new();
        for metadata in self.entries()? {
            let Some(name) = Path::new(&metadata.cache_file).file_name() else {
                tracing::warn!(query = %metadata.query, "metadata without cache_file skipped during export");
                continue;
            };
            let payload = self.dir().join(name);
            if !payload.is_file() {
                tracing::warn!(path = %payload.display(), "cached results missing, entry skipped during export");
                continue;
            }
            let metadata = payload.with_extension(METADATA_EXTENSION);
            files.push((payload, metadata));
        }
        Ok(files)
    }

    /// Extract the archive at `path` into this store's directory.
    ///
    /// Files are written under their base names and replace existing ones.
    /// Entries whose names would escape the directory are skipped. Returns the
    /// number of files written.
    pub fn import_cache(&self, path: impl AsRef<Path>) -> Result<usize, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let mut written = 0;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let Some(name) = entry.enclosed_name().and_then(|p| p.file_name().map(ToOwned::to_owned)) else {
                tracing::warn!(name = entry.name(), "archive entry with an unsafe name skipped");
                continue;
            };
            write_atomic(&self.dir().join(name), |out| {
                io::copy(&mut entry, out)?;
                Ok(())
            })?;
            written += 1;
        }

        tracing::info!(path = %path.display(), files = written, "imported cache archive");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::tests::{metadata, results, store as open_store};
    use crate::config::StoreConfig;
    use crate::serializer::Backend;
    use std::io::Write;

    const QUERIES: [&str; 4] = [
        "select * from table1",
        "select * from table2",
        "select * from table3 where id = 1",
        "select count(*) from table4",
    ];

    fn filled(root: &Path) -> Store {
        let store = open_store(root);
        for query in QUERIES {
            store.dump(query, &results(), metadata()).unwrap();
        }
        store
    }

    #[test]
    fn test_export_import_everything() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let store = filled(source.path());

        let archive = store.export(source.path().join("cache.zip"), None).unwrap();
        assert!(archive.is_file());

        let imported = open_store(target.path());
        assert_eq!(imported.import_cache(&archive).unwrap(), 2 * QUERIES.len());
        for query in QUERIES {
            assert!(imported.exists(query));
            assert_eq!(imported.load_results(query).unwrap(), results());
            assert_eq!(imported.load_metadata(query).unwrap(), store.load_metadata(query).unwrap());
        }
        assert_eq!(imported.list().unwrap(), store.list().unwrap());
    }

    #[test]
    fn test_export_import_subset() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let store = filled(source.path());

        let archive = store.export(source.path().join("subset.zip"), Some(&QUERIES[..2])).unwrap();
        let imported = open_store(target.path());
        assert_eq!(imported.import_cache(&archive).unwrap(), 4);

        for query in &QUERIES[..2] {
            assert!(imported.exists(query));
        }
        for query in &QUERIES[2..] {
            assert!(!imported.exists(query));
        }
        assert_eq!(imported.list().unwrap().num_rows(), 2);
    }

    #[test]
    fn test_export_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = filled(dir.path());
        let archive = store.export(dir.path().join("backup"), None).unwrap();
        assert_eq!(archive, dir.path().join("backup.zip"));
        assert!(archive.is_file());
        assert!(!dir.path().join("backup").exists());
    }

    #[test]
    fn test_export_unknown_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = filled(dir.path());
        let target = dir.path().join("missing.zip");
        let err = store.export(&target, Some(&["select * from nowhere"])).unwrap_err();
        assert!(err.is_not_found());
        assert!(!target.exists());
    }

    #[test]
    fn test_export_duplicate_queries_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = filled(dir.path());
        let archive =
            store.export(dir.path().join("dup.zip"), Some(&[QUERIES[0], QUERIES[0], "SELECT * FROM table1"])).unwrap();
        let zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
    }

    #[test]
    fn test_export_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let archive = store.export(dir.path().join("empty"), None).unwrap();
        let target = tempfile::tempdir().unwrap();
        assert_eq!(open_store(target.path()).import_cache(&archive).unwrap(), 0);
    }

    #[test]
    fn test_import_skips_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evil.zip");
        {
            let mut zip = ZipWriter::new(File::create(&path).unwrap());
            zip.start_file("../escape.json", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"{}").unwrap();
            zip.start_file("nested/ok.json", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"{}").unwrap();
            zip.finish().unwrap();
        }

        let root = tempfile::tempdir().unwrap();
        let store = open_store(root.path());
        assert_eq!(store.import_cache(&path).unwrap(), 1);
        assert!(store.dir().join("ok.json").is_file());
        assert!(!root.path().join("escape.json").exists());
    }

    #[test]
    fn test_import_into_other_backend_is_inert() {
        let source = tempfile::tempdir().unwrap();
        let store = filled(source.path());
        let archive = store.export(source.path().join("cache"), None).unwrap();

        let target = tempfile::tempdir().unwrap();
        let msgpack =
            Store::open(&StoreConfig { backend: Backend::MsgPack, ..StoreConfig::new(target.path()) }).unwrap();
        msgpack.import_cache(&archive).unwrap();
        assert!(!msgpack.exists(QUERIES[0]));
        assert_eq!(msgpack.list().unwrap().num_rows(), QUERIES.len());
        assert!(msgpack.load_results(QUERIES[0]).unwrap_err().is_not_found());
    }
}
