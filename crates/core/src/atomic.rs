//! Whole-file writes that never leave a partially written target behind.

use std::fs::File;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::Error;

/// Write `path` through a temporary sibling file that is renamed into place.
///
/// If `write` fails the temporary file is removed and `path` is left untouched.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<(), Error>
where
    F: FnOnce(&mut File) -> Result<(), Error>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(e, dir))?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all().map_err(|e| Error::io(e, tmp.path()))?;
    tmp.persist(path)?;
    Ok(())
}
