//! The working directory holding transient migration artifacts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default location for the exported archive and its extracted files.
pub const DEFAULT_WORK_DIR: &str = "/var/vm-migration";

/// Create `dir` and its parents if needed.
pub fn ensure(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(e, dir))
}

/// Whether `dir` is the directory reserved for migrations.
///
/// Only that directory is emptied wholesale; any other directory the
/// operator points at may hold unrelated files.
pub fn is_dedicated(dir: &Path) -> bool {
    dir == Path::new(DEFAULT_WORK_DIR)
}

/// Remove everything inside `dir`, keeping the directory itself.
///
/// A missing directory counts as clean. Returns the number of entries removed.
pub fn clean_all(dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::io(e, dir)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(e, dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| Error::io(e, &path))?;
        let result = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| Error::io(e, &path))?;
        removed += 1;
    }

    tracing::info!(dir = %dir.display(), removed, "Emptied working directory");
    Ok(removed)
}

/// Clean up after a migration.
///
/// The dedicated directory is emptied. Any other directory only loses
/// `artifacts`.
pub fn cleanup(dir: &Path, artifacts: &[PathBuf]) -> Result<usize> {
    if is_dedicated(dir) {
        clean_all(dir)
    } else {
        clean(dir, artifacts)
    }
}

/// Remove the files this run created in `dir`.
///
/// Only `artifacts` below `dir` are touched, and anything else in the
/// directory is left alone. Subdirectories emptied by the removal are
/// removed too. Files already gone count as clean. Returns the number of
/// files removed.
pub fn clean(dir: &Path, artifacts: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for path in artifacts {
        if !path.starts_with(dir) || path == dir {
            tracing::warn!(path = %path.display(), "not removing file outside working directory");
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(e, path)),
        }

        let mut parent = path.parent();
        while let Some(sub) = parent.filter(|p| *p != dir && p.starts_with(dir)) {
            // Fails while the directory still holds something, which ends the walk.
            if fs::remove_dir(sub).is_err() {
                break;
            }
            parent = sub.parent();
        }
    }

    tracing::info!(dir = %dir.display(), removed, "Cleaned working directory");
    Ok(removed)
}
