//! Locating the files an unpacked OVA leaves in the working directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Regular files directly in `dir` whose extension matches `ext`
/// (case-insensitive), sorted by name.
pub fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(e, dir))? {
        let entry = entry.map_err(|e| Error::io(e, dir))?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// The OVF descriptor of the unpacked export.
pub fn find_descriptor(dir: &Path) -> Result<PathBuf> {
    let mut descriptors = files_with_extension(dir, "ovf")?;
    match descriptors.len() {
        0 => Err(Error::ova(format!("no OVF descriptor in {}", dir.display()))),
        1 => Ok(descriptors.remove(0)),
        n => Err(Error::ova(format!("{} OVF descriptors in {}", n, dir.display()))),
    }
}

/// The manifest of the unpacked export, if one was included.
pub fn find_manifest(dir: &Path) -> Result<Option<PathBuf>> {
    Ok(files_with_extension(dir, "mf")?.into_iter().next())
}

/// The single disk image of the unpacked export.
///
/// Anything other than exactly one `.vmdk` is an error.
pub fn find_disk(dir: &Path) -> Result<PathBuf> {
    let mut disks = files_with_extension(dir, "vmdk")?;
    if disks.len() != 1 {
        return Err(Error::DiskCount { found: disks.len() });
    }
    Ok(disks.remove(0))
}

/// Destination path of the raw conversion of `disk`.
pub fn raw_path(disk: &Path) -> PathBuf {
    disk.with_extension("raw")
}
