//! OVA archive extraction.
//!
//! An OVA is a TAR archive holding the OVF descriptor, an optional manifest
//! and the disk images. Files are streamed to disk as they are read so
//! multi-gigabyte disks never sit in memory.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use tar::Archive;

use crate::error::{Error, Result};

const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Receives the running total of bytes written while unpacking.
pub type UnpackProgress<'a> = &'a mut dyn FnMut(u64);

/// Map an archive member name to a path below `dest`.
///
/// Absolute names and names that climb out with `..` are rejected.
fn safe_member_path(dest: &Path, name: &Path) -> Result<PathBuf> {
    let mut path = dest.to_path_buf();
    let mut depth = 0;
    for component in name.components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            _ => {
                return Err(Error::ova(format!(
                    "unsafe member path '{}'",
                    name.display()
                )))
            }
        }
    }
    if depth == 0 {
        return Err(Error::ova(format!("empty member path '{}'", name.display())));
    }
    Ok(path)
}

/// Extract every regular file from a TAR stream into `dest`.
///
/// Returns the paths written, in archive order.
pub fn unpack_from<R: Read>(
    reader: R,
    dest: &Path,
    mut progress: Option<UnpackProgress<'_>>,
) -> Result<Vec<PathBuf>> {
    let mut archive = Archive::new(reader);
    let mut written = Vec::new();
    let mut total: u64 = 0;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    let entries = archive
        .entries()
        .map_err(|e| Error::ova(format!("failed to read archive: {}", e)))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ova(format!("failed to read entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry
            .path()
            .map_err(|e| Error::ova(format!("invalid member name: {}", e)))?
            .into_owned();
        let path = safe_member_path(dest, &name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent))?;
        }
        let size = entry.size();
        tracing::debug!(member = %name.display(), size, "extracting");

        let file = File::create(&path).map_err(|e| Error::io(e, &path))?;
        let mut out = BufWriter::new(file);
        let mut copied: u64 = 0;
        loop {
            let n = entry
                .read(&mut buffer)
                .map_err(|e| Error::ova(format!("failed to read '{}': {}", name.display(), e)))?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n]).map_err(|e| Error::io(e, &path))?;
            copied += n as u64;
            total += n as u64;
            if let Some(cb) = progress.as_mut() {
                cb(total);
            }
        }
        out.flush().map_err(|e| Error::io(e, &path))?;
        if copied != size {
            return Err(Error::ova(format!(
                "truncated member '{}' ({} of {} bytes)",
                name.display(),
                copied,
                size
            )));
        }
        written.push(path);
    }

    Ok(written)
}

/// Extract the OVA at `ova` into `dest`.
pub fn unpack(ova: &Path, dest: &Path, progress: Option<UnpackProgress<'_>>) -> Result<Vec<PathBuf>> {
    tracing::info!(ova = %ova.display(), dest = %dest.display(), "Unpacking OVA");
    let file = File::open(ova).map_err(|e| Error::io(e, ova))?;
    unpack_from(BufReader::new(file), dest, progress)
}
