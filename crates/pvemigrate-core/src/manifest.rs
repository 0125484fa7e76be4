//! OVA manifest (`.mf`) verification.
//!
//! Manifest lines have the form `SHA256(web01-disk1.vmdk)= <hex>`. Only
//! SHA-256 entries are verified; SHA-1 entries are listed but skipped.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Digest algorithm named in a manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha1,
    Sha256,
}

/// One line of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub algorithm: Algorithm,
    pub file_name: String,
    pub digest: String,
}

/// Parse manifest content.
pub fn parse_manifest(content: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let malformed = || Error::manifest(format!("malformed line '{}'", line));
        let open = line.find('(').ok_or_else(malformed)?;
        let close = line.rfind(")=").ok_or_else(malformed)?;
        if close < open {
            return Err(malformed());
        }

        let algorithm = match line[..open].trim().to_ascii_uppercase().as_str() {
            "SHA1" => Algorithm::Sha1,
            "SHA256" => Algorithm::Sha256,
            other => return Err(Error::manifest(format!("unsupported algorithm '{}'", other))),
        };

        entries.push(ManifestEntry {
            algorithm,
            file_name: line[open + 1..close].to_string(),
            digest: line[close + 2..].trim().to_ascii_lowercase(),
        });
    }

    Ok(entries)
}

/// Compute the SHA256 hash of data.
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA256 hash of a file, streaming its contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(e, path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| Error::io(e, path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify every SHA-256 entry of the manifest at `manifest` against files
/// in the same directory.
///
/// Returns the number of files verified.
pub fn verify(manifest: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(manifest).map_err(|e| Error::io(e, manifest))?;
    let dir = manifest.parent().unwrap_or_else(|| Path::new("."));
    let mut verified = 0;

    for entry in parse_manifest(&content)? {
        if entry.algorithm != Algorithm::Sha256 {
            tracing::debug!(file = %entry.file_name, "skipping non-SHA256 manifest entry");
            continue;
        }
        if entry.file_name.contains('/') || entry.file_name.contains("..") {
            return Err(Error::manifest(format!("unsafe file name '{}'", entry.file_name)));
        }

        let actual = sha256_file(&dir.join(&entry.file_name))?;
        if actual != entry.digest {
            return Err(Error::manifest(format!(
                "checksum mismatch for {}: expected {}, got {}",
                entry.file_name, entry.digest, actual
            )));
        }
        tracing::debug!(file = %entry.file_name, "checksum ok");
        verified += 1;
    }

    Ok(verified)
}
