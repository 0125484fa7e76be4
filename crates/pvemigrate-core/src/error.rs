//! Error types for the pvemigrate core library.

use std::path::PathBuf;

/// The main error type for migration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error with optional path context.
    #[error("I/O error{}: {source}", path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// One or more required command-line tools are not installed.
    #[error("missing required commands: {}", names.join(", "))]
    MissingTools { names: Vec<String> },

    /// An external command could not be started or exited unsuccessfully.
    #[error("{program} failed: {message}")]
    Command { program: String, message: String },

    /// Interactive input could not be obtained.
    #[error("prompt error: {message}")]
    Prompt { message: String },

    /// The operator refused to overwrite an existing export.
    #[error("export aborted: existing OVA was not overwritten")]
    ExportDeclined,

    /// The unpacked archive did not contain exactly one disk image.
    #[error("expected exactly one disk image, found {found}")]
    DiskCount { found: usize },

    /// Error reading an OVA archive.
    #[error("OVA error: {message}")]
    Ova { message: String },

    /// Error reading an OVF descriptor.
    #[error("OVF error: {message}")]
    Ovf { message: String },

    /// Manifest checksum mismatch or malformed manifest.
    #[error("manifest error: {message}")]
    Manifest { message: String },

    /// Invalid configuration value.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// A specialized Result type for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an I/O error with path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create an I/O error without path context.
    pub fn io_simple(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }

    /// Create a command failure error.
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a prompt error.
    pub fn prompt(message: impl Into<String>) -> Self {
        Self::Prompt {
            message: message.into(),
        }
    }

    /// Create an OVA error.
    pub fn ova(message: impl Into<String>) -> Self {
        Self::Ova {
            message: message.into(),
        }
    }

    /// Create an OVF error.
    pub fn ovf(message: impl Into<String>) -> Self {
        Self::Ovf {
            message: message.into(),
        }
    }

    /// Create a manifest error.
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io_simple(source)
    }
}
