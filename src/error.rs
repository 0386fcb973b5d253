//! Error types for bucket-zip
//!
//! Three layers, each wrapping the one below:
//!
//! - [`ZipError`]: the archive encoder/decoder
//! - [`StoreError`]: the object store collaborator
//! - [`PackError`]: the folder packing pipeline, one variant per failing step

use std::io;
use thiserror::Error;

/// Result type for archive encoder/decoder operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Result type for object store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error types that can occur during ZIP operations
#[derive(Debug, Error)]
pub enum ZipError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Invalid ZIP format or structure
    #[error("Invalid ZIP format: {0}")]
    InvalidFormat(String),
    /// Entry not found in ZIP archive
    #[error("Entry not found: {0}")]
    EntryNotFound(String),
    /// Unsupported compression method
    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),
    /// Entry name cannot be encoded in a local file header
    #[error("Invalid entry name {name:?}: {reason}")]
    InvalidEntryName { name: String, reason: &'static str },
    /// Data written before any entry was started
    #[error("No entry started")]
    NoEntryStarted,
    /// Decompressed data does not match the stored CRC-32
    #[error("CRC-32 mismatch for {name}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// Errors reported by an [`ObjectStore`](crate::store::ObjectStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Failure reported by the storage service or its SDK
    #[error("storage backend error: {0}")]
    Backend(String),
    /// The store handle could not be built (credentials, runtime, bucket)
    #[error("storage configuration error: {0}")]
    Config(String),
}

/// Failure of a [`FolderZipper::pack`](crate::FolderZipper::pack) call.
///
/// Every variant aborts the whole operation. Nothing is retried and there is
/// no partial success: when `pack` returns an error the destination object is
/// either absent, left as it was, or truncated, depending on how far the
/// backend got before the sink was dropped.
#[derive(Debug, Error)]
pub enum PackError {
    /// The folder has no objects directly under it. The destination is never opened.
    #[error("no objects found in folder `{prefix}`")]
    EmptyFolder { prefix: String },

    #[error("failed to list folder `{prefix}`")]
    Listing {
        prefix: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to open destination `{name}` for writing")]
    WriteOpen {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to open `{name}` for reading")]
    ReadOpen {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create archive entry `{entry}` for `{name}`")]
    EntryCreate {
        name: String,
        entry: String,
        #[source]
        source: ZipError,
    },

    #[error("failed to copy `{name}` into the archive")]
    Copy {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The central directory could not be written. The destination must not be trusted.
    #[error("failed to finalize archive `{name}`; the destination must not be trusted")]
    ArchiveClose {
        name: String,
        #[source]
        source: ZipError,
    },

    /// The archive was complete but the store refused to commit it.
    #[error("failed to commit destination `{name}`")]
    Commit {
        name: String,
        #[source]
        source: StoreError,
    },
}

impl PackError {
    /// Name of the object the failure is about, if it concerns a single object.
    ///
    /// For read and copy failures this is the source object; for write, close
    /// and commit failures it is the destination.
    pub fn object(&self) -> Option<&str> {
        match self {
            PackError::EmptyFolder { .. } | PackError::Listing { .. } => None,
            PackError::WriteOpen { name, .. }
            | PackError::ReadOpen { name, .. }
            | PackError::EntryCreate { name, .. }
            | PackError::Copy { name, .. }
            | PackError::ArchiveClose { name, .. }
            | PackError::Commit { name, .. } => Some(name),
        }
    }
}
