//! Sync Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Errors from the archive and storage crates are kept as
//! children of the error raised here.

use derive_more::{Display, Error};
use parcel_archive::error::{Error as ArchiveError, ErrorKind as ArchiveErrorKind};
use parcel_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use std::path::{Path, PathBuf};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The source directory or the remote object does not exist.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The source exists but cannot be packaged (not a directory, no name).
    #[display("cannot package: {}", _0.display())]
    InvalidSource(#[error(not(source))] PathBuf),
    /// Local filesystem failure while packaging, hashing, writing a download
    /// or removing an archive.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// The object store rejected or failed a request.
    #[display("{operation} failed for {key} in bucket {bucket}")]
    Transport {
        operation: &'static str,
        key: String,
        bucket: String,
    },
    /// The operation was cancelled before it completed.
    #[display("operation cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Transport { .. })
    }

    /// Convert a packaging error, preserving the archive crate's frame as a
    /// child.
    #[track_caller]
    pub fn archive(err: ArchiveError, source: &Path) -> Error {
        let kind = match &*err {
            ArchiveErrorKind::SourceNotFound(path) => Self::NotFound(path.display().to_string()),
            ArchiveErrorKind::NotADirectory(path) | ArchiveErrorKind::InvalidSource(path) => {
                Self::InvalidSource(path.clone())
            },
            ArchiveErrorKind::Io(path) => Self::Io(path.clone()),
            ArchiveErrorKind::Compression => Self::Io(source.to_path_buf()),
        };
        err.raise(kind)
    }

    /// Convert a storage error into a transport error for `operation`,
    /// preserving the storage crate's frame as a child.
    #[track_caller]
    pub fn storage(err: StorageError, operation: &'static str, key: &str, bucket: &str) -> Error {
        let kind = match &*err {
            StorageErrorKind::Cancelled => Self::Cancelled,
            _ => Self::Transport {
                operation,
                key: key.to_string(),
                bucket: bucket.to_string(),
            },
        };
        err.raise(kind)
    }
}
