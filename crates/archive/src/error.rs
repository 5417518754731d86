//! Archive Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for packaging and fingerprinting.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Source directory does not exist or cannot be stat'ed.
    #[display("source not found: {}", _0.display())]
    SourceNotFound(#[error(not(source))] PathBuf),
    /// Source exists but is not a directory.
    #[display("source is not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Source has no usable base name (e.g. the filesystem root).
    #[display("cannot derive an archive name from: {}", _0.display())]
    InvalidSource(#[error(not(source))] PathBuf),
    /// Reading or writing a file failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// The compression layer failed to initialise or finish.
    #[display("compression error")]
    Compression,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Compression)
    }
}
