//! Storage Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object (or bucket) does not exist.
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Access denied (permissions or credentials).
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Reading or writing a local file failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// Connection, DNS or timeout failure talking to the provider.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Key is empty, contains null bytes or escapes the configured prefix.
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// Anything else the provider complained about.
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// The operation was cancelled before it completed.
    #[display("operation cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NotFound("a.tar.gz".into()), false)]
    #[case(ErrorKind::PermissionDenied("a.tar.gz".into()), false)]
    #[case(ErrorKind::InvalidKey("..".into()), false)]
    #[case(ErrorKind::Cancelled, false)]
    #[case(ErrorKind::Network("connection reset".into()), true)]
    #[case(ErrorKind::BackendError("SlowDown".into()), true)]
    #[case(ErrorKind::Io(PathBuf::from("a.tar.gz")), true)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }
}
