//! Command-line Error Types

use derive_more::{Display, Error};
use exn::Frame;

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// What failed, at the level a user cares about. The message of the
/// underlying error is repeated so a single line is a useful diagnostic.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error: {_0}")]
    Config(#[error(not(source))] String),
    #[display("storage error: {_0}")]
    Storage(#[error(not(source))] String),
    #[display("{_0}")]
    Sync(#[error(not(source))] String),
    #[display("cancelled")]
    Cancelled,
}

impl ErrorKind {
    #[track_caller]
    pub fn config(err: parcel_config::error::Error) -> Error {
        let message = (*err).to_string();
        err.raise(Self::Config(message))
    }

    #[track_caller]
    pub fn storage(err: parcel_storage::error::Error) -> Error {
        let kind = match &*err {
            parcel_storage::error::ErrorKind::Cancelled => Self::Cancelled,
            other => Self::Storage(other.to_string()),
        };
        err.raise(kind)
    }

    #[track_caller]
    pub fn sync(err: parcel_sync::error::Error) -> Error {
        let kind = match &*err {
            parcel_sync::error::ErrorKind::Cancelled => Self::Cancelled,
            other => Self::Sync(other.to_string()),
        };
        err.raise(kind)
    }
}

/// One-line diagnostic: the top frame followed by each underlying cause.
///
/// Follows the first child at every level. A message already contained in
/// the one before it is left out, since the kinds at each crate boundary
/// repeat their child's message.
pub fn summary(err: &Error) -> String {
    let mut messages: Vec<String> = Vec::new();
    let mut frame: Option<&Frame> = Some(err.frame());
    while let Some(current) = frame {
        let message = current.error().to_string();
        let repeated = messages.last().is_some_and(|last| last.contains(&message));
        if !repeated && !message.is_empty() {
            messages.push(message);
        }
        frame = current.children().first();
    }
    messages.join(": ")
}
