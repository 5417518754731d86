//! Object key validation.
//!
//! Keys are `/`-separated, like paths. They are normalised the same way so
//! that a key can never climb out of the backend's configured prefix.

use crate::error::{ErrorKind, Result};

/// Validates and normalises an object key.
///
/// Empty segments and `.` are dropped; `..` removes the previous segment and
/// is rejected if there is nothing left to remove. Keys that normalise to
/// nothing, or that contain null bytes, are rejected with
/// [`InvalidKey`](crate::error::ErrorKind::InvalidKey).
///
/// # Examples
///
/// ```
/// use parcel_storage::validate_key;
/// // Valid keys
/// assert!(validate_key("foo.tar.gz").is_ok());
/// assert!(validate_key("backups/foo.tar.gz").is_ok());
/// assert!(validate_key("a/../foo.tar.gz").is_ok()); // (never leaves the prefix)
/// // Invalid keys
/// assert!(validate_key("../foo.tar.gz").is_err());
/// assert!(validate_key("a/../../b").is_err());
/// assert!(validate_key("a\0b").is_err());
/// // Keys get resolved
/// assert_eq!(validate_key("wrong/../still-wrong/.././correct//./foo.tar.gz/").unwrap(), "correct/foo.tar.gz");
/// ```
pub fn validate(key: impl AsRef<str>) -> Result<String> {
    let key = key.as_ref();
    let mut segments = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
            _ if segment.contains('\0') => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
            _ => segments.push(segment),
        }
    }
    match segments.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(segments.join("/")),
    }
}
