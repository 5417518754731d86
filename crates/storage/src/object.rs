//! Object models.

use std::collections::BTreeMap;
use std::path::Path;
use time::OffsetDateTime;

/// User metadata attached to an object (`x-amz-meta-*` on S3).
///
/// Providers are free to change the casing of keys, so lookups that matter
/// should go through [`metadata_value`].
pub type Metadata = BTreeMap<String, String>;

/// Case-insensitive metadata lookup.
///
/// Returns the first match in key order; a present-but-empty value is
/// returned as `Some("")`.
pub fn metadata_value<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.as_str())
}

/// Object listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Key relative to the backend's prefix.
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}

/// What a metadata-only probe learned about an existing object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub key: String,
    pub size: u64,
    pub modified: Option<OffsetDateTime>,
    pub metadata: Metadata,
}

impl ObjectHead {
    /// Case-insensitive lookup of a single metadata value.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        metadata_value(&self.metadata, key)
    }
}

/// Result of [`StorageBackend::probe`](crate::StorageBackend::probe).
///
/// A missing object is an expected answer rather than an error; only failures
/// to ask the question at all are reported as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Found(ObjectHead),
    NotFound,
}

impl Probe {
    pub fn exists(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn head(&self) -> Option<&ObjectHead> {
        match self {
            Self::Found(head) => Some(head),
            Self::NotFound => None,
        }
    }
}

/// An upload of a local file.
#[derive(Debug, Clone)]
pub struct PutRequest<'a> {
    pub key: &'a str,
    pub source: &'a Path,
    pub metadata: Metadata,
    /// Base64 MD5 of the body. Sent as `Content-MD5` so the provider rejects
    /// a body that was corrupted in transit.
    pub content_md5: Option<String>,
}

impl<'a> PutRequest<'a> {
    pub fn new(key: &'a str, source: &'a Path) -> Self {
        Self {
            key,
            source,
            metadata: Metadata::new(),
            content_md5: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_content_md5(mut self, content_md5: impl Into<String>) -> Self {
        self.content_md5 = Some(content_md5.into());
        self
    }
}
