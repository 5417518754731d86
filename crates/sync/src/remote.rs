//! Remote state.

use crate::error::{ErrorKind, Result};
use parcel_archive::Digest;
use parcel_storage::{Probe, StorageBackend};

/// Metadata key the archive digest is stored under.
///
/// Some providers normalise the casing of metadata keys on the way back
/// (`Md5chksum`), so it is always looked up case-insensitively.
pub const DIGEST_METADATA_KEY: &str = "md5chksum";

/// What the bucket knows about an archive key, from a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub bucket: String,
    pub exists: bool,
    /// Digest recorded at upload time. `None` when the object is missing or
    /// was uploaded without one; an empty value is kept as an (unmatchable)
    /// empty digest.
    pub stored_digest: Option<Digest>,
    pub size: Option<u64>,
}

impl RemoteObject {
    pub fn missing(key: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            bucket: bucket.into(),
            exists: false,
            stored_digest: None,
            size: None,
        }
    }
}

/// Probe `key` without downloading its body.
///
/// A missing object is a normal answer. Any failure to ask (credentials,
/// network, bucket) is a [`Transport`](ErrorKind::Transport) error.
#[tracing::instrument(skip(backend), fields(bucket = backend.bucket()))]
pub async fn probe(backend: &dyn StorageBackend, key: &str) -> Result<RemoteObject> {
    let bucket = backend.bucket();
    let probe = backend
        .probe(key)
        .await
        .map_err(|err| ErrorKind::storage(err, "probe", key, bucket))?;
    let remote = match probe {
        Probe::NotFound => RemoteObject::missing(key, bucket),
        Probe::Found(head) => RemoteObject {
            key: key.to_string(),
            bucket: bucket.to_string(),
            exists: true,
            stored_digest: head.metadata_value(DIGEST_METADATA_KEY).map(Digest::from),
            size: Some(head.size),
        },
    };
    tracing::debug!(exists = remote.exists, stored_digest = ?remote.stored_digest, "Probed remote archive");
    Ok(remote)
}
