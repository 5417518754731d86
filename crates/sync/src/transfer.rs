//! Moving archives in and out of the bucket.

use crate::error::{ErrorKind, Result};
use crate::remote::{DIGEST_METADATA_KEY, probe};
use exn::ResultExt;
use parcel_archive::{LocalArchive, digest_file};
use parcel_storage::{PutRequest, StorageBackend, validate_key};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Upload an archive, tagging it with its digest.
///
/// The digest is stored as metadata for future sync decisions and sent as
/// `Content-MD5` so the provider verifies the body it received. No retries
/// here; the backend's own retry policy is all there is.
#[tracing::instrument(skip_all, fields(key = %archive.name, bucket = backend.bucket()))]
pub async fn upload(backend: &dyn StorageBackend, archive: &LocalArchive, cancel: &CancellationToken) -> Result<()> {
    let request = PutRequest::new(&archive.name, &archive.path)
        .with_metadata(DIGEST_METADATA_KEY, archive.digest.as_str())
        .with_content_md5(archive.digest.as_str());
    tracing::info!(fingerprint = %archive.short_fingerprint(), "Uploading archive");
    backend
        .put(request, cancel)
        .await
        .map_err(|err| ErrorKind::storage(err, "upload", &archive.name, backend.bucket()))?;
    tracing::info!("Uploaded archive");
    Ok(())
}

/// Download `key` into `output_dir`, replacing whatever is already there.
///
/// The body is streamed into a temporary file next to the destination and
/// renamed into place once complete; a failed or cancelled download leaves
/// the destination untouched. If the object carries a stored digest, the
/// downloaded bytes are checked against it and a mismatch is logged.
#[tracing::instrument(skip(backend, output_dir, cancel), fields(bucket = backend.bucket()))]
pub async fn download(
    backend: &dyn StorageBackend,
    key: &str,
    output_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Downloaded> {
    let bucket = backend.bucket();
    let remote = probe(backend, key).await?;
    if !remote.exists {
        exn::bail!(ErrorKind::NotFound(format!("{bucket}/{key}")));
    }

    let relative = validate_key(key).map_err(|err| ErrorKind::storage(err, "download", key, bucket))?;
    let destination = output_dir.join(&relative);
    let parent = destination.parent().unwrap_or(output_dir).to_path_buf();
    tokio::fs::create_dir_all(&parent).await.or_raise(|| ErrorKind::Io(parent.clone()))?;
    let temp = tempfile::Builder::new()
        .prefix(".parcel-")
        .suffix(".partial")
        .tempfile_in(&parent)
        .or_raise(|| ErrorKind::Io(parent.clone()))?;
    let file = temp.as_file().try_clone().or_raise(|| ErrorKind::Io(temp.path().to_path_buf()))?;
    let mut file = tokio::fs::File::from_std(file);

    let mut reader = backend
        .reader(key)
        .await
        .map_err(|err| ErrorKind::storage(err, "download", key, bucket))?;
    let bytes = tokio::select! {
        biased;
        () = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
        copied = tokio::io::copy(&mut reader, &mut file) => {
            copied.or_raise(|| ErrorKind::Transport {
                operation: "download",
                key: key.to_string(),
                bucket: bucket.to_string(),
            })?
        },
    };
    file.flush().await.or_raise(|| ErrorKind::Io(temp.path().to_path_buf()))?;
    file.sync_all().await.or_raise(|| ErrorKind::Io(temp.path().to_path_buf()))?;
    drop(file);

    if let Some(expected) = &remote.stored_digest {
        let temp_path = temp.path().to_path_buf();
        let actual = tokio::task::spawn_blocking(move || digest_file(temp_path))
            .await
            .or_raise(|| ErrorKind::Io(destination.clone()))?
            .map_err(|err| ErrorKind::archive(err, &destination))?;
        match &actual == expected {
            true => tracing::debug!(digest = %actual, "Downloaded archive matches stored digest"),
            false => tracing::warn!(%expected, %actual, "Downloaded archive does not match its stored digest"),
        }
    }

    temp.persist(&destination).map_err(|err| err.error).or_raise(|| ErrorKind::Io(destination.clone()))?;
    tracing::info!(path = %destination.display(), bytes, "Downloaded archive");
    Ok(Downloaded { path: destination, bytes })
}

/// Remove a local archive.
///
/// Only ever called after the bucket is known to hold the same bytes, so a
/// failure here is reported to the caller but undoes nothing.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub async fn clean(path: &Path) -> Result<()> {
    tokio::fs::remove_file(path).await.or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
    tracing::info!("Removed local archive");
    Ok(())
}
