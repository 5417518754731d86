use crate::decision::{Decision, decide};
use crate::error::{Error, ErrorKind, Result};
use crate::remote::{RemoteObject, probe};
use crate::transfer::{self, Downloaded};
use exn::ResultExt;
use parcel_archive::{Archiver, LocalArchive};
use parcel_storage::BackendHandle;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Options for [`Syncer::push`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Rebuild the archive even if one already exists.
    pub force: bool,
    /// Remove the local archive once the bucket holds the same bytes.
    pub clean: bool,
}

/// What happened to the local archive after a push.
#[derive(Debug)]
pub enum Cleanup {
    Kept,
    Removed,
    /// Removal failed. The bucket is still up to date.
    Failed(Error),
}

/// Result of comparing a folder against the bucket without transferring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub archive: LocalArchive,
    pub remote: RemoteObject,
    pub decision: Decision,
}

/// Result of a successful [`Syncer::push`].
#[derive(Debug)]
pub struct PushReport {
    pub archive: LocalArchive,
    pub remote: RemoteObject,
    pub decision: Decision,
    pub cleanup: Cleanup,
}

impl PushReport {
    pub fn uploaded(&self) -> bool {
        self.decision.needs_upload()
    }
}

/// Package, fingerprint, probe, decide, transfer.
///
/// Holds no state besides its collaborators; every call starts from the
/// filesystem and a fresh probe.
#[derive(Clone)]
pub struct Syncer {
    backend: BackendHandle,
    archiver: Archiver,
}

impl Syncer {
    pub fn new(backend: BackendHandle, archiver: Archiver) -> Self {
        Self { backend, archiver }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    /// Package (or reuse) and fingerprint on the blocking pool.
    async fn prepare(&self, source: &Path, force: bool) -> Result<LocalArchive> {
        let archiver = self.archiver.clone();
        let owned: PathBuf = source.to_path_buf();
        tokio::task::spawn_blocking(move || LocalArchive::prepare(&archiver, &owned, force))
            .await
            .or_raise(|| ErrorKind::Io(source.to_path_buf()))?
            .map_err(|err| ErrorKind::archive(err, source))
    }

    /// Work out what a push would do, without uploading anything.
    #[tracing::instrument(skip_all, fields(source = %source.display(), force))]
    pub async fn status(&self, source: &Path, force: bool) -> Result<Status> {
        let archive = self.prepare(source, force).await?;
        let remote = probe(self.backend.as_ref(), &archive.name).await?;
        let decision = decide(&archive.digest, &remote);
        tracing::debug!(%decision, fingerprint = %archive.short_fingerprint(), "Decided");
        Ok(Status { archive, remote, decision })
    }

    /// Make the bucket hold the current archive of `source`.
    ///
    /// Uploads only when the bucket's copy is missing, untagged, or tagged
    /// with a different digest. With `clean`, the local archive is removed
    /// afterwards whether or not an upload was needed; a failed removal is
    /// reported in [`PushReport::cleanup`] rather than as an error.
    #[tracing::instrument(skip_all, fields(source = %source.display()))]
    pub async fn push(&self, source: &Path, options: PushOptions, cancel: &CancellationToken) -> Result<PushReport> {
        let Status { archive, remote, decision } = self.status(source, options.force).await?;
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        match decision {
            Decision::Upload(reason) => {
                tracing::info!(key = %archive.name, %reason, "Remote archive is stale");
                transfer::upload(self.backend.as_ref(), &archive, cancel).await?;
            },
            _ => tracing::info!(
                key = %archive.name,
                fingerprint = %archive.short_fingerprint(),
                "Remote archive is up to date; skipping upload"
            ),
        }
        let cleanup = match options.clean {
            false => Cleanup::Kept,
            true => match transfer::clean(&archive.path).await {
                Ok(()) => Cleanup::Removed,
                Err(err) => {
                    tracing::warn!(path = %archive.path.display(), error = %err, "Could not remove local archive");
                    Cleanup::Failed(err)
                },
            },
        };
        Ok(PushReport { archive, remote, decision, cleanup })
    }

    /// Download an archive into `output_dir`.
    pub async fn pull(&self, key: &str, output_dir: &Path, cancel: &CancellationToken) -> Result<Downloaded> {
        transfer::download(self.backend.as_ref(), key, output_dir, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::UploadReason;
    use crate::remote::DIGEST_METADATA_KEY;
    use parcel_archive::{Compression, Digest};
    use parcel_storage::Metadata;
    use parcel_storage::backend::{MockBackend, ReadOnlyBackend};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        source: PathBuf,
        backend: Arc<MockBackend>,
        syncer: Syncer,
    }

    /// `foo/a.txt = "hi"`, archived into `<tmp>/out`.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("foo");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), b"hi").unwrap();
        let backend = Arc::new(MockBackend::default());
        let syncer = Syncer::new(backend.clone(), Archiver::new(dir.path().join("out"), Compression::Gzip));
        Fixture { dir, source, backend, syncer }
    }

    #[tokio::test]
    async fn test_upload_then_skip() {
        let fx = fixture();
        let cancel = CancellationToken::new();

        let first = fx.syncer.push(&fx.source, PushOptions::default(), &cancel).await.unwrap();
        assert_eq!(first.archive.name, "foo.tar.gz");
        assert_eq!(first.decision, Decision::Upload(UploadReason::Missing));
        assert!(first.uploaded());
        assert_eq!(fx.backend.put_count(), 1);

        let second = fx.syncer.push(&fx.source, PushOptions::default(), &cancel).await.unwrap();
        assert!(second.archive.reused);
        assert_eq!(second.archive.digest, first.archive.digest);
        assert_eq!(second.remote.stored_digest, Some(first.archive.digest.clone()));
        assert_eq!(second.decision, Decision::Skip);
        assert_eq!(fx.backend.put_count(), 1);
    }

    #[tokio::test]
    async fn test_forced_rebuild_of_unchanged_tree_skips() {
        let fx = fixture();
        let cancel = CancellationToken::new();
        fx.syncer.push(&fx.source, PushOptions::default(), &cancel).await.unwrap();
        let options = PushOptions { force: true, clean: false };
        let report = fx.syncer.push(&fx.source, options, &cancel).await.unwrap();
        assert!(!report.archive.reused);
        assert_eq!(report.decision, Decision::Skip);
        assert_eq!(fx.backend.put_count(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_remote_is_replaced() {
        let fx = fixture();
        let metadata = Metadata::from([(DIGEST_METADATA_KEY.to_string(), "XYZ".to_string())]);
        fx.backend.insert("foo.tar.gz", b"old".to_vec(), metadata);

        let report = fx.syncer.push(&fx.source, PushOptions::default(), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.remote.stored_digest, Some(Digest::from("XYZ")));
        assert_eq!(report.decision, Decision::Upload(UploadReason::Mismatch));
        assert_eq!(fx.backend.data("foo.tar.gz").await.unwrap(), fs::read(&report.archive.path).unwrap());
    }

    #[tokio::test]
    async fn test_untagged_remote_is_replaced() {
        let fx = fixture();
        fx.backend.insert("foo.tar.gz", b"old".to_vec(), Metadata::new());
        let report = fx.syncer.push(&fx.source, PushOptions::default(), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.decision, Decision::Upload(UploadReason::Untagged));
        assert_eq!(fx.backend.put_count(), 1);
    }

    #[tokio::test]
    async fn test_access_denied_stops_before_upload() {
        let fx = fixture();
        fx.backend.deny_access();
        let err = fx.syncer.push(&fx.source, PushOptions::default(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transport { operation: "probe", .. }));
        assert_eq!(fx.backend.put_count(), 0);
    }

    #[tokio::test]
    async fn test_clean_after_upload_and_after_skip() {
        let fx = fixture();
        let cancel = CancellationToken::new();
        let options = PushOptions { force: false, clean: true };

        let first = fx.syncer.push(&fx.source, options, &cancel).await.unwrap();
        assert!(matches!(first.cleanup, Cleanup::Removed));
        assert!(!first.archive.path.exists());

        let second = fx.syncer.push(&fx.source, options, &cancel).await.unwrap();
        assert!(!second.archive.reused);
        assert_eq!(second.decision, Decision::Skip);
        assert!(matches!(second.cleanup, Cleanup::Removed));
        assert_eq!(fx.backend.put_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let fx = fixture();
        let missing = fx.dir.path().join("nope");
        let err = fx.syncer.push(&missing, PushOptions::default(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert_eq!(fx.backend.put_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_push_does_not_upload() {
        let fx = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fx.syncer.push(&fx.source, PushOptions::default(), &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert_eq!(fx.backend.put_count(), 0);
    }

    #[tokio::test]
    async fn test_status_never_uploads() {
        let fx = fixture();
        let status = fx.syncer.status(&fx.source, false).await.unwrap();
        assert_eq!(status.decision, Decision::Upload(UploadReason::Missing));
        assert!(!status.remote.exists);
        assert_eq!(fx.backend.put_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_uploading() {
        let fx = fixture();
        let syncer = Syncer::new(
            Arc::new(ReadOnlyBackend::new(fx.backend.clone())),
            fx.syncer.archiver().clone(),
        );
        let report = syncer.push(&fx.source, PushOptions::default(), &CancellationToken::new()).await.unwrap();
        assert!(report.uploaded());
        assert_eq!(fx.backend.put_count(), 0);
    }

    #[tokio::test]
    async fn test_push_then_pull() {
        let fx = fixture();
        let cancel = CancellationToken::new();
        let pushed = fx.syncer.push(&fx.source, PushOptions::default(), &cancel).await.unwrap();
        let output = fx.dir.path().join("restore");
        let pulled = fx.syncer.pull("foo.tar.gz", &output, &cancel).await.unwrap();
        assert_eq!(fs::read(pulled.path).unwrap(), fs::read(pushed.archive.path).unwrap());
    }
}
