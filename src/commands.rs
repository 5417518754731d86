use crate::cli::PushArgs;
use crate::error::{ErrorKind, Result};
use futures::TryStreamExt;
use parcel_archive::Archiver;
use parcel_config::Config;
use parcel_storage::backend::{ReadOnlyBackend, S3Backend};
use parcel_storage::{BackendHandle, StorageBackend};
use parcel_sync::{Cleanup, Decision, PushOptions, PushReport, Syncer};
use std::path::Path;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;

fn s3_backend(config: &Config) -> Result<S3Backend> {
    let bucket = config.bucket().map_err(ErrorKind::config)?;
    let (key_id, key_secret) = config.credentials().map_err(ErrorKind::config)?;
    S3Backend::new(
        "s3",
        bucket,
        config.prefix.clone(),
        &config.region,
        Some(&config.endpoint),
        key_id,
        key_secret,
    )
    .map_err(ErrorKind::storage)
}

fn syncer(config: &Config, backend: BackendHandle) -> Syncer {
    Syncer::new(backend, Archiver::new(config.archive_dir(), config.compression))
}

pub async fn push(config: &Config, args: &PushArgs, cancel: &CancellationToken) -> Result<()> {
    let backend: BackendHandle = Arc::new(s3_backend(config)?);
    let report = push_to(config, backend, args, cancel).await?;

    let outcome = match (report.decision, args.dry_run) {
        (Decision::Skip, _) => "up to date".to_string(),
        (decision, true) => format!("would {decision}"),
        (_, false) => "uploaded".to_string(),
    };
    println!("{}  {}  {}", report.archive.name, report.archive.short_fingerprint(), outcome);
    if let Cleanup::Failed(err) = &report.cleanup {
        eprintln!("warning: could not remove {}: {err}", report.archive.path.display());
    }
    Ok(())
}

async fn push_to(
    config: &Config,
    backend: BackendHandle,
    args: &PushArgs,
    cancel: &CancellationToken,
) -> Result<PushReport> {
    let backend: BackendHandle = match args.dry_run {
        true => Arc::new(ReadOnlyBackend::new(backend)),
        false => backend,
    };
    if args.make_bucket {
        backend.create_bucket().await.map_err(ErrorKind::storage)?;
    }
    let options = PushOptions {
        force: args.force,
        clean: args.clean && !args.dry_run,
    };
    syncer(config, backend)
        .push(&args.folder, options, cancel)
        .await
        .map_err(ErrorKind::sync)
}

pub async fn status(config: &Config, folder: &Path, force: bool) -> Result<()> {
    let backend: BackendHandle = Arc::new(ReadOnlyBackend::new(Arc::new(s3_backend(config)?)));
    let status = syncer(config, backend).status(folder, force).await.map_err(ErrorKind::sync)?;
    let remote = match status.remote.stored_digest.as_ref().and_then(|digest| digest.short()) {
        Some(short) if status.remote.exists => short,
        _ if status.remote.exists => "-".to_string(),
        _ => "absent".to_string(),
    };
    println!(
        "{}  local {}  remote {}  {}",
        status.archive.name,
        status.archive.short_fingerprint(),
        remote,
        status.decision
    );
    Ok(())
}

pub async fn pull(config: &Config, key: &str, output: &Path, cancel: &CancellationToken) -> Result<()> {
    let backend: BackendHandle = Arc::new(s3_backend(config)?);
    let downloaded = syncer(config, backend).pull(key, output, cancel).await.map_err(ErrorKind::sync)?;
    println!("{}  {} bytes", downloaded.path.display(), downloaded.bytes);
    Ok(())
}

pub async fn list(config: &Config, filter: Option<&str>, cancel: &CancellationToken) -> Result<()> {
    let backend = s3_backend(config)?;
    let mut objects = backend.list_stream(filter);
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
            next = objects.try_next() => next.map_err(ErrorKind::storage)?,
        };
        let Some(object) = next else { break };
        let modified = object.modified.format(&Rfc3339).unwrap_or_else(|_| "-".to_string());
        println!("{}\t{}\t{}", object.key, object.size, modified);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::summary;
    use parcel_storage::backend::MockBackend;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// `foo/a.txt`, with archives written to `<tmp>/out`.
    fn fixture() -> (TempDir, Config, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("foo");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), b"hi").unwrap();
        let config = Config {
            archive_dir: Some(dir.path().join("out")),
            ..Config::default()
        };
        (dir, config, source)
    }

    fn args(folder: PathBuf) -> PushArgs {
        PushArgs {
            folder,
            force: false,
            clean: false,
            make_bucket: false,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_push_creates_bucket_first() {
        let (_dir, config, source) = fixture();
        let backend = Arc::new(MockBackend::default().with_bucket("photos"));
        let args = PushArgs { make_bucket: true, ..args(source) };
        let report = push_to(&config, backend.clone(), &args, &CancellationToken::new()).await.unwrap();
        assert!(report.uploaded());
        assert_eq!(backend.buckets_created(), 1);
        assert_eq!(backend.put_count(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_neither_creates_bucket_nor_uploads() {
        let (_dir, config, source) = fixture();
        let backend = Arc::new(MockBackend::default());
        let args = PushArgs {
            make_bucket: true,
            dry_run: true,
            clean: true,
            ..args(source)
        };
        let report = push_to(&config, backend.clone(), &args, &CancellationToken::new()).await.unwrap();
        assert!(report.uploaded());
        assert_eq!(backend.buckets_created(), 0);
        assert_eq!(backend.put_count(), 0);
        assert!(matches!(report.cleanup, Cleanup::Kept));
        assert!(report.archive.path.exists());
    }

    #[tokio::test]
    async fn test_denied_push_reports_cause() {
        let (_dir, config, source) = fixture();
        let backend = Arc::new(MockBackend::default().with_bucket("photos"));
        backend.deny_access();
        let err = push_to(&config, backend, &args(source), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(
            summary(&err),
            "probe failed for foo.tar.gz in bucket photos: permission denied: foo.tar.gz"
        );
    }
}
