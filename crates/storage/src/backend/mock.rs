//! In-memory storage backend for testing.

use super::{ObjectInfoStream, ObjectReader};
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::{Metadata, ObjectHead, ObjectInfo, Probe, PutRequest, StorageBackend};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct MockObject {
    data: Vec<u8>,
    metadata: Metadata,
    modified: OffsetDateTime,
}

/// In-memory storage backend for testing.
///
/// Objects are stored in a `BTreeMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. Ideal
/// for unit tests that need a [`StorageBackend`] without network
/// dependencies.
///
/// Two extra knobs make sync behaviour observable: [`put_count`](Self::put_count)
/// counts successful uploads, and [`deny_access`](Self::deny_access) makes
/// every request fail as if the credentials were rejected.
///
/// # Examples
///
/// ```
/// use parcel_storage::backend::{MockBackend, StorageBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_objects([
///     ("foo.tar.gz", b"...".to_vec()),
/// ]);
/// assert!(backend.probe("foo.tar.gz").await?.exists());
/// assert!(!backend.probe("bar.tar.gz").await?.exists());
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    bucket: String,
    storage: RwLock<BTreeMap<String, MockObject>>,
    denied: AtomicBool,
    puts: AtomicUsize,
    buckets_created: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects (without metadata).
    ///
    /// Panics if any key fails validation. If test setup is wrong, then test
    /// should not pass.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let backend = Self {
            name: "mock".to_string(),
            bucket: "mock-bucket".to_string(),
            storage: RwLock::new(BTreeMap::new()),
            denied: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
            buckets_created: AtomicUsize::new(0),
        };
        for (key, data) in objects {
            backend.insert(key, data, Metadata::new());
        }
        backend
    }

    /// Change the bucket name reported by the mock backend.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Store an object directly, bypassing [`put`](StorageBackend::put) and
    /// its counter.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>, metadata: Metadata) {
        let key = key.into();
        let Ok(validated) = validate_key(&key) else {
            // The panic here is DELIBERATE. MockBackend is intended to be
            // used in tests; panics are expected. There is no error result.
            panic!("MockBackend::insert: invalid key {key}");
        };
        let object = MockObject {
            data: data.into(),
            metadata,
            modified: OffsetDateTime::now_utc(),
        };
        // Nothing else can hold the lock while a test is setting up.
        match self.storage.try_write() {
            Ok(mut guard) => guard.insert(validated, object),
            Err(_) => panic!("MockBackend::insert: storage is locked"),
        };
    }

    /// Make every subsequent request fail with
    /// [`PermissionDenied`](ErrorKind::PermissionDenied).
    pub fn deny_access(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    /// Number of successful [`put`](StorageBackend::put) calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of [`create_bucket`](StorageBackend::create_bucket) calls so far.
    pub fn buckets_created(&self) -> usize {
        self.buckets_created.load(Ordering::SeqCst)
    }

    /// Body of a stored object.
    pub async fn data(&self, key: &str) -> Option<Vec<u8>> {
        self.storage.read().await.get(key).map(|object| object.data.clone())
    }

    /// Metadata of a stored object.
    pub async fn metadata(&self, key: &str) -> Option<Metadata> {
        self.storage.read().await.get(key).map(|object| object.metadata.clone())
    }

    fn check_access(&self, key: &str) -> Result<()> {
        match self.denied.load(Ordering::SeqCst) {
            true => exn::bail!(ErrorKind::PermissionDenied(key.to_string())),
            false => Ok(()),
        }
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let objects: [(&str, &[u8]); 0] = [];
        Self::with_objects(objects)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> ObjectInfoStream<'a> {
        Box::pin(stream! {
            if let Err(err) = self.check_access(prefix.unwrap_or_default()) {
                yield Err(err);
                return;
            }
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<ObjectInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(key, _)| prefix.is_none_or(|prefix| key.starts_with(prefix)))
                    .map(|(key, object)| ObjectInfo {
                        key: key.clone(),
                        size: object.data.len() as u64,
                        modified: object.modified,
                    })
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn probe(&self, key: &str) -> Result<Probe> {
        self.check_access(key)?;
        let key = validate_key(key)?;
        Ok(match self.storage.read().await.get(&key) {
            Some(object) => Probe::Found(ObjectHead {
                size: object.data.len() as u64,
                modified: Some(object.modified),
                metadata: object.metadata.clone(),
                key,
            }),
            None => Probe::NotFound,
        })
    }

    async fn put(&self, request: PutRequest<'_>, cancel: &CancellationToken) -> Result<()> {
        self.check_access(request.key)?;
        let key = validate_key(request.key)?;
        let data = tokio::fs::read(request.source)
            .await
            .or_raise(|| ErrorKind::Io(request.source.to_path_buf()))?;
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let object = MockObject {
            data,
            metadata: request.metadata,
            modified: OffsetDateTime::now_utc(),
        };
        self.storage.write().await.insert(key, object);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reader(&self, key: &str) -> Result<ObjectReader> {
        self.check_access(key)?;
        let key = validate_key(key)?;
        let data = self.data(&key).await.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key)))?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn create_bucket(&self) -> Result<()> {
        self.check_access(&self.bucket)?;
        self.buckets_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn archive_file(data: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.tar.gz");
        std::fs::write(&path, data).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_put_and_read() {
        let backend = MockBackend::default();
        let (_dir, path) = archive_file(b"hello");
        let request = PutRequest::new("foo.tar.gz", &path).with_metadata("md5chksum", "abc");
        backend.put(request, &CancellationToken::new()).await.unwrap();
        assert_eq!(backend.put_count(), 1);

        let mut body = Vec::new();
        backend.reader("foo.tar.gz").await.unwrap().read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(backend.metadata("foo.tar.gz").await.unwrap().get("md5chksum").unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_probe() {
        let backend = MockBackend::default();
        backend.insert("foo.tar.gz", b"12345".to_vec(), Metadata::from([("Md5chksum".into(), "xyz".into())]));
        let Probe::Found(head) = backend.probe("foo.tar.gz").await.unwrap() else {
            panic!("expected object to be found");
        };
        assert_eq!(head.key, "foo.tar.gz");
        assert_eq!(head.size, 5);
        assert_eq!(head.metadata_value("md5chksum"), Some("xyz"));
        assert_eq!(backend.probe("bar.tar.gz").await.unwrap(), Probe::NotFound);
    }

    #[tokio::test]
    async fn test_reader_not_found() {
        let backend = MockBackend::default();
        let Err(err) = backend.reader("missing.tar.gz").await else {
            panic!("expected missing object to fail");
        };
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_put_is_not_stored() {
        let backend = MockBackend::default();
        let (_dir, path) = archive_file(b"hello");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = backend.put(PutRequest::new("foo.tar.gz", &path), &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert_eq!(backend.put_count(), 0);
        assert!(!backend.probe("foo.tar.gz").await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_denied_access() {
        let backend = MockBackend::with_objects([("foo.tar.gz", b"data".to_vec())]);
        backend.deny_access();
        let err = backend.probe("foo.tar.gz").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert!(backend.list(None).await.is_err());
        assert!(backend.create_bucket().await.is_err());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_objects([
            ("daily/a.tar.gz", b"a".to_vec()),
            ("daily/b.tar.gz", b"bb".to_vec()),
            ("weekly/c.tar.gz", b"ccc".to_vec()),
        ]);
        let objects = backend.list(Some("daily/")).await.unwrap();
        let keys: Vec<_> = objects.iter().map(|o| (o.key.as_str(), o.size)).collect();
        assert_eq!(keys, vec![("daily/a.tar.gz", 1), ("daily/b.tar.gz", 2)]);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_key_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.probe("../escape").await.is_err());
        let (_dir, path) = archive_file(b"bad");
        assert!(backend.put(PutRequest::new("../escape", &path), &CancellationToken::new()).await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_with_objects_panics_on_bad_key() {
        MockBackend::with_objects([("../escape", b"bad".to_vec())]);
    }
}
