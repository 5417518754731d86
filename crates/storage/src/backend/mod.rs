//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface over an object-storage bucket (S3-compatible services, an
//! in-memory mock for tests, and a read-only decorator for dry runs).

#[cfg(any(test, feature = "mock"))]
mod mock;
mod ro;
#[cfg(feature = "s3")]
mod s3;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
#[cfg(feature = "s3")]
pub use self::s3::{MultipartSettings, S3Backend};
use crate::error::Result;
use crate::object::{ObjectInfo, Probe, PutRequest};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

pub type ObjectInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<ObjectInfo>> + Send + 'a>>;
/// Streaming body of a downloaded object.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// Unified interface for object-storage backends.
///
/// All keys are relative to the backend's configured prefix (if any) and must
/// be validated using [`validate_key`](crate::validate_key) before use.
/// Implementations enforce this validation.
///
/// # Examples
///
/// ```
/// use parcel_storage::{Probe, StorageBackend, error::Result};
///
/// async fn size_of_remote_archive(backend: &dyn StorageBackend) -> Result<u64> {
///     match backend.probe("foo.tar.gz").await? {
///         Probe::Found(head) => Ok(head.size),
///         Probe::NotFound => Ok(0),
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Bucket this backend reads from and writes to.
    fn bucket(&self) -> &str;

    /// List all objects matching an optional key prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream object metadata matching an optional key prefix.
    ///
    /// Results are yielded incrementally as pages arrive from the provider.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use parcel_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.key, info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> ObjectInfoStream<'a>;

    /// Metadata-only lookup of a single key.
    ///
    /// A missing object is [`Probe::NotFound`]. Every other failure
    /// (credentials, network, missing bucket) is an error.
    async fn probe(&self, key: &str) -> Result<Probe>;

    /// Upload a local file under `request.key`, replacing any existing object.
    ///
    /// Either the whole object becomes visible or none of it does: when the
    /// upload fails or `cancel` fires, nothing partial is left behind.
    /// Returns [`Cancelled`](crate::error::ErrorKind::Cancelled) if the token
    /// fired first.
    async fn put(&self, request: PutRequest<'_>, cancel: &CancellationToken) -> Result<()>;

    /// Open an object for streaming reads.
    ///
    /// The request is made before returning; the body is streamed as the
    /// reader is polled. Returns [`NotFound`](crate::error::ErrorKind::NotFound)
    /// if the object does not exist.
    async fn reader(&self, key: &str) -> Result<ObjectReader>;

    /// Create the bucket, waiting until it is usable.
    ///
    /// Succeeds if the bucket already exists and is owned by the caller.
    async fn create_bucket(&self) -> Result<()>;
}
