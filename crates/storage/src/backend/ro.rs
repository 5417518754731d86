//! Read-only storage backend.
//!
//! This module provides a storage backend implementation that wraps other
//! implementations and prevents write operations from executing, but
//! indicating success on return.

use crate::backend::{ObjectInfoStream, ObjectReader};
use crate::{BackendHandle, Probe, PutRequest, StorageBackend, error::Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Read-only storage backend.
///
/// Wraps another backend and silently drops all write operations, logging an
/// [`info event`](tracing::Event). Used for dry runs: probes and listings
/// still hit the real bucket, so the reported decision is accurate.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> ObjectInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn probe(&self, key: &str) -> Result<Probe> {
        self.inner.probe(key).await
    }

    async fn put(&self, request: PutRequest<'_>, _cancel: &CancellationToken) -> Result<()> {
        tracing::info!(
            key = request.key,
            bucket = self.bucket(),
            source = %request.source.display(),
            "Skipping upload during read-only mode"
        );
        Ok(())
    }

    async fn reader(&self, key: &str) -> Result<ObjectReader> {
        self.inner.reader(key).await
    }

    async fn create_bucket(&self) -> Result<()> {
        tracing::info!(bucket = self.bucket(), "Skipping bucket creation during read-only mode");
        Ok(())
    }
}
