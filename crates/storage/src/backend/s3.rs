//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Wasabi, Backblaze B2, MinIO and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly (configuration file, environment or
//! command line); the AWS credential chain is not consulted.
//!
//! # Uploads
//!
//! Archives up to the [multipart threshold](MultipartSettings::threshold) are
//! sent with a single `PutObject` carrying `Content-MD5`. Larger archives use
//! a multipart upload, which is aborted if any part fails or the transfer is
//! cancelled, so an object only becomes visible once all of it has arrived.

use crate::backend::{ObjectInfoStream, ObjectReader};
use crate::error::{Error, ErrorKind, Result};
use crate::{ObjectHead, ObjectInfo, Probe, PutRequest, StorageBackend, validate_key};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::get_object::GetObjectError,
    primitives::{ByteStream, DateTime, Length},
    types::{BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration},
};
use exn::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// Region that must not be sent as a bucket location constraint.
const DEFAULT_REGION: &str = "us-east-1";
/// S3 refuses multipart uploads with more parts than this.
const MAX_PARTS: u64 = 10_000;
const BUCKET_WAIT_ATTEMPTS: u32 = 10;
const BUCKET_WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// When and how to split uploads into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipartSettings {
    /// Files larger than this many bytes use a multipart upload.
    pub threshold: u64,
    /// Smallest part size. Raised automatically so no upload needs more than
    /// 10,000 parts.
    pub min_part_size: u64,
}

impl Default for MultipartSettings {
    fn default() -> Self {
        Self {
            threshold: 64 * 1024 * 1024,
            min_part_size: 8 * 1024 * 1024,
        }
    }
}

impl MultipartSettings {
    fn part_size(&self, total: u64) -> u64 {
        self.min_part_size.max(total.div_ceil(MAX_PARTS)).max(1)
    }
}

/// S3-compatible storage backend.
///
/// Stores archives in an S3 bucket, optionally under a key prefix. All keys
/// are relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use parcel_storage::backend::S3Backend;
///
/// # fn example() -> parcel_storage::error::Result<()> {
/// let backend = S3Backend::new(
///     "wasabi",
///     "my-bucket",
///     Some("backups".to_string()),
///     "us-east-1",
///     Some("https://s3.wasabisys.com"),
///     "access_key_id",
///     "secret_access_key",
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    region: String,
    prefix: Option<String>,
    multipart: MultipartSettings,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - Provider region; also the location constraint for new buckets
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let region = region.into();
        let credentials = Credentials::new(key_id, key_secret, None, None, "parcel-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Wasabi, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        Self::from_client(name, client, bucket, region, prefix)
    }

    /// Wrap an already configured client.
    pub fn from_client(
        name: impl Into<String>,
        client: Client,
        bucket: impl Into<String>,
        region: impl Into<String>,
        prefix: Option<String>,
    ) -> Result<Self> {
        let prefix = prefix.filter(|p| !p.trim_matches('/').is_empty()).map(validate_key).transpose()?;
        Ok(Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            region: region.into(),
            prefix,
            multipart: MultipartSettings::default(),
        })
    }

    pub fn with_multipart(mut self, multipart: MultipartSettings) -> Self {
        self.multipart = multipart;
        self
    }

    /// Construct the full S3 key from a relative key.
    fn full_key(&self, key: &str) -> Result<String> {
        let validated = validate_key(key)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{validated}"),
            None => validated,
        })
    }

    /// Strip the configured prefix from an S3 key.
    fn relative_key<'k>(&self, key: &'k str) -> &'k str {
        match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str()).and_then(|s| s.strip_prefix('/')).unwrap_or(key),
            None => key,
        }
    }

    /// Prefix to send with a listing request.
    fn list_prefix(&self, prefix: Option<&str>) -> Option<String> {
        match (&self.prefix, prefix) {
            (Some(base), Some(prefix)) => Some(format!("{base}/{}", prefix.trim_start_matches('/'))),
            (Some(base), None) => Some(format!("{base}/")),
            (None, prefix) => prefix.map(str::to_string),
        }
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    async fn put_multipart(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        metadata: HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|err| raise_sdk(err, key))?;
        let upload_id = created
            .upload_id()
            .ok_or_raise(|| ErrorKind::BackendError("multipart upload created without an upload ID".to_string()))?
            .to_string();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(exn::Exn::from(ErrorKind::Cancelled)),
            result = self.upload_parts(key, &upload_id, source, size) => result,
        };
        if result.is_err() {
            self.abort_multipart(key, &upload_id).await;
        }
        result
    }

    async fn upload_parts(&self, key: &str, upload_id: &str, source: &Path, size: u64) -> Result<()> {
        let part_size = self.multipart.part_size(size);
        let mut parts = Vec::new();
        let mut offset = 0;
        let mut part_number = 1;
        while offset < size {
            let length = part_size.min(size - offset);
            let body = ByteStream::read_from()
                .path(source)
                .offset(offset)
                .length(Length::Exact(length))
                .build()
                .await
                .or_raise(|| ErrorKind::Io(source.to_path_buf()))?;
            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(|err| raise_sdk(err, key))?;
            tracing::debug!(key, part_number, bytes = length, "Uploaded part");
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            offset += length;
            part_number += 1;
        }
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(|err| raise_sdk(err, key))?;
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        match result {
            Ok(_) => tracing::info!(key, upload_id, "Aborted multipart upload"),
            Err(err) => tracing::warn!(
                key,
                upload_id,
                error = %DisplayErrorContext(&err),
                "Failed to abort multipart upload; incomplete parts may linger until a lifecycle rule removes them"
            ),
        }
    }

    /// Poll until a freshly created bucket answers `HeadBucket`.
    async fn wait_for_bucket(&self) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.client.head_bucket().bucket(&self.bucket).send().await {
                Ok(_) => return Ok(()),
                Err(err) if attempt >= BUCKET_WAIT_ATTEMPTS => return Err(raise_sdk(err, &self.bucket)),
                Err(err) => {
                    tracing::debug!(bucket = %self.bucket, attempt, error = %DisplayErrorContext(&err), "Bucket not ready yet");
                    tokio::time::sleep(BUCKET_WAIT_INTERVAL).await;
                    attempt += 1;
                },
            }
        }
    }
}

/// Map an SDK failure onto an [`ErrorKind`], keeping the SDK error as the
/// child frame.
fn raise_sdk<E>(err: SdkError<E, HttpResponse>, target: &str) -> Error
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
{
    let kind = classify(&err, target);
    exn::Exn::from(err).raise(kind)
}

fn classify<E>(err: &SdkError<E, HttpResponse>, target: &str) -> ErrorKind
where
    E: std::error::Error + ProvideErrorMetadata + 'static,
{
    if matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)) {
        return ErrorKind::Network(DisplayErrorContext(err).to_string());
    }
    let status = err.raw_response().map(|response| response.status().as_u16());
    match (err.code(), status) {
        (Some("NoSuchKey" | "NotFound"), _) | (None, Some(404)) => ErrorKind::NotFound(target.to_string()),
        (Some("AccessDenied" | "Forbidden" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"), _)
        | (None, Some(401 | 403)) => ErrorKind::PermissionDenied(target.to_string()),
        _ => ErrorKind::BackendError(DisplayErrorContext(err).to_string()),
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> ObjectInfoStream<'a> {
        Box::pin(stream! {
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(self.list_prefix(prefix))
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(err) => {
                        yield Err(raise_sdk(err, &self.bucket));
                        return;
                    },
                };
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    let modified = match object.last_modified().map(Self::parse_datetime).transpose() {
                        Ok(modified) => modified.unwrap_or(OffsetDateTime::UNIX_EPOCH),
                        Err(err) => {
                            yield Err(err);
                            return;
                        },
                    };
                    yield Ok(ObjectInfo {
                        key: self.relative_key(key).to_string(),
                        size: u64::try_from(object.size().unwrap_or_default()).unwrap_or_default(),
                        modified,
                    });
                }
            }
        })
    }

    async fn probe(&self, key: &str) -> Result<Probe> {
        let full_key = self.full_key(key)?;
        let result = self.client.head_object().bucket(&self.bucket).key(&full_key).send().await;
        let output = match result {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                tracing::debug!(key = %full_key, bucket = %self.bucket, "Object not found");
                return Ok(Probe::NotFound);
            },
            Err(err) => return Err(raise_sdk(err, &full_key)),
        };
        let metadata = output
            .metadata()
            .map(|metadata| metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(Probe::Found(ObjectHead {
            key: self.relative_key(&full_key).to_string(),
            size: u64::try_from(output.content_length().unwrap_or_default()).unwrap_or_default(),
            modified: output.last_modified().map(Self::parse_datetime).transpose()?,
            metadata,
        }))
    }

    async fn put(&self, request: PutRequest<'_>, cancel: &CancellationToken) -> Result<()> {
        let key = self.full_key(request.key)?;
        let source = request.source;
        let size = tokio::fs::metadata(source)
            .await
            .or_raise(|| ErrorKind::Io(source.to_path_buf()))?
            .len();
        let metadata: HashMap<String, String> = request.metadata.into_iter().collect();

        if size > self.multipart.threshold {
            tracing::debug!(%key, size, "Using multipart upload");
            return self.put_multipart(&key, source, size, metadata, cancel).await;
        }

        let body = ByteStream::from_path(source).await.or_raise(|| ErrorKind::Io(source.to_path_buf()))?;
        let send = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .set_content_md5(request.content_md5)
            .set_metadata(Some(metadata))
            .body(body)
            .send();
        tokio::select! {
            biased;
            () = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
            result = send => {
                result.map_err(|err| raise_sdk(err, &key))?;
            },
        }
        Ok(())
    }

    async fn reader(&self, key: &str) -> Result<ObjectReader> {
        let full_key = self.full_key(key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|err| match err.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
                true => exn::Exn::from(err).raise(ErrorKind::NotFound(full_key.clone())),
                false => raise_sdk(err, &full_key),
            })?;
        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn create_bucket(&self) -> Result<()> {
        let configuration = (self.region != DEFAULT_REGION).then(|| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build()
        });
        let result = self
            .client
            .create_bucket()
            .bucket(&self.bucket)
            .set_create_bucket_configuration(configuration)
            .send()
            .await;
        match result {
            Ok(_) => tracing::info!(bucket = %self.bucket, region = %self.region, "Created bucket"),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_bucket_already_owned_by_you()) => {
                tracing::info!(bucket = %self.bucket, "Bucket already exists");
            },
            Err(err) => return Err(raise_sdk(err, &self.bucket)),
        }
        self.wait_for_bucket().await
    }
}
