//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStorageClient trait from
//! osc-core.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    Delete, MetadataDirective, ObjectIdentifier,
};
use jiff::Timestamp;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use osc_core::metadata;
use osc_core::path::validate_object_name;
use osc_core::{
    BatchReport, Capabilities, ContainerInfo, Error, ErrorKind, ListOptions, ListPage,
    ListingEntry, Metadata, MetadataLimits, ObjectInfo, ObjectStorageClient, Profile, Result,
    SubdirInfo, UploadSource,
};

use crate::capability;
use crate::error::{batch_item_error, error_code, map_sdk_error};
use crate::multipart::{self, AbortGuard, MAX_PARTS, MultipartConfig};

/// Region that must not be sent as a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// Most keys a single DeleteObjects request accepts
const DELETE_BATCH_SIZE: usize = 1000;

/// Characters escaped in a copy source; `/` stays as the key separator
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    profile: Profile,
    multipart: MultipartConfig,
    container: Option<String>,
}

impl S3Client {
    /// Create a new S3 client from a profile
    ///
    /// Without static keys in the profile, credentials come from the SDK
    /// default chain (environment, shared config, instance metadata).
    pub async fn new(profile: Profile) -> Result<Self> {
        profile.validate()?;

        let retry = profile.retry_config();
        let timeout = profile.timeout_config();

        let retry_config = aws_config::retry::RetryConfig::standard()
            .with_max_attempts(retry.max_attempts.max(1))
            .with_initial_backoff(Duration::from_millis(retry.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(retry.max_backoff_ms));

        let mut timeout_config = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(Duration::from_millis(timeout.connect_ms))
            .read_timeout(Duration::from_millis(timeout.read_ms));
        if let Some(ms) = timeout.operation_attempt_ms {
            timeout_config = timeout_config.operation_attempt_timeout(Duration::from_millis(ms));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(profile.region.clone()))
            .retry_config(retry_config)
            .timeout_config(timeout_config.build());

        if let (Some(access_key), Some(secret_key)) = (&profile.access_key, &profile.secret_key) {
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None, // session token
                None, // expiry
                "osc-static-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }

        if let Some(endpoint) = &profile.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let config = loader.load().await;

        // Custom endpoints are usually S3-compatible servers without
        // virtual-host DNS
        let force_path_style = match profile.bucket_lookup.as_str() {
            "path" => true,
            "dns" => false,
            _ => profile.endpoint.is_some(),
        };

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(force_path_style)
            .build();

        tracing::debug!(
            profile = %profile.name,
            region = %profile.region,
            endpoint = profile.endpoint.as_deref().unwrap_or("default"),
            force_path_style,
            "Created S3 client"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            container: profile.container.clone(),
            profile,
            multipart: MultipartConfig::default(),
        })
    }

    /// Use `part_size` bytes per multipart part (clamped to S3 limits)
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.multipart = self.multipart.part_size(part_size);
        self
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    fn checked_metadata(&self, metadata: Metadata) -> Result<Metadata> {
        let metadata = metadata::normalize(metadata);
        metadata::validate(&metadata, &self.metadata_limits())?;
        Ok(metadata)
    }

    /// Delete one batch of keys (optionally versioned), recording each outcome
    async fn delete_batch(
        &self,
        bucket: &str,
        batch: Vec<(String, Option<String>)>,
        report: &mut BatchReport,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let objects = batch
            .iter()
            .map(|(key, version_id)| {
                ObjectIdentifier::builder()
                    .key(key)
                    .set_version_id(version_id.clone())
                    .build()
                    .map_err(|e| Error::General(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(|e| Error::General(e.to_string()))?;

        tracing::debug!(bucket, keys = batch.len(), "DeleteObjects");
        let response = self
            .inner
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket))?;

        for deleted in response.deleted() {
            if let Some(key) = deleted.key() {
                report.record_success(key);
            }
        }
        for failed in response.errors() {
            let key = failed.key().unwrap_or_default();
            let error = batch_item_error(failed.code(), failed.message(), key);
            tracing::warn!(bucket, key, error = %error, "Failed to delete object");
            report.record_failure(key, error);
        }
        Ok(())
    }

    async fn drain_current(&self, bucket: &str, report: &mut BatchReport) -> Result<()> {
        let mut token = None;
        loop {
            let response = self
                .inner
                .list_objects_v2()
                .bucket(bucket)
                .max_keys(DELETE_BATCH_SIZE as i32)
                .set_continuation_token(token)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket))?;

            let batch = response
                .contents()
                .iter()
                .filter_map(|o| o.key().map(|k| (k.to_string(), None)))
                .collect();
            self.delete_batch(bucket, batch, report).await?;

            match response.next_continuation_token() {
                Some(next) if response.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string())
                }
                _ => return Ok(()),
            }
        }
    }

    async fn drain_versions(&self, bucket: &str, report: &mut BatchReport) -> Result<()> {
        let mut key_marker = None;
        let mut version_marker = None;
        loop {
            let response = self
                .inner
                .list_object_versions()
                .bucket(bucket)
                .max_keys(DELETE_BATCH_SIZE as i32)
                .set_key_marker(key_marker)
                .set_version_id_marker(version_marker)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket))?;

            let versions = response
                .versions()
                .iter()
                .filter_map(|v| v.key().map(|k| (k, v.version_id())));
            let markers = response
                .delete_markers()
                .iter()
                .filter_map(|m| m.key().map(|k| (k, m.version_id())));
            let entries: Vec<(String, Option<String>)> = versions
                .chain(markers)
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect();

            for batch in entries.chunks(DELETE_BATCH_SIZE) {
                self.delete_batch(bucket, batch.to_vec(), report).await?;
            }

            if !response.is_truncated().unwrap_or(false) {
                return Ok(());
            }
            key_marker = response.next_key_marker().map(str::to_string);
            version_marker = response.next_version_id_marker().map(str::to_string);
            if key_marker.is_none() {
                return Ok(());
            }
        }
    }

    async fn put_single(
        &self,
        bucket: &str,
        name: &str,
        body: Vec<u8>,
        content_type: Option<String>,
        metadata: Metadata,
    ) -> Result<ObjectInfo> {
        let size = body.len() as u64;
        tracing::debug!(bucket, key = name, size, "PutObject");

        let response = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(name)
            .content_length(size as i64)
            .body(ByteStream::from(body))
            .set_content_type(content_type.clone())
            .set_metadata(Some(metadata.clone().into_iter().collect()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &self.object_path(Some(bucket), name)))?;

        let mut info = ObjectInfo::new(name, size);
        if let Some(etag) = response.e_tag() {
            info = info.with_etag(etag);
        }
        info.content_type = content_type;
        info.last_modified = Some(Timestamp::now());
        info.metadata = Some(metadata);
        Ok(info)
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        name: &str,
        mut source: UploadSource<'_>,
        first_part: Vec<u8>,
        part_size: usize,
        metadata: Metadata,
    ) -> Result<ObjectInfo> {
        let path = self.object_path(Some(bucket), name);
        let response = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(name)
            .set_content_type(source.content_type.clone())
            .set_metadata(Some(metadata.clone().into_iter().collect()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &path))?;

        let upload_id = response
            .upload_id()
            .ok_or_else(|| Error::General(format!("{path}: no upload id returned")))?;
        let guard = AbortGuard::new(self.inner.clone(), bucket, name, upload_id);
        tracing::debug!(bucket, key = name, upload_id, part_size, "Started multipart upload");

        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut part_number = 1i32;
        let mut chunk = first_part;
        loop {
            total += chunk.len() as u64;
            let response = self
                .inner
                .upload_part()
                .bucket(bucket)
                .key(name)
                .upload_id(guard.upload_id())
                .part_number(part_number)
                .content_length(chunk.len() as i64)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| map_sdk_error(e, &path))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );

            chunk = multipart::read_chunk(&mut *source.reader, part_size).await?;
            if chunk.is_empty() {
                break;
            }
            part_number += 1;
            if part_number as usize > MAX_PARTS {
                return Err(Error::Validation(format!(
                    "{path}: source exceeds {MAX_PARTS} parts of {part_size} bytes"
                )));
            }
        }

        if let Some(expected) = source.content_length {
            if expected != total {
                return Err(Error::Validation(format!(
                    "{path}: source produced {total} bytes, expected {expected}"
                )));
            }
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        let response = self
            .inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(name)
            .upload_id(guard.upload_id())
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &path))?;
        guard.disarm();

        tracing::debug!(bucket, key = name, parts = part_number, size = total, "Completed multipart upload");

        let mut info = ObjectInfo::new(name, total);
        if let Some(etag) = response.e_tag() {
            info = info.with_etag(etag);
        }
        info.content_type = source.content_type;
        info.last_modified = Some(Timestamp::now());
        info.metadata = Some(metadata);
        Ok(info)
    }
}

/// Convert an SDK timestamp
fn to_timestamp(dt: &aws_smithy_types::DateTime) -> Option<Timestamp> {
    Timestamp::new(dt.secs(), dt.subsec_nanos() as i32).ok()
}

/// `CopySource` header value for an object
fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", utf8_percent_encode(key, COPY_SOURCE))
}

#[async_trait]
impl ObjectStorageClient for S3Client {
    fn name(&self) -> &str {
        "s3"
    }

    fn default_container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    fn use_container(&mut self, container: &str) {
        self.container = Some(container.to_string());
    }

    fn metadata_limits(&self) -> MetadataLimits {
        MetadataLimits::S3
    }

    async fn capabilities(&self) -> Result<Capabilities> {
        capability::detect_capabilities(&self.inner, self.default_container()).await
    }

    async fn container_create(&self, name: &str) -> Result<bool> {
        let name = self.container(Some(name))?;
        let mut request = self.inner.create_bucket().bucket(name);

        if self.profile.region != DEFAULT_REGION {
            let configuration = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.profile.region.as_str()))
                .build();
            request = request.create_bucket_configuration(configuration);
        }

        match request.send().await {
            Ok(_) => {
                tracing::info!(bucket = name, region = %self.profile.region, "Created bucket");
                Ok(true)
            }
            Err(e) if error_code(&e) == Some("BucketAlreadyOwnedByYou") => {
                tracing::debug!(bucket = name, "Bucket already owned by caller");
                Ok(false)
            }
            Err(e) => Err(map_sdk_error(e, name)),
        }
    }

    async fn container_list_page(
        &self,
        prefix: Option<&str>,
        token: Option<String>,
    ) -> Result<ListPage<ContainerInfo>> {
        let response = self
            .inner
            .list_buckets()
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "list buckets"))?;

        // Not every S3-compatible server applies the prefix filter
        let items = response
            .buckets()
            .iter()
            .filter_map(|b| {
                let name = b.name()?;
                if prefix.is_some_and(|p| !name.starts_with(p)) {
                    return None;
                }
                Some(ContainerInfo {
                    name: name.to_string(),
                    creation_date: b.creation_date().and_then(to_timestamp),
                    region: b.bucket_region().map(str::to_string),
                })
            })
            .collect();

        Ok(ListPage {
            items,
            next_token: response.continuation_token().map(str::to_string),
        })
    }

    async fn container_info(&self, name: &str) -> Result<ContainerInfo> {
        let name = self.container(Some(name))?;
        let response = self
            .inner
            .head_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, name))?;

        Ok(ContainerInfo {
            name: name.to_string(),
            creation_date: None,
            region: response.bucket_region().map(str::to_string),
        })
    }

    async fn container_delete_empty(&self, name: &str) -> Result<()> {
        let name = self.container(Some(name))?;
        match self.inner.delete_bucket().bucket(name).send().await {
            Ok(_) => {
                tracing::info!(bucket = name, "Deleted bucket");
                Ok(())
            }
            Err(e) => {
                let err = map_sdk_error(e, name);
                match err.kind() {
                    ErrorKind::NotFound => {
                        tracing::debug!(bucket = name, "Bucket already absent");
                        Ok(())
                    }
                    ErrorKind::NotEmpty => Err(Error::NotEmpty(name.to_string())),
                    _ => Err(err),
                }
            }
        }
    }

    async fn container_drain(&self, name: &str) -> Result<BatchReport> {
        let name = self.container(Some(name))?;
        let mut report = BatchReport::new(format!("drain container {name}"));

        if capability::versioning_active(&self.inner, name).await? {
            tracing::debug!(bucket = name, "Draining all object versions");
            self.drain_versions(name, &mut report).await?;
        } else {
            self.drain_current(name, &mut report).await?;
        }

        Ok(report)
    }

    async fn object_info(&self, container: Option<&str>, name: &str) -> Result<ObjectInfo> {
        let bucket = self.container(container)?;
        validate_object_name(name)?;

        tracing::debug!(bucket, key = name, "HeadObject");
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &self.object_path(Some(bucket), name)))?;

        let mut info = ObjectInfo::new(name, 0);
        info.size_bytes = response.content_length().and_then(|n| u64::try_from(n).ok());
        if let Some(etag) = response.e_tag() {
            info = info.with_etag(etag);
        }
        info.content_type = response.content_type().map(str::to_string);
        info.last_modified = response.last_modified().and_then(to_timestamp);
        info.metadata = Some(metadata::normalize(
            response.metadata().cloned().unwrap_or_default(),
        ));

        Ok(info)
    }

    async fn object_replace_metadata(
        &self,
        container: Option<&str>,
        name: &str,
        metadata: Metadata,
    ) -> Result<()> {
        let bucket = self.container(container)?;
        validate_object_name(name)?;
        let metadata = self.checked_metadata(metadata)?;

        // A REPLACE copy resets headers it is not given, so carry the
        // content type over
        let current = self.object_info(Some(bucket), name).await?;
        let metadata: HashMap<String, String> = metadata.into_iter().collect();

        tracing::debug!(bucket, key = name, keys = metadata.len(), "CopyObject (replace metadata)");
        self.inner
            .copy_object()
            .bucket(bucket)
            .key(name)
            .copy_source(copy_source(bucket, name))
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(metadata))
            .set_content_type(current.content_type)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &self.object_path(Some(bucket), name)))?;

        Ok(())
    }

    async fn object_upload(
        &self,
        container: Option<&str>,
        name: &str,
        mut source: UploadSource<'_>,
        metadata: Metadata,
    ) -> Result<ObjectInfo> {
        let bucket = self.container(container)?;
        validate_object_name(name)?;
        let metadata = self.checked_metadata(metadata)?;

        let part_size = usize::try_from(self.multipart.calculate_part_size(source.content_length))
            .map_err(|_| Error::Validation("Part size does not fit in memory".into()))?;

        let first = multipart::read_chunk(&mut *source.reader, part_size).await?;
        if first.len() < part_size {
            if let Some(expected) = source.content_length {
                if expected != first.len() as u64 {
                    return Err(Error::Validation(format!(
                        "{}: source produced {} bytes, expected {expected}",
                        self.object_path(Some(bucket), name),
                        first.len()
                    )));
                }
            }
            return self
                .put_single(bucket, name, first, source.content_type, metadata)
                .await;
        }

        self.put_multipart(bucket, name, source, first, part_size, metadata)
            .await
    }

    async fn object_download(
        &self,
        container: Option<&str>,
        name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64> {
        let bucket = self.container(container)?;
        validate_object_name(name)?;

        tracing::debug!(bucket, key = name, "GetObject");
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &self.object_path(Some(bucket), name)))?;

        let mut body = response.body.into_async_read();
        let written = tokio::io::copy(&mut body, sink).await?;
        sink.flush().await?;
        Ok(written)
    }

    async fn object_list_page(
        &self,
        container: &str,
        options: &ListOptions,
        token: Option<String>,
    ) -> Result<ListPage<ListingEntry>> {
        let bucket = self.container(Some(container))?;

        tracing::debug!(bucket, prefix = options.prefix.as_deref(), "ListObjectsV2");
        let response = self
            .inner
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(options.prefix.clone())
            .set_delimiter(options.delimiter.clone())
            .set_max_keys(options.page_size)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket))?;

        let objects = response.contents().iter().filter_map(|object| {
            let key = object.key()?;
            let mut info = ObjectInfo::new(key, 0);
            info.size_bytes = object.size().and_then(|n| u64::try_from(n).ok());
            if let Some(etag) = object.e_tag() {
                info = info.with_etag(etag);
            }
            info.last_modified = object.last_modified().and_then(to_timestamp);
            Some(ListingEntry::Object(info))
        });
        let subdirs = response.common_prefixes().iter().filter_map(|p| {
            p.prefix().map(|prefix| {
                ListingEntry::Subdir(SubdirInfo {
                    prefix: prefix.to_string(),
                })
            })
        });

        // S3 returns objects and prefixes separately; merge them in key order
        let mut items: Vec<ListingEntry> = objects.chain(subdirs).collect();
        items.sort_by(|a, b| a.name().cmp(b.name()));

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { items, next_token })
    }

    async fn object_delete(&self, container: Option<&str>, name: &str) -> Result<()> {
        let bucket = self.container(container)?;
        validate_object_name(name)?;

        tracing::debug!(bucket, key = name, "DeleteObject");
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &self.object_path(Some(bucket), name)))?;

        Ok(())
    }
}
