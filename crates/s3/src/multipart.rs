//! Multipart upload support
//!
//! Sources are read one part at a time, so an upload holds at most one part
//! in memory regardless of the source length. An in-flight multipart upload
//! is owned by an [`AbortGuard`] that aborts it on every exit path except a
//! completed upload.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Default part size: 8 MiB
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Minimum part size: 5 MiB (S3 requirement)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: usize = 10_000;

/// Multipart upload configuration
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Part size in bytes
    pub part_size: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        self
    }

    /// Part size for a source of known or unknown length
    ///
    /// Known lengths that would need more than [`MAX_PARTS`] parts get larger
    /// parts. Unknown lengths use the configured size, which caps the upload
    /// at `part_size * MAX_PARTS` bytes.
    pub fn calculate_part_size(&self, length: Option<u64>) -> u64 {
        let Some(length) = length else {
            return self.part_size;
        };

        let parts = length.div_ceil(self.part_size);
        if parts <= MAX_PARTS as u64 {
            self.part_size
        } else {
            length
                .div_ceil(MAX_PARTS as u64)
                .clamp(MIN_PART_SIZE, MAX_PART_SIZE)
        }
    }
}

/// Read up to `size` bytes, stopping early only at end of stream
///
/// A chunk shorter than `size` means the source is exhausted.
pub async fn read_chunk<R>(reader: &mut R, size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = Vec::with_capacity(size);
    let mut limited = reader.take(size as u64);
    limited.read_to_end(&mut chunk).await?;
    Ok(chunk)
}

/// Aborts a multipart upload when dropped unless disarmed
///
/// Dropping happens on errors and on cancellation of the upload future, so
/// the abort is spawned onto the runtime and its outcome only logged.
pub struct AbortGuard {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    upload_id: Option<String>,
}

impl AbortGuard {
    pub fn new(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
            upload_id: Some(upload_id.into()),
        }
    }

    pub fn upload_id(&self) -> &str {
        self.upload_id.as_deref().unwrap_or_default()
    }

    /// The upload completed; nothing to abort
    pub fn disarm(mut self) {
        self.upload_id = None;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                bucket = %self.bucket,
                key = %self.key,
                upload_id = %upload_id,
                "No runtime to abort multipart upload; it must be cleaned up by a lifecycle rule"
            );
            return;
        };

        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            let result = client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await;
            match result {
                Ok(_) => tracing::debug!(%bucket, %key, %upload_id, "Aborted multipart upload"),
                Err(e) => tracing::warn!(
                    %bucket,
                    %key,
                    %upload_id,
                    error = %aws_sdk_s3::error::DisplayErrorContext(&e),
                    "Failed to abort multipart upload"
                ),
            }
        });
    }
}
