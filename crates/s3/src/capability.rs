//! Capability detection for S3 backends
//!
//! S3-compatible servers differ in which features they implement. Versioning
//! matters most: a force delete of a versioned bucket must remove every
//! version and delete marker, not just the current objects.

use aws_sdk_s3::types::BucketVersioningStatus;

use osc_core::{Capabilities, ErrorKind, Result};

use crate::error::map_sdk_error;

/// Detect capabilities of an S3 backend
///
/// Versioning is checked on `bucket` when one is given; without a bucket the
/// answer is unknown and reported as `false`.
pub async fn detect_capabilities(
    client: &aws_sdk_s3::Client,
    bucket: Option<&str>,
) -> Result<Capabilities> {
    let versioning = match bucket {
        Some(bucket) => versioning_active(client, bucket).await?,
        None => false,
    };

    Ok(Capabilities {
        versioning,
        native_metadata_patch: false,
        multipart_upload: true,
    })
}

/// Whether a bucket holds (or may hold) object versions
///
/// Suspended versioning still keeps the versions written while it was
/// enabled. Servers that do not implement the call report `false`; a missing
/// bucket is `NotFound`.
pub async fn versioning_active(client: &aws_sdk_s3::Client, bucket: &str) -> Result<bool> {
    match client.get_bucket_versioning().bucket(bucket).send().await {
        Ok(response) => Ok(is_versioned(response.status())),
        Err(e) => {
            let err = map_sdk_error(e, bucket);
            match err.kind() {
                ErrorKind::Unsupported => {
                    tracing::debug!(bucket, "Versioning not supported by server");
                    Ok(false)
                }
                _ => Err(err),
            }
        }
    }
}

fn is_versioned(status: Option<&BucketVersioningStatus>) -> bool {
    matches!(
        status,
        Some(BucketVersioningStatus::Enabled | BucketVersioningStatus::Suspended)
    )
}
