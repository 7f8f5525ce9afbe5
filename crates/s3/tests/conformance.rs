//! Conformance suite against a live S3-compatible server
//!
//! These tests require a running S3-compatible server.
//!
//! Run with:
//! ```bash
//! export TEST_S3_ENDPOINT=http://localhost:9000
//! export TEST_S3_ACCESS_KEY=accesskey
//! export TEST_S3_SECRET_KEY=secretkey
//! cargo test -p osc-s3 --features integration
//! ```

#![cfg(feature = "integration")]

use md5::{Digest, Md5};
use osc_core::conformance;
use osc_core::{ErrorKind, Metadata, ObjectStorageClient, Profile, UploadSource};
use osc_s3::S3Client;
use osc_s3::multipart::MIN_PART_SIZE;

/// Get S3 test configuration from environment
fn get_test_profile() -> Option<Profile> {
    let endpoint = std::env::var("TEST_S3_ENDPOINT").ok()?;
    let access_key = std::env::var("TEST_S3_ACCESS_KEY").ok()?;
    let secret_key = std::env::var("TEST_S3_SECRET_KEY").ok()?;

    let mut profile = Profile::s3("test", endpoint, access_key, secret_key);
    profile.bucket_lookup = "path".to_string();
    Some(profile)
}

/// Generate unique suffix for test resources
fn unique_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:x}", duration.as_nanos() % 0xFFFFFFFF)
}

async fn client() -> Option<S3Client> {
    let Some(profile) = get_test_profile() else {
        eprintln!("TEST_S3_* not set, skipping");
        return None;
    };
    Some(S3Client::new(profile).await.expect("client"))
}

#[tokio::test]
async fn test_s3_conformance() {
    let Some(client) = client().await else {
        return;
    };
    conformance::run_all(&client, &format!("osc-conf-{}", unique_suffix()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_s3_multipart_round_trip() {
    let Some(client) = client().await else {
        return;
    };
    let client = client.with_part_size(MIN_PART_SIZE);
    let bucket = format!("osc-mpu-{}", unique_suffix());
    client.container_create(&bucket).await.unwrap();

    // Two full parts and a short tail, with unknown length
    let body: Vec<u8> = (0..(2 * MIN_PART_SIZE + 1234))
        .map(|i| (i % 253) as u8)
        .collect();
    let mut reader: &[u8] = &body;
    let mut metadata = Metadata::new();
    metadata.insert("Origin".to_string(), "multipart".to_string());

    let info = client
        .object_upload(
            Some(&bucket),
            "big.bin",
            UploadSource::new(&mut reader).with_content_type("application/x-test"),
            metadata,
        )
        .await
        .unwrap();
    assert_eq!(info.size_bytes, Some(body.len() as u64));
    assert!(info.etag.as_deref().is_some_and(|e| e.ends_with("-3")));

    let head = client.object_info(Some(&bucket), "big.bin").await.unwrap();
    assert_eq!(head.content_type.as_deref(), Some("application/x-test"));
    assert_eq!(
        head.metadata.unwrap_or_default().get("origin").map(String::as_str),
        Some("multipart")
    );

    let mut downloaded = Vec::new();
    let written = client
        .object_download(Some(&bucket), "big.bin", &mut downloaded)
        .await
        .unwrap();
    assert_eq!(written, body.len() as u64);
    assert_eq!(Md5::digest(&downloaded), Md5::digest(&body));

    client.container_delete(&bucket, true).await.unwrap();
}

#[tokio::test]
async fn test_s3_replace_metadata_keeps_content_type() {
    let Some(client) = client().await else {
        return;
    };
    let bucket = format!("osc-meta-{}", unique_suffix());
    client.container_create(&bucket).await.unwrap();

    let mut reader: &[u8] = b"{}";
    client
        .object_upload(
            Some(&bucket),
            "dir/with space.json",
            UploadSource::new(&mut reader)
                .with_length(2)
                .with_content_type("application/json"),
            Metadata::new(),
        )
        .await
        .unwrap();

    client
        .object_set_metadata_key(Some(&bucket), "dir/with space.json", "Stage", "final")
        .await
        .unwrap();

    let info = client
        .object_info(Some(&bucket), "dir/with space.json")
        .await
        .unwrap();
    assert_eq!(info.content_type.as_deref(), Some("application/json"));
    assert_eq!(
        info.metadata.unwrap_or_default().get("stage").map(String::as_str),
        Some("final")
    );

    client.container_delete(&bucket, true).await.unwrap();
}

#[tokio::test]
async fn test_s3_missing_bucket_is_not_found() {
    let Some(client) = client().await else {
        return;
    };
    let bucket = format!("osc-absent-{}", unique_suffix());

    let err = client.container_info(&bucket).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = client.object_info(Some(&bucket), "x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    client.container_delete(&bucket, true).await.unwrap();
}
