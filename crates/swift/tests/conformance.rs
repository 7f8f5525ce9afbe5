//! Conformance suite against a live Swift cluster
//!
//! These tests require a Swift account and a token or Keystone credentials.
//!
//! Run with:
//! ```bash
//! export TEST_SWIFT_URL=http://localhost:8080/v1/AUTH_test
//! export TEST_SWIFT_TOKEN=...            # or the OS_* Keystone variables
//! cargo test -p osc-swift --features integration
//! ```

#![cfg(feature = "integration")]

use md5::{Digest, Md5};
use osc_core::conformance;
use osc_core::{ErrorKind, Metadata, ObjectStorageClient, Profile, Provider, SwiftAuth, UploadSource};
use osc_swift::SwiftClient;

/// Get Swift test configuration from environment
fn get_test_profile() -> Option<Profile> {
    let url = std::env::var("TEST_SWIFT_URL").ok()?;
    let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

    let mut profile = Profile::new("test", Provider::Swift);
    profile.endpoint = Some(url);
    profile.swift = Some(SwiftAuth {
        auth_url: var("OS_AUTH_URL"),
        username: var("OS_USERNAME"),
        password: var("OS_PASSWORD"),
        project_name: var("OS_PROJECT_NAME"),
        user_domain: var("OS_USER_DOMAIN_NAME"),
        project_domain: var("OS_PROJECT_DOMAIN_NAME"),
        token: var("TEST_SWIFT_TOKEN"),
    });
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

async fn client() -> Option<SwiftClient> {
    let Some(profile) = get_test_profile() else {
        eprintln!("TEST_SWIFT_URL not set, skipping");
        return None;
    };
    Some(SwiftClient::new(profile).await.expect("client"))
}

#[tokio::test]
async fn test_swift_conformance() {
    let Some(client) = client().await else {
        return;
    };
    conformance::run_all(&client, &format!("osc-conf-{}", unique_suffix()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_swift_streamed_upload_of_unknown_length() {
    let Some(client) = client().await else {
        return;
    };
    let container = format!("osc-stream-{}", unique_suffix());
    client.container_create(&container).await.unwrap();

    // Several upload chunks, sent without a Content-Length
    let body: Vec<u8> = (0..300_000).map(|i| (i % 251) as u8).collect();
    let mut reader: &[u8] = &body;
    let info = client
        .object_upload(
            Some(&container),
            "big.bin",
            UploadSource::new(&mut reader).with_content_type("application/x-test"),
            Metadata::new(),
        )
        .await
        .unwrap();
    assert_eq!(info.size_bytes, Some(body.len() as u64));

    let mut downloaded = Vec::new();
    client
        .object_download(Some(&container), "big.bin", &mut downloaded)
        .await
        .unwrap();
    assert_eq!(Md5::digest(&downloaded), Md5::digest(&body));

    let head = client.object_info(Some(&container), "big.bin").await.unwrap();
    assert_eq!(head.content_type.as_deref(), Some("application/x-test"));

    client.container_delete(&container, true).await.unwrap();
}

#[tokio::test]
async fn test_swift_replace_metadata_keeps_content_type() {
    let Some(client) = client().await else {
        return;
    };
    let container = format!("osc-meta-{}", unique_suffix());
    client.container_create(&container).await.unwrap();

    let mut reader: &[u8] = b"{}";
    client
        .object_upload(
            Some(&container),
            "dir/with space.json",
            UploadSource::new(&mut reader)
                .with_length(2)
                .with_content_type("application/json"),
            Metadata::new(),
        )
        .await
        .unwrap();

    client
        .object_set_metadata_key(Some(&container), "dir/with space.json", "Stage", "final")
        .await
        .unwrap();

    let info = client
        .object_info(Some(&container), "dir/with space.json")
        .await
        .unwrap();
    assert_eq!(info.content_type.as_deref(), Some("application/json"));
    assert_eq!(
        info.metadata.unwrap_or_default().get("stage").map(String::as_str),
        Some("final")
    );

    client.container_delete(&container, true).await.unwrap();
}

#[tokio::test]
async fn test_swift_missing_container_is_not_found() {
    let Some(client) = client().await else {
        return;
    };
    let container = format!("osc-absent-{}", unique_suffix());

    let err = client.container_info(&container).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = client.object_info(Some(&container), "x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    client.container_delete(&container, true).await.unwrap();
}
