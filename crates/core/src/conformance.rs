//! Backend conformance checks
//!
//! Every backend must behave identically through [`ObjectStorageClient`].
//! These checks exercise the contract end to end and panic on the first
//! violation, so they are meant to be called from a backend's test suite.
//! Backend failures that are not themselves under test are returned as
//! errors.
//!
//! Each check creates the container it is given and force-deletes it when
//! done. Use a name no other test touches.

use std::collections::HashSet;

use futures::TryStreamExt;
use md5::{Digest, Md5};

use crate::error::{ErrorKind, Result};
use crate::metadata::Metadata;
use crate::traits::{ListOptions, ObjectInfo, ObjectStorageClient, UploadSource};

async fn put(
    client: &dyn ObjectStorageClient,
    container: &str,
    name: &str,
    body: &[u8],
    metadata: Metadata,
) -> Result<ObjectInfo> {
    let mut reader = body;
    let source = UploadSource::new(&mut reader).with_length(body.len() as u64);
    client
        .object_upload(Some(container), name, source, metadata)
        .await
}

async fn setup(client: &dyn ObjectStorageClient, container: &str) -> Result<()> {
    client.container_create(container).await?;
    Ok(())
}

async fn teardown(client: &dyn ObjectStorageClient, container: &str) -> Result<()> {
    client.container_delete(container, true).await
}

/// Run every single-client check, one container per check
pub async fn run_all(client: &dyn ObjectStorageClient, prefix: &str) -> Result<()> {
    object_delete_is_idempotent(client, &format!("{prefix}-del")).await?;
    container_delete_is_idempotent(client, &format!("{prefix}-rb")).await?;
    create_owned_container_returns_false(client, &format!("{prefix}-mb")).await?;
    upload_round_trip(client, &format!("{prefix}-rt")).await?;
    metadata_merge_and_delete(client, &format!("{prefix}-meta")).await?;
    metadata_is_validated(client, &format!("{prefix}-val")).await?;
    listing_is_complete_across_pages(client, &format!("{prefix}-page")).await?;
    delimiter_grouping(client, &format!("{prefix}-dir")).await?;
    force_delete(client, &format!("{prefix}-force")).await?;
    missing_object_is_not_found(client, &format!("{prefix}-404")).await?;
    Ok(())
}

/// Deleting an object twice succeeds both times
pub async fn object_delete_is_idempotent(
    client: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    setup(client, container).await?;
    put(client, container, "doomed.txt", b"bye", Metadata::new()).await?;

    client.object_delete(Some(container), "doomed.txt").await?;
    client.object_delete(Some(container), "doomed.txt").await?;
    client.object_delete(Some(container), "never-existed").await?;

    let err = client
        .object_info(Some(container), "doomed.txt")
        .await
        .expect_err("deleted object must be gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    teardown(client, container).await
}

/// Deleting an absent container succeeds, repeatedly
pub async fn container_delete_is_idempotent(
    client: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    setup(client, container).await?;

    client.container_delete(container, false).await?;
    client.container_delete(container, false).await?;
    client.container_delete(container, true).await?;

    let err = client
        .container_info(container)
        .await
        .expect_err("deleted container must be gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

/// Creating a container the caller already owns reports `false`
pub async fn create_owned_container_returns_false(
    client: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    assert!(client.container_create(container).await?, "first create");
    assert!(!client.container_create(container).await?, "second create");

    let listed = client.container_list(Some(container)).await?;
    assert!(listed.iter().any(|c| c.name == container));

    teardown(client, container).await
}

/// Creating a container another owner holds fails with `AlreadyExists`
pub async fn create_taken_name_is_already_exists(
    owner: &dyn ObjectStorageClient,
    other: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    setup(owner, container).await?;

    let err = other
        .container_create(container)
        .await
        .expect_err("name is taken");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    teardown(owner, container).await
}

/// Downloaded bytes match the upload; info reports size and MD5 ETag
pub async fn upload_round_trip(client: &dyn ObjectStorageClient, container: &str) -> Result<()> {
    setup(client, container).await?;

    let body: Vec<u8> = (0..64 * 1024u32).map(|i| (i % 251) as u8).collect();
    let md5 = format!("{:x}", Md5::digest(&body));

    let uploaded = put(client, container, "data/blob.bin", &body, Metadata::new()).await?;
    assert_eq!(uploaded.size_bytes, Some(body.len() as u64));

    let info = client.object_info(Some(container), "data/blob.bin").await?;
    assert_eq!(info.size_bytes, Some(body.len() as u64));
    assert_eq!(info.etag.as_deref(), Some(md5.as_str()));

    let mut downloaded = Vec::new();
    let written = client
        .object_download(Some(container), "data/blob.bin", &mut downloaded)
        .await?;
    assert_eq!(written, body.len() as u64);
    assert!(downloaded == body, "downloaded bytes differ from upload");

    teardown(client, container).await
}

/// Single-key set and delete preserve unrelated keys
pub async fn metadata_merge_and_delete(
    client: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    setup(client, container).await?;

    let mut metadata = Metadata::new();
    metadata.insert("myKey1".to_string(), "myValue1".to_string());
    put(client, container, "doc.txt", b"content", metadata).await?;

    let info = client.object_info(Some(container), "doc.txt").await?;
    let stored = info.metadata.unwrap_or_default();
    assert_eq!(stored.get("mykey1").map(String::as_str), Some("myValue1"));
    assert_eq!(stored.len(), 1);

    client
        .object_set_metadata_key(Some(container), "doc.txt", "MyKey2", "myValue2")
        .await?;
    let stored = client
        .object_info(Some(container), "doc.txt")
        .await?
        .metadata
        .unwrap_or_default();
    assert_eq!(stored.get("mykey1").map(String::as_str), Some("myValue1"));
    assert_eq!(stored.get("mykey2").map(String::as_str), Some("myValue2"));

    let remaining = client
        .object_delete_metadata_key(Some(container), "doc.txt", "mykey1")
        .await?;
    assert!(!remaining.contains_key("mykey1"));
    assert_eq!(remaining.get("mykey2").map(String::as_str), Some("myValue2"));

    let unchanged = client
        .object_delete_metadata_key(Some(container), "doc.txt", "absent")
        .await?;
    assert_eq!(unchanged, remaining);

    let mut replacement = Metadata::new();
    replacement.insert("only".to_string(), "this".to_string());
    client
        .object_replace_metadata(Some(container), "doc.txt", replacement.clone())
        .await?;
    let info = client.object_info(Some(container), "doc.txt").await?;
    assert_eq!(info.metadata, Some(replacement));

    let mut body = Vec::new();
    client
        .object_download(Some(container), "doc.txt", &mut body)
        .await?;
    assert_eq!(body, b"content");

    teardown(client, container).await
}

/// Invalid metadata is rejected with `Validation` and nothing is written
pub async fn metadata_is_validated(
    client: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    setup(client, container).await?;

    let mut metadata = Metadata::new();
    metadata.insert("bad key".to_string(), "v".to_string());
    let err = put(client, container, "rejected", b"x", metadata)
        .await
        .expect_err("invalid key must be rejected");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = client
        .object_info(Some(container), "rejected")
        .await
        .expect_err("rejected upload must not be stored");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut oversized = Metadata::new();
    oversized.insert(
        "big".to_string(),
        "x".repeat(client.metadata_limits().max_total_bytes + 1),
    );
    let err = put(client, container, "rejected", b"x", oversized)
        .await
        .expect_err("oversized metadata must be rejected");
    assert_eq!(err.kind(), ErrorKind::Validation);

    teardown(client, container).await
}

/// Paginated listings return every key exactly once
pub async fn listing_is_complete_across_pages(
    client: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    setup(client, container).await?;

    let names: Vec<String> = (0..7).map(|i| format!("item-{i:02}")).collect();
    for name in &names {
        put(client, container, name, name.as_bytes(), Metadata::new()).await?;
    }

    let options = ListOptions::new().page_size(2);
    let listing = client.object_list(Some(container), options.clone()).await?;
    let listed: Vec<&str> = listing.objects().map(|o| o.name.as_str()).collect();
    let unique: HashSet<&str> = listed.iter().copied().collect();
    assert_eq!(listed.len(), names.len(), "duplicates or gaps: {listed:?}");
    assert_eq!(unique.len(), names.len());
    for name in &names {
        assert!(unique.contains(name.as_str()), "missing {name}");
    }

    let stream = || client.object_list_stream(container, options.clone());
    let streamed: Vec<_> = stream().try_collect().await?;
    assert_eq!(streamed, listing.entries);
    let restarted: Vec<_> = stream().try_collect().await?;
    assert_eq!(restarted, streamed, "stream must restart from the first page");

    let enriched = client
        .object_list(
            Some(container),
            ListOptions::new().page_size(3).fetch_metadata(true),
        )
        .await?;
    assert!(enriched.is_complete());
    assert!(enriched.objects().all(|o| o.metadata.is_some()));
    let order: Vec<&str> = enriched.objects().map(|o| o.name.as_str()).collect();
    assert_eq!(order, listed);

    teardown(client, container).await
}

/// `a/x`, `a/y`, `b/z` with delimiter `/` give two subdirs and no objects
pub async fn delimiter_grouping(client: &dyn ObjectStorageClient, container: &str) -> Result<()> {
    setup(client, container).await?;

    for name in ["a/x", "a/y", "b/z"] {
        put(client, container, name, b"-", Metadata::new()).await?;
    }

    let listing = client
        .object_list(Some(container), ListOptions::new().delimiter("/"))
        .await?;
    let subdirs: Vec<&str> = listing.subdirs().map(|s| s.prefix.as_str()).collect();
    assert_eq!(subdirs, ["a/", "b/"]);
    assert_eq!(listing.objects().count(), 0);

    let listing = client
        .object_list(
            Some(container),
            ListOptions::new().prefix("a/").delimiter("/"),
        )
        .await?;
    let objects: Vec<&str> = listing.objects().map(|o| o.name.as_str()).collect();
    assert_eq!(objects, ["a/x", "a/y"]);
    assert_eq!(listing.subdirs().count(), 0);

    teardown(client, container).await
}

/// A non-empty container needs `force`; force drains and deletes it
pub async fn force_delete(client: &dyn ObjectStorageClient, container: &str) -> Result<()> {
    setup(client, container).await?;
    for name in ["one", "two/three", "two/four"] {
        put(client, container, name, b"x", Metadata::new()).await?;
    }

    let err = client
        .container_delete(container, false)
        .await
        .expect_err("non-empty container must not be deleted");
    assert_eq!(err.kind(), ErrorKind::NotEmpty);
    assert!(client.container_info(container).await.is_ok());
    let listing = client.object_list(Some(container), ListOptions::new()).await?;
    assert_eq!(listing.objects().count(), 3, "refused delete must keep objects");

    client.container_delete(container, true).await?;
    let err = client
        .container_info(container)
        .await
        .expect_err("force-deleted container must be gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    match client.object_list(Some(container), ListOptions::new()).await {
        Ok(listing) => assert_eq!(listing.objects().count(), 0, "objects survived"),
        Err(e) => assert_eq!(e.kind(), ErrorKind::NotFound),
    }
    Ok(())
}

/// Another owner can neither read nor destroy a container's objects
pub async fn foreign_container_is_protected(
    owner: &dyn ObjectStorageClient,
    other: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    setup(owner, container).await?;
    for name in ["a", "b", "c"] {
        put(owner, container, name, b"owned", Metadata::new()).await?;
    }

    let err = other
        .container_delete(container, true)
        .await
        .expect_err("foreign force delete must fail");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = other
        .object_delete(Some(container), "a")
        .await
        .expect_err("foreign object delete must fail");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let err = other
        .object_info(Some(container), "a")
        .await
        .expect_err("foreign object info must fail");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let listing = owner.object_list(Some(container), ListOptions::new()).await?;
    assert_eq!(listing.objects().count(), 3, "foreign caller destroyed objects");

    teardown(owner, container).await
}

/// Info and download of a missing object fail with `NotFound`
pub async fn missing_object_is_not_found(
    client: &dyn ObjectStorageClient,
    container: &str,
) -> Result<()> {
    setup(client, container).await?;

    let err = client
        .object_info(Some(container), "missing")
        .await
        .expect_err("info of missing object");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut sink = Vec::new();
    let err = client
        .object_download(Some(container), "missing", &mut sink)
        .await
        .expect_err("download of missing object");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(sink.is_empty());

    let err = client
        .container_info(&format!("{container}-absent"))
        .await
        .expect_err("info of missing container");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    teardown(client, container).await
}
