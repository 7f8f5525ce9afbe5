//! ObjectStorageClient trait definition
//!
//! This trait is the uniform contract every provider backend implements.
//! Backends supply the primitive operations (one provider round-trip each);
//! the compound operations (pagination, metadata read-modify-write, listing
//! enrichment, force delete) are provided methods so every backend shares the
//! same semantics. A backend may override a provided method when its provider
//! has a native equivalent.

use std::path::Path;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{BatchReport, Error, ItemFailure, Result};
use crate::metadata::{self, Metadata, MetadataLimits};
use crate::path::{object_path, validate_container_name};

/// Default cap on concurrent per-object metadata fetches during listing
pub const DEFAULT_METADATA_CONCURRENCY: usize = 8;

/// Snapshot of a container (bucket)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container name, unique per provider account
    pub name: String,

    /// Creation timestamp, when the provider reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<Timestamp>,

    /// Region the container lives in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl ContainerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation_date: None,
            region: None,
        }
    }
}

/// Snapshot of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key, unique within its container
    pub name: String,

    /// Size in bytes, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// Opaque content fingerprint, without surrounding quotes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// MIME content type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Last modified timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// User metadata; `None` when the call that produced this snapshot
    /// did not fetch it (plain listings)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ObjectInfo {
    /// Create a new ObjectInfo with a known size
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes: Some(size),
            etag: None,
            content_type: None,
            last_modified: None,
            metadata: None,
        }
    }

    /// Strip the quotes providers put around ETags
    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.trim_matches('"').to_string());
        self
    }
}

/// A common-prefix grouping produced by delimiter listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdirInfo {
    pub prefix: String,
}

/// One entry of an object listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ListingEntry {
    Object(ObjectInfo),
    Subdir(SubdirInfo),
}

impl ListingEntry {
    /// Object key or subdirectory prefix
    pub fn name(&self) -> &str {
        match self {
            ListingEntry::Object(o) => &o.name,
            ListingEntry::Subdir(s) => &s.prefix,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectInfo> {
        match self {
            ListingEntry::Object(o) => Some(o),
            ListingEntry::Subdir(_) => None,
        }
    }

    pub fn is_subdir(&self) -> bool {
        matches!(self, ListingEntry::Subdir(_))
    }
}

/// Options for object listing
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Only list keys starting with this prefix
    pub prefix: Option<String>,

    /// Group keys sharing a prefix up to this delimiter into subdirectories
    pub delimiter: Option<String>,

    /// Enrich each object with a metadata fetch (one request per object)
    pub fetch_metadata: bool,

    /// Page size hint passed to the provider
    pub page_size: Option<i32>,

    /// Maximum in-flight metadata fetches when `fetch_metadata` is set
    pub metadata_concurrency: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            delimiter: None,
            fetch_metadata: false,
            page_size: None,
            metadata_concurrency: DEFAULT_METADATA_CONCURRENCY,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn fetch_metadata(mut self, fetch: bool) -> Self {
        self.fetch_metadata = fetch;
        self
    }

    pub fn page_size(mut self, size: i32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn metadata_concurrency(mut self, n: usize) -> Self {
        self.metadata_concurrency = n.max(1);
        self
    }
}

/// One page of a paginated provider listing
#[derive(Debug, Clone)]
pub struct ListPage<T> {
    pub items: Vec<T>,

    /// Continuation token; `None` on the last page
    pub next_token: Option<String>,
}

impl<T> Default for ListPage<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_token: None,
        }
    }
}

/// A fully materialized object listing
#[derive(Debug, Default)]
pub struct Listing {
    /// Entries in provider order
    pub entries: Vec<ListingEntry>,

    /// Objects whose metadata enrichment failed; their entries are kept
    /// without metadata
    pub failures: Vec<ItemFailure>,
}

impl Listing {
    pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.entries.iter().filter_map(ListingEntry::as_object)
    }

    pub fn subdirs(&self) -> impl Iterator<Item = &SubdirInfo> {
        self.entries.iter().filter_map(|e| match e {
            ListingEntry::Subdir(s) => Some(s),
            ListingEntry::Object(_) => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Readable upload source
///
/// `content_length` is a hint: when `None` the backend streams the source in
/// bounded chunks until end of stream.
pub struct UploadSource<'a> {
    pub reader: &'a mut (dyn AsyncRead + Send + Unpin),
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

impl<'a> UploadSource<'a> {
    /// Source of unknown length
    pub fn new(reader: &'a mut (dyn AsyncRead + Send + Unpin)) -> Self {
        Self {
            reader,
            content_length: None,
            content_type: None,
        }
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Backend capability information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Containers may hold object versions that a force delete must drain
    pub versioning: bool,

    /// Metadata can be patched without rewriting the object
    pub native_metadata_patch: bool,

    /// Sources of unknown length are uploaded in parts
    pub multipart_upload: bool,
}

enum PageCursor {
    Start,
    Next(String),
    Done,
}

/// Uniform object storage contract
///
/// Every operation that addresses a container takes `container: Option<&str>`:
/// `Some` wins, `None` falls back to the container selected with
/// [`use_container`](Self::use_container). Selecting a default needs
/// `&mut self`, so a client shared between tasks cannot have it changed under
/// it; concurrent callers should pass container names explicitly.
#[async_trait]
pub trait ObjectStorageClient: Send + Sync {
    /// Backend identifier, e.g. "s3"
    fn name(&self) -> &str;

    /// Currently selected default container
    fn default_container(&self) -> Option<&str>;

    /// Select the default container for calls that pass `None`
    fn use_container(&mut self, container: &str);

    /// Provider limits on user metadata
    fn metadata_limits(&self) -> MetadataLimits {
        MetadataLimits::default()
    }

    /// Resolve an explicit container name or fall back to the default
    fn container<'a>(&'a self, explicit: Option<&'a str>) -> Result<&'a str> {
        let name = explicit.or(self.default_container()).ok_or_else(|| {
            Error::Validation("No container given and no default container selected".into())
        })?;
        validate_container_name(name)?;
        Ok(name)
    }

    /// Display path of an object: `/container/object`
    fn object_path(&self, container: Option<&str>, object: &str) -> String {
        object_path(container.or(self.default_container()), object)
    }

    /// Get backend capabilities
    async fn capabilities(&self) -> Result<Capabilities>;

    // Containers

    /// Create a container
    ///
    /// Returns `Ok(false)` when the caller already owns a container with this
    /// name and `Err(AlreadyExists)` when another owner holds it.
    async fn container_create(&self, name: &str) -> Result<bool>;

    /// Fetch one page of containers
    async fn container_list_page(
        &self,
        prefix: Option<&str>,
        token: Option<String>,
    ) -> Result<ListPage<ContainerInfo>>;

    /// Fetch existence and details of one container
    async fn container_info(&self, name: &str) -> Result<ContainerInfo>;

    /// Delete an empty container
    ///
    /// Fails with `NotEmpty` if objects remain; an absent container is
    /// success.
    async fn container_delete_empty(&self, name: &str) -> Result<()>;

    /// List all containers, following pagination until exhausted
    async fn container_list(&self, prefix: Option<&str>) -> Result<Vec<ContainerInfo>> {
        let mut containers = Vec::new();
        let mut token = None;
        loop {
            let page = self.container_list_page(prefix, token).await?;
            containers.extend(page.items);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(containers)
    }

    /// Delete every object in a container, without stopping at failures
    ///
    /// The report lists each deleted key and each key that could not be
    /// deleted. Backends with batch delete or versioning override this.
    async fn container_drain(&self, name: &str) -> Result<BatchReport> {
        let listing = self.object_list(Some(name), ListOptions::default()).await?;
        let mut report = BatchReport::new(format!("drain container {name}"));
        for object in listing.objects() {
            match self.object_delete(Some(name), &object.name).await {
                Ok(()) => report.record_success(&object.name),
                Err(e) => report.record_failure(&object.name, e),
            }
        }
        Ok(report)
    }

    /// Delete a container
    ///
    /// Without `force` a non-empty container fails with `NotEmpty`. With
    /// `force` all objects are drained first; if any object cannot be deleted
    /// the container is kept and `Error::Partial` carries the report.
    /// Deleting an absent container succeeds.
    async fn container_delete(&self, name: &str, force: bool) -> Result<()> {
        validate_container_name(name)?;

        if force {
            match self.container_drain(name).await {
                Ok(report) => {
                    let report = report.into_result()?;
                    tracing::debug!(
                        container = name,
                        deleted = report.succeeded.len(),
                        "Drained container"
                    );
                }
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            }
        }

        self.container_delete_empty(name).await
    }

    // Objects

    /// Fetch object details and metadata without downloading the body
    async fn object_info(&self, container: Option<&str>, name: &str) -> Result<ObjectInfo>;

    /// Replace the whole metadata set of an existing object
    async fn object_replace_metadata(
        &self,
        container: Option<&str>,
        name: &str,
        metadata: Metadata,
    ) -> Result<()>;

    /// Set one metadata key, preserving the others
    ///
    /// Implemented as read-modify-write over `object_replace_metadata`. Not
    /// atomic: with concurrent writers on the same object the last write
    /// wins. Callers that need atomicity must serialize writes per object.
    async fn object_set_metadata_key(
        &self,
        container: Option<&str>,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let key = metadata::normalize_key(key);
        metadata::validate_key(&key)?;
        metadata::validate_value(&key, value)?;

        let info = self.object_info(container, name).await?;
        let mut merged = info.metadata.unwrap_or_default();
        merged.insert(key, value.to_string());

        self.object_replace_metadata(container, name, merged).await
    }

    /// Remove one metadata key and return the resulting metadata
    ///
    /// Removing an absent key is a no-op. Same read-modify-write caveat as
    /// [`object_set_metadata_key`](Self::object_set_metadata_key).
    async fn object_delete_metadata_key(
        &self,
        container: Option<&str>,
        name: &str,
        key: &str,
    ) -> Result<Metadata> {
        let key = metadata::normalize_key(key);
        let info = self.object_info(container, name).await?;
        let mut remaining = info.metadata.unwrap_or_default();

        if remaining.remove(&key).is_none() {
            return Ok(remaining);
        }

        self.object_replace_metadata(container, name, remaining.clone())
            .await?;
        Ok(remaining)
    }

    /// Stream a source into an object
    async fn object_upload(
        &self,
        container: Option<&str>,
        name: &str,
        source: UploadSource<'_>,
        metadata: Metadata,
    ) -> Result<ObjectInfo>;

    /// Upload a local file
    async fn upload_file(
        &self,
        container: Option<&str>,
        name: &str,
        path: &Path,
        metadata: Metadata,
    ) -> Result<ObjectInfo> {
        let mut file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let source = UploadSource::new(&mut file).with_length(length);
        self.object_upload(container, name, source, metadata).await
    }

    /// Stream an object body into a sink, returning the bytes written
    ///
    /// The sink is flushed before returning; a failed read or write is
    /// returned as an error, never as a short success.
    async fn object_download(
        &self,
        container: Option<&str>,
        name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64>;

    /// Fetch one page of an object listing from a resolved container
    async fn object_list_page(
        &self,
        container: &str,
        options: &ListOptions,
        token: Option<String>,
    ) -> Result<ListPage<ListingEntry>>;

    /// List objects, following pagination until exhausted
    ///
    /// With `fetch_metadata` every object costs one extra request. The
    /// fetches run at most `metadata_concurrency` at a time and results keep
    /// listing order. Objects whose fetch fails are reported in
    /// `Listing::failures` and kept without metadata.
    async fn object_list(&self, container: Option<&str>, options: ListOptions) -> Result<Listing> {
        let container = self.container(container)?;

        let mut entries = Vec::new();
        let mut token = None;
        loop {
            let page = self.object_list_page(container, &options, token).await?;
            entries.extend(page.items);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        let mut listing = Listing {
            entries,
            failures: Vec::new(),
        };

        if !options.fetch_metadata {
            return Ok(listing);
        }

        // Owned names keep the fan-out future free of borrows into `listing`
        let names: Vec<Option<String>> = listing
            .entries
            .iter()
            .map(|entry| match entry {
                ListingEntry::Object(o) => Some(o.name.clone()),
                ListingEntry::Subdir(_) => None,
            })
            .collect();

        let fetched: Vec<Option<Result<ObjectInfo>>> = stream::iter(names)
            .map(|name| async move {
                match name {
                    Some(name) => Some(self.object_info(Some(container), &name).await),
                    None => None,
                }
            })
            .buffered(options.metadata_concurrency.max(1))
            .collect()
            .await;

        for (entry, result) in listing.entries.iter_mut().zip(fetched) {
            match (entry, result) {
                (ListingEntry::Object(object), Some(Ok(info))) => *object = info,
                (ListingEntry::Object(object), Some(Err(e))) => {
                    tracing::warn!(container, object = %object.name, error = %e, "Metadata fetch failed");
                    listing.failures.push(ItemFailure {
                        name: object.name.clone(),
                        error: e,
                    });
                }
                _ => {}
            }
        }

        Ok(listing)
    }

    /// Lazy listing that fetches pages on demand
    ///
    /// Each call starts again from the first page. Entries are never
    /// enriched with metadata.
    fn object_list_stream<'a>(
        &'a self,
        container: &'a str,
        options: ListOptions,
    ) -> BoxStream<'a, Result<ListingEntry>> {
        stream::try_unfold(
            (PageCursor::Start, options),
            move |(cursor, options)| async move {
                let token = match cursor {
                    PageCursor::Start => None,
                    PageCursor::Next(token) => Some(token),
                    PageCursor::Done => return Ok(None),
                };
                let page = self.object_list_page(container, &options, token).await?;
                let cursor = match page.next_token {
                    Some(next) => PageCursor::Next(next),
                    None => PageCursor::Done,
                };
                let items = stream::iter(page.items.into_iter().map(Ok::<_, Error>));
                Ok::<_, Error>(Some((items, (cursor, options))))
            },
        )
        .try_flatten()
        .boxed()
    }

    /// Delete an object; deleting an absent object succeeds
    async fn object_delete(&self, container: Option<&str>, name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_info_with_etag_strips_quotes() {
        let info = ObjectInfo::new("test.txt", 1024).with_etag("\"abc123\"");
        assert_eq!(info.name, "test.txt");
        assert_eq!(info.size_bytes, Some(1024));
        assert_eq!(info.etag.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_listing_entry_serialization() {
        let entry = ListingEntry::Subdir(SubdirInfo {
            prefix: "a/".to_string(),
        });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "subdir");
        assert_eq!(json["prefix"], "a/");

        let entry = ListingEntry::Object(ObjectInfo::new("a/x", 3));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["size_bytes"], 3);
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_list_options_builder() {
        let options = ListOptions::new()
            .prefix("logs/")
            .delimiter("/")
            .fetch_metadata(true)
            .metadata_concurrency(0);
        assert_eq!(options.prefix.as_deref(), Some("logs/"));
        assert_eq!(options.delimiter.as_deref(), Some("/"));
        assert!(options.fetch_metadata);
        assert_eq!(options.metadata_concurrency, 1);
    }

    #[test]
    fn test_listing_partitions_entries() {
        let listing = Listing {
            entries: vec![
                ListingEntry::Subdir(SubdirInfo {
                    prefix: "a/".into(),
                }),
                ListingEntry::Object(ObjectInfo::new("top.txt", 1)),
            ],
            failures: Vec::new(),
        };
        assert_eq!(listing.objects().count(), 1);
        assert_eq!(listing.subdirs().count(), 1);
        assert!(listing.is_complete());
    }
}
