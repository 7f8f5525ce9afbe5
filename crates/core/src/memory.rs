//! In-memory storage backend
//!
//! A complete [`ObjectStorageClient`] over a process-local store. Several
//! clients can share one [`MemoryStore`] under different owner identities,
//! which makes the "already owned by you" and "taken by someone else" create
//! outcomes observable. The listing page size is configurable so pagination
//! can be exercised with a handful of objects.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use jiff::Timestamp;
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{self, Metadata, MetadataLimits};
use crate::path::{validate_container_name, validate_object_name};
use crate::traits::{
    Capabilities, ContainerInfo, ListOptions, ListPage, ListingEntry, ObjectInfo,
    ObjectStorageClient, SubdirInfo, UploadSource,
};

/// Owner identity of clients built with [`MemoryClient::new`]
pub const DEFAULT_OWNER: &str = "default";

/// Default number of entries per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
struct StoredObject {
    body: Arc<Vec<u8>>,
    etag: String,
    content_type: String,
    last_modified: Timestamp,
    metadata: Metadata,
}

impl StoredObject {
    fn info(&self, name: &str, with_metadata: bool) -> ObjectInfo {
        ObjectInfo {
            name: name.to_string(),
            size_bytes: Some(self.body.len() as u64),
            etag: Some(self.etag.clone()),
            content_type: with_metadata.then(|| self.content_type.clone()),
            last_modified: Some(self.last_modified),
            metadata: with_metadata.then(|| self.metadata.clone()),
        }
    }
}

#[derive(Debug)]
struct StoredContainer {
    owner: String,
    created: Timestamp,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug, Default)]
struct StoreInner {
    containers: BTreeMap<String, StoredContainer>,
    faults: HashMap<(String, String), ErrorKind>,
}

/// Shared backing store for one or more [`MemoryClient`]s
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read, write or delete of one object fail with `kind`
    ///
    /// Uploads are not affected, so a test can create the object and then
    /// watch batch operations report it as failed.
    pub fn inject_fault(&self, container: &str, key: &str, kind: ErrorKind) {
        self.write()
            .faults
            .insert((container.to_string(), key.to_string()), kind);
    }

    /// Remove every injected fault
    pub fn clear_faults(&self) {
        self.write().faults.clear();
    }

    /// Number of containers currently stored, across all owners
    pub fn container_count(&self) -> usize {
        self.read().containers.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoreInner {
    fn check_fault(&self, container: &str, key: &str) -> Result<()> {
        match self.faults.get(&(container.to_string(), key.to_string())) {
            Some(kind) => Err(fault_error(*kind, &format!("{container}/{key}"))),
            None => Ok(()),
        }
    }

    /// Container held by `owner`; another owner's container is off limits
    fn owned_container(&self, name: &str, owner: &str) -> Result<&StoredContainer> {
        let container = self
            .containers
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Container not found: {name}")))?;
        if container.owner != owner {
            return Err(foreign_container(name));
        }
        Ok(container)
    }

    fn owned_container_mut(&mut self, name: &str, owner: &str) -> Result<&mut StoredContainer> {
        let container = self
            .containers
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("Container not found: {name}")))?;
        if container.owner != owner {
            return Err(foreign_container(name));
        }
        Ok(container)
    }
}

fn foreign_container(name: &str) -> Error {
    Error::PermissionDenied(format!("Container '{name}' is owned by another account"))
}

fn fault_error(kind: ErrorKind, target: &str) -> Error {
    let msg = format!("injected fault on {target}");
    match kind {
        ErrorKind::NotFound => Error::NotFound(msg),
        ErrorKind::AlreadyExists => Error::AlreadyExists(msg),
        ErrorKind::NotEmpty => Error::NotEmpty(msg),
        ErrorKind::PermissionDenied => Error::PermissionDenied(msg),
        ErrorKind::Transient => Error::Transient(msg),
        ErrorKind::Validation => Error::Validation(msg),
        ErrorKind::Unsupported => Error::Unsupported(msg),
        ErrorKind::Partial | ErrorKind::Other => Error::General(msg),
    }
}

/// Position after the last entry of a listing page
enum Cursor {
    Object(String),
    Subdir(String),
}

impl Cursor {
    fn after(entry: &ListingEntry) -> Self {
        match entry {
            ListingEntry::Object(o) => Cursor::Object(o.name.clone()),
            ListingEntry::Subdir(s) => Cursor::Subdir(s.prefix.clone()),
        }
    }

    fn encode(&self) -> String {
        match self {
            Cursor::Object(key) => format!("o:{key}"),
            Cursor::Subdir(prefix) => format!("d:{prefix}"),
        }
    }

    fn decode(token: &str) -> Result<Self> {
        match token.split_at_checked(2) {
            Some(("o:", key)) => Ok(Cursor::Object(key.to_string())),
            Some(("d:", prefix)) => Ok(Cursor::Subdir(prefix.to_string())),
            _ => Err(Error::Validation(format!(
                "Invalid continuation token '{token}'"
            ))),
        }
    }
}

/// In-memory implementation of ObjectStorageClient
#[derive(Debug, Clone)]
pub struct MemoryClient {
    store: MemoryStore,
    owner: String,
    region: Option<String>,
    page_size: usize,
    limits: MetadataLimits,
    container: Option<String>,
}

impl MemoryClient {
    /// Client over a fresh, private store
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), DEFAULT_OWNER)
    }

    /// Client over a shared store, acting as `owner`
    pub fn with_store(store: MemoryStore, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
            region: None,
            page_size: DEFAULT_PAGE_SIZE,
            limits: MetadataLimits::default(),
            container: None,
        }
    }

    /// Entries per listing page when the caller gives no page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_metadata_limits(mut self, limits: MetadataLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn page_size(&self, requested: Option<i32>) -> usize {
        requested
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(self.page_size)
    }

    fn checked_metadata(&self, metadata: Metadata) -> Result<Metadata> {
        let metadata = metadata::normalize(metadata);
        metadata::validate(&metadata, &self.limits)?;
        Ok(metadata)
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorageClient for MemoryClient {
    fn name(&self) -> &str {
        "memory"
    }

    fn default_container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    fn use_container(&mut self, container: &str) {
        self.container = Some(container.to_string());
    }

    fn metadata_limits(&self) -> MetadataLimits {
        self.limits
    }

    async fn capabilities(&self) -> Result<Capabilities> {
        Ok(Capabilities {
            versioning: false,
            native_metadata_patch: true,
            multipart_upload: false,
        })
    }

    async fn container_create(&self, name: &str) -> Result<bool> {
        validate_container_name(name)?;
        let mut store = self.store.write();

        if let Some(existing) = store.containers.get(name) {
            if existing.owner == self.owner {
                return Ok(false);
            }
            return Err(Error::AlreadyExists(format!(
                "Container '{name}' is owned by another account"
            )));
        }

        store.containers.insert(
            name.to_string(),
            StoredContainer {
                owner: self.owner.clone(),
                created: Timestamp::now(),
                objects: BTreeMap::new(),
            },
        );
        tracing::info!(container = name, "Created container");
        Ok(true)
    }

    async fn container_list_page(
        &self,
        prefix: Option<&str>,
        token: Option<String>,
    ) -> Result<ListPage<ContainerInfo>> {
        let prefix = prefix.unwrap_or("");
        let start = match token {
            Some(after) => Bound::Excluded(after),
            None => Bound::Included(prefix.to_string()),
        };

        let store = self.store.read();
        let mut matching = store
            .containers
            .range::<String, _>((start, Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix))
            .filter(|(_, c)| c.owner == self.owner)
            .map(|(name, c)| ContainerInfo {
                name: name.clone(),
                creation_date: Some(c.created),
                region: self.region.clone(),
            });

        let items: Vec<ContainerInfo> = matching.by_ref().take(self.page_size).collect();
        let next_token = match matching.next() {
            Some(_) => items.last().map(|c| c.name.clone()),
            None => None,
        };

        Ok(ListPage { items, next_token })
    }

    async fn container_info(&self, name: &str) -> Result<ContainerInfo> {
        validate_container_name(name)?;
        let store = self.store.read();
        let container = store.owned_container(name, &self.owner)?;
        Ok(ContainerInfo {
            name: name.to_string(),
            creation_date: Some(container.created),
            region: self.region.clone(),
        })
    }

    async fn container_delete_empty(&self, name: &str) -> Result<()> {
        validate_container_name(name)?;
        let mut store = self.store.write();

        let Some(container) = store.containers.get(name) else {
            tracing::debug!(container = name, "Container already absent");
            return Ok(());
        };
        if container.owner != self.owner {
            return Err(foreign_container(name));
        }
        if !container.objects.is_empty() {
            return Err(Error::NotEmpty(name.to_string()));
        }

        store.containers.remove(name);
        tracing::info!(container = name, "Deleted container");
        Ok(())
    }

    async fn object_info(&self, container: Option<&str>, name: &str) -> Result<ObjectInfo> {
        let container = self.container(container)?;
        validate_object_name(name)?;

        let store = self.store.read();
        store.check_fault(container, name)?;
        store
            .owned_container(container, &self.owner)?
            .objects
            .get(name)
            .map(|o| o.info(name, true))
            .ok_or_else(|| Error::NotFound(self.object_path(Some(container), name)))
    }

    async fn object_replace_metadata(
        &self,
        container: Option<&str>,
        name: &str,
        metadata: Metadata,
    ) -> Result<()> {
        let container = self.container(container)?;
        validate_object_name(name)?;
        let metadata = self.checked_metadata(metadata)?;

        let mut store = self.store.write();
        store.check_fault(container, name)?;
        let path = self.object_path(Some(container), name);
        let object = store
            .owned_container_mut(container, &self.owner)?
            .objects
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(path))?;

        object.metadata = metadata;
        object.last_modified = Timestamp::now();
        Ok(())
    }

    async fn object_upload(
        &self,
        container: Option<&str>,
        name: &str,
        mut source: UploadSource<'_>,
        metadata: Metadata,
    ) -> Result<ObjectInfo> {
        let container = self.container(container)?;
        validate_object_name(name)?;
        let metadata = self.checked_metadata(metadata)?;

        // Fail before reading the source when the container is missing
        self.store.read().owned_container(container, &self.owner)?;

        let mut body = Vec::new();
        source.reader.read_to_end(&mut body).await?;
        if let Some(expected) = source.content_length {
            if expected != body.len() as u64 {
                return Err(Error::Validation(format!(
                    "Source produced {} bytes, expected {expected}",
                    body.len()
                )));
            }
        }

        let object = StoredObject {
            etag: format!("{:x}", Md5::digest(&body)),
            body: Arc::new(body),
            content_type: source
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            last_modified: Timestamp::now(),
            metadata,
        };
        let info = object.info(name, true);

        self.store
            .write()
            .owned_container_mut(container, &self.owner)?
            .objects
            .insert(name.to_string(), object);

        tracing::debug!(container, object = name, size = info.size_bytes, "Uploaded object");
        Ok(info)
    }

    async fn object_download(
        &self,
        container: Option<&str>,
        name: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64> {
        let container = self.container(container)?;
        validate_object_name(name)?;

        let body = {
            let store = self.store.read();
            store.check_fault(container, name)?;
            store
                .owned_container(container, &self.owner)?
                .objects
                .get(name)
                .map(|o| Arc::clone(&o.body))
                .ok_or_else(|| Error::NotFound(self.object_path(Some(container), name)))?
        };

        sink.write_all(&body).await?;
        sink.flush().await?;
        Ok(body.len() as u64)
    }

    async fn object_list_page(
        &self,
        container: &str,
        options: &ListOptions,
        token: Option<String>,
    ) -> Result<ListPage<ListingEntry>> {
        validate_container_name(container)?;
        let page_size = self.page_size(options.page_size);
        let prefix = options.prefix.as_deref().unwrap_or("");
        let delimiter = options.delimiter.as_deref().filter(|d| !d.is_empty());
        let cursor = token.as_deref().map(Cursor::decode).transpose()?;

        let (start, skip_prefix) = match &cursor {
            None => (Bound::Included(prefix.to_string()), None),
            Some(Cursor::Object(key)) => (Bound::Excluded(key.clone()), None),
            Some(Cursor::Subdir(p)) => (Bound::Excluded(p.clone()), Some(p.as_str())),
        };

        let store = self.store.read();
        let objects = &store.owned_container(container, &self.owner)?.objects;

        let mut items: Vec<ListingEntry> = Vec::new();
        let mut next_token = None;
        let mut last_subdir: Option<String> = None;

        let keys = objects
            .range::<String, _>((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| !skip_prefix.is_some_and(|p| key.starts_with(p)));

        for (key, object) in keys {
            let subdir = delimiter.and_then(|d| {
                key[prefix.len()..]
                    .find(d)
                    .map(|i| key[..prefix.len() + i + d.len()].to_string())
            });

            let entry = match subdir {
                Some(subdir) if last_subdir.as_deref() == Some(subdir.as_str()) => continue,
                Some(subdir) => {
                    last_subdir = Some(subdir.clone());
                    ListingEntry::Subdir(SubdirInfo { prefix: subdir })
                }
                None => ListingEntry::Object(object.info(key, false)),
            };

            if items.len() == page_size {
                next_token = items.last().map(|last| Cursor::after(last).encode());
                break;
            }
            items.push(entry);
        }

        Ok(ListPage { items, next_token })
    }

    async fn object_delete(&self, container: Option<&str>, name: &str) -> Result<()> {
        let container = self.container(container)?;
        validate_object_name(name)?;

        let mut store = self.store.write();
        store.check_fault(container, name)?;
        let objects = &mut store.owned_container_mut(container, &self.owner)?.objects;
        if objects.remove(name).is_none() {
            tracing::debug!(container, object = name, "Object already absent");
        }
        Ok(())
    }
}
