//! Swift client implementation
//!
//! Talks to the Swift object API with reqwest and implements the
//! ObjectStorageClient trait from osc-core. Every request carries the token
//! obtained when the client was built.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use jiff::Timestamp;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Body, Client, Method, RequestBuilder, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use osc_core::metadata;
use osc_core::path::validate_object_name;
use osc_core::{
    Capabilities, ContainerInfo, Error, ErrorKind, ListOptions, ListPage, ListingEntry, Metadata,
    MetadataLimits, ObjectInfo, ObjectStorageClient, Profile, Result, RetryConfig, UploadSource,
};

use crate::auth;
use crate::error::{classify, status_error, transport_error};
use crate::listing;

const AUTH_TOKEN: &str = "X-Auth-Token";

/// User metadata header prefix, as reqwest reports header names
const META_PREFIX: &str = "x-object-meta-";

/// Listing page size when the caller sets none
const PAGE_LIMIT: usize = 1000;

/// Largest page Swift serves by default
const MAX_PAGE_LIMIT: usize = 10_000;

/// Read size for upload bodies
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Chunks buffered between the source and the request body
const UPLOAD_QUEUE: usize = 4;

/// Characters escaped in object names; `/` stays as the separator
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters escaped in container names
const CONTAINER_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Swift client
pub struct SwiftClient {
    http: Client,
    storage_url: String,
    token: String,
    profile: Profile,
    retry: RetryConfig,
    container: Option<String>,
}

impl SwiftClient {
    /// Create a client from a profile, authenticating if needed
    ///
    /// The profile endpoint is the account storage URL, e.g.
    /// `https://swift.example.com/v1/AUTH_project`.
    pub async fn new(profile: Profile) -> Result<Self> {
        profile.validate()?;

        let storage_url = profile
            .endpoint
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| Error::Config(format!("Profile '{}' has no storage URL", profile.name)))?;

        let timeout = profile.timeout_config();
        let mut builder = Client::builder()
            .user_agent(concat!("osc/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_millis(timeout.connect_ms))
            .read_timeout(Duration::from_millis(timeout.read_ms));
        if let Some(ms) = timeout.operation_attempt_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("Cannot build HTTP client: {e}")))?;

        let token = auth::authenticate(&http, &profile.swift.clone().unwrap_or_default()).await?;

        tracing::debug!(
            profile = %profile.name,
            storage_url = %storage_url,
            "Created Swift client"
        );

        Ok(Self {
            http,
            storage_url,
            token,
            retry: profile.retry_config(),
            container: profile.container.clone(),
            profile,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn storage_url(&self) -> &str {
        &self.storage_url
    }

    fn container_url(&self, container: &str) -> String {
        format!(
            "{}/{}",
            self.storage_url,
            utf8_percent_encode(container, CONTAINER_NAME)
        )
    }

    fn object_url(&self, container: &str, name: &str) -> String {
        format!(
            "{}/{}",
            self.container_url(container),
            utf8_percent_encode(name, OBJECT_NAME)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTH_TOKEN, self.token.as_str())
    }

    /// Send a request, retrying transient failures with exponential backoff
    ///
    /// The response is returned whatever its status; requests whose body
    /// cannot be replayed are sent once.
    async fn send(&self, request: RequestBuilder, target: &str) -> Result<Response> {
        let max_attempts = self.retry.max_attempts.max(1);
        let max_backoff = Duration::from_millis(self.retry.max_backoff_ms);
        let mut backoff = Duration::from_millis(self.retry.initial_backoff_ms);
        let mut attempt = 1;

        loop {
            let Some(current) = request.try_clone() else {
                return request.send().await.map_err(|e| transport_error(e, target));
            };

            let outcome = current.send().await.map_err(|e| transport_error(e, target));
            let retryable = match &outcome {
                Ok(response) => classify(response.status()) == ErrorKind::Transient,
                Err(e) => e.is_transient(),
            };
            if !retryable || attempt >= max_attempts {
                return outcome;
            }

            tracing::debug!(target_path = target, attempt, ?backoff, "Retrying Swift request");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
            attempt += 1;
        }
    }

    fn checked_metadata(&self, metadata: Metadata) -> Result<Metadata> {
        let metadata = metadata::normalize(metadata);
        metadata::validate(&metadata, &self.metadata_limits())?;
        Ok(metadata)
    }
}

/// Body of a successful response
async fn read_body(response: Response, target: &str) -> Result<Bytes> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status, target));
    }
    response.bytes().await.map_err(|e| transport_error(e, target))
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `X-Object-Meta-*` headers for a metadata set
fn metadata_headers(metadata: &Metadata) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(metadata.len());
    for (key, value) in metadata {
        let name = HeaderName::from_bytes(format!("{META_PREFIX}{key}").as_bytes())
            .map_err(|_| Error::Validation(format!("Metadata key '{key}' is not a valid header")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::Validation(format!("Metadata value for '{key}' is not a valid header")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Object snapshot from HEAD response headers
fn object_info_from_headers(name: &str, headers: &HeaderMap) -> ObjectInfo {
    let mut info = ObjectInfo::new(name, 0);
    info.size_bytes = header_str(headers, header::CONTENT_LENGTH).and_then(|v| v.parse().ok());
    if let Some(etag) = header_str(headers, header::ETAG) {
        info = info.with_etag(etag);
    }
    info.content_type = header_str(headers, header::CONTENT_TYPE).map(str::to_string);
    info.last_modified = header_str(headers, header::LAST_MODIFIED).and_then(listing::parse_http_date);

    let metadata: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(META_PREFIX)?;
            Some((
                key.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            ))
        })
        .collect();
    info.metadata = Some(metadata::normalize(metadata));
    info
}

/// Feed a request body from `reader`, returning the number of bytes sent
///
/// A read error or a length mismatch is pushed into the body so the request
/// fails instead of storing a truncated object.
async fn pump(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    mut tx: mpsc::Sender<std::io::Result<Bytes>>,
    expected: Option<u64>,
    target: &str,
) -> Result<u64> {
    let mut sent = 0u64;
    loop {
        let mut chunk = vec![0u8; UPLOAD_CHUNK];
        let n = match reader.read(&mut chunk).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tx.send(Err(std::io::Error::new(e.kind(), e.to_string()))).await;
                return Err(e.into());
            }
        };
        sent += n as u64;

        let mismatch = match expected {
            Some(expected) => sent > expected || (n == 0 && sent != expected),
            None => false,
        };
        if mismatch {
            let _ = tx
                .send(Err(std::io::Error::other("source length mismatch")))
                .await;
            return Err(Error::Validation(format!(
                "{target}: source produced {sent} bytes, expected {}",
                expected.unwrap_or_default()
            )));
        }
        if n == 0 {
            return Ok(sent);
        }

        chunk.truncate(n);
        if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
            // The request already ended; its outcome is reported instead
            return Ok(sent);
        }
    }
}

#[async_trait]
impl ObjectStorageClient for SwiftClient {
    fn name(&self) -> &str {
        "swift"
    }

    fn default_container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    fn use_container(&mut self, container: &str) {
        self.container = Some(container.to_string());
    }

    fn metadata_limits(&self) -> MetadataLimits {
        MetadataLimits::SWIFT
    }

    async fn capabilities(&self) -> Result<Capabilities> {
        Ok(Capabilities {
            versioning: false,
            native_metadata_patch: true,
            multipart_upload: false,
        })
    }

    async fn container_create(&self, name: &str) -> Result<bool> {
        let name = self.container(Some(name))?;
        let response = self
            .send(self.request(Method::PUT, &self.container_url(name)), name)
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(container = name, "Created container");
                Ok(true)
            }
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
                tracing::debug!(container = name, "Container already exists");
                Ok(false)
            }
            status => Err(status_error(status, name)),
        }
    }

    async fn container_list_page(
        &self,
        prefix: Option<&str>,
        token: Option<String>,
    ) -> Result<ListPage<ContainerInfo>> {
        let mut query = vec![
            ("format", "json".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix.to_string()));
        }
        if let Some(marker) = token {
            query.push(("marker", marker));
        }

        let request = self.request(Method::GET, &self.storage_url).query(&query);
        let response = self.send(request, "list containers").await?;
        let body = read_body(response, "list containers").await?;
        listing::container_page(&body, PAGE_LIMIT)
    }

    async fn container_info(&self, name: &str) -> Result<ContainerInfo> {
        let name = self.container(Some(name))?;
        let response = self
            .send(self.request(Method::HEAD, &self.container_url(name)), name)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, name));
        }
        Ok(ContainerInfo::new(name))
    }

    async fn container_delete_empty(&self, name: &str) -> Result<()> {
        let name = self.container(Some(name))?;
        let response = self
            .send(self.request(Method::DELETE, &self.container_url(name)), name)
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(container = name, "Deleted container");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                tracing::debug!(container = name, "Container already absent");
                Ok(())
            }
            status => Err(status_error(status, name)),
        }
    }

    async fn object_info(&self, container: Option<&str>, name: &str) -> Result<ObjectInfo> {
        let container = self.container(container)?;
        validate_object_name(name)?;
        let path = self.object_path(Some(container), name);

        tracing::debug!(container, object = name, "HEAD");
        let response = self
            .send(self.request(Method::HEAD, &self.object_url(container, name)), &path)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &path));
        }
        Ok(object_info_from_headers(name, response.headers()))
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
        let path = self.object_path(Some(container), name);

        // POST drops every X-Object-Meta-* header it is not given
        tracing::debug!(container, object = name, keys = metadata.len(), "POST (replace metadata)");
        let request = self
            .request(Method::POST, &self.object_url(container, name))
            .headers(metadata_headers(&metadata)?);
        let response = self.send(request, &path).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &path));
        }
        Ok(())
    }

    async fn object_upload(
        &self,
        container: Option<&str>,
        name: &str,
        source: UploadSource<'_>,
        metadata: Metadata,
    ) -> Result<ObjectInfo> {
        let container = self.container(container)?;
        validate_object_name(name)?;
        let metadata = self.checked_metadata(metadata)?;
        let path = self.object_path(Some(container), name);

        let mut headers = metadata_headers(&metadata)?;
        if let Some(content_type) = &source.content_type {
            let value = HeaderValue::from_str(content_type).map_err(|_| {
                Error::Validation(format!("{path}: invalid content type '{content_type}'"))
            })?;
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Some(length) = source.content_length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }

        let (tx, rx) = mpsc::channel(UPLOAD_QUEUE);
        let request = self
            .request(Method::PUT, &self.object_url(container, name))
            .headers(headers)
            .body(Body::wrap_stream(rx));

        tracing::debug!(container, object = name, size = source.content_length, "PUT");
        let (response, sent) = tokio::join!(
            request.send(),
            pump(&mut *source.reader, tx, source.content_length, &path)
        );
        let sent = sent?;
        let response = response.map_err(|e| transport_error(e, &path))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &path));
        }

        let mut info = ObjectInfo::new(name, sent);
        if let Some(etag) = header_str(response.headers(), header::ETAG) {
            info = info.with_etag(etag);
        }
        info.content_type = source.content_type;
        info.last_modified = Some(Timestamp::now());
        info.metadata = Some(metadata);
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
        let path = self.object_path(Some(container), name);

        tracing::debug!(container, object = name, "GET");
        let mut response = self
            .send(self.request(Method::GET, &self.object_url(container, name)), &path)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &path));
        }

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(e, &path))?
        {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }

    async fn object_list_page(
        &self,
        container: &str,
        options: &ListOptions,
        token: Option<String>,
    ) -> Result<ListPage<ListingEntry>> {
        let container = self.container(Some(container))?;
        let limit = options
            .page_size
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n > 0)
            .unwrap_or(PAGE_LIMIT)
            .min(MAX_PAGE_LIMIT);

        let mut query = vec![
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(prefix) = &options.prefix {
            query.push(("prefix", prefix.clone()));
        }
        if let Some(delimiter) = &options.delimiter {
            query.push(("delimiter", delimiter.clone()));
        }
        if let Some(marker) = token {
            query.push(("marker", marker));
        }

        tracing::debug!(container, prefix = options.prefix.as_deref(), "GET (list objects)");
        let request = self
            .request(Method::GET, &self.container_url(container))
            .query(&query);
        let response = self.send(request, container).await?;
        let body = read_body(response, container).await?;
        listing::object_page(&body, limit)
    }

    async fn object_delete(&self, container: Option<&str>, name: &str) -> Result<()> {
        let container = self.container(container)?;
        validate_object_name(name)?;
        let path = self.object_path(Some(container), name);

        tracing::debug!(container, object = name, "DELETE");
        let response = self
            .send(self.request(Method::DELETE, &self.object_url(container, name)), &path)
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                // A 404 is also what a missing container gives
                self.container_info(container).await?;
                tracing::debug!(container, object = name, "Object already absent");
                Ok(())
            }
            status => Err(status_error(status, &path)),
        }
    }
}
