//! Path-indexed backend speaking the Supabase storage REST API.
//!
//! The filename is the object key, so single-call operations map directly
//! onto the backend: no resolve step, no per-name locking. Uniqueness and
//! overwrite semantics are delegated to the backend through its `x-upsert`
//! header, and signed URLs carry a real, enforced expiry.

use crate::storage::{AccessUrl, FileStore, StoreError, StoredFile, UpsertReceipt, UrlExpiry};
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{
    StatusCode,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

pub struct SupabaseStore {
    client: reqwest::Client,
    /// Storage root without a trailing slash, e.g. `https://xyz.supabase.co/storage/v1`
    base: Url,
    bucket: String,
    page_size: u32,
}

/// Listing entry as returned by `POST /object/list/{bucket}`. Folders show up
/// with null timestamps and metadata and are skipped.
#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    size: u64,
    mimetype: Option<String>,
}

impl ObjectEntry {
    fn into_stored(self) -> Option<StoredFile> {
        let metadata = self.metadata?;
        Some(StoredFile {
            name: self.name,
            backend_id: None,
            size: metadata.size,
            mime_type: metadata.mimetype.unwrap_or_else(|| "application/octet-stream".to_string()),
            created_at: self.created_at?,
            updated_at: self.updated_at?,
        })
    }
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[derive(Debug, Deserialize)]
struct SupabaseError {
    #[serde(rename = "statusCode")]
    status_code: Option<serde_json::Value>,
    message: Option<String>,
}

impl SupabaseError {
    /// `statusCode` is a string in current storage-api releases and a number
    /// in older ones.
    fn code(&self) -> Option<String> {
        match self.status_code.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Map an error response for an operation targeting an existing object.
///
/// The backend wraps most object errors in HTTP 400 and carries the real
/// status in the body, so both levels are checked.
async fn object_error(name: &str, response: reqwest::Response) -> StoreError {
    let http_status = response.status();
    let body: Option<SupabaseError> = response.json().await.ok();
    let code = body.as_ref().and_then(SupabaseError::code);

    if http_status == StatusCode::NOT_FOUND || code.as_deref() == Some("404") {
        StoreError::NotFound { name: name.to_string() }
    } else if http_status == StatusCode::CONFLICT || code.as_deref() == Some("409") {
        StoreError::AlreadyExists { name: name.to_string() }
    } else {
        StoreError::Backend {
            message: body
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("HTTP {http_status}")),
        }
    }
}

/// Map an error response for an upload.
///
/// Only the duplicate case belongs to the caller here. A 404-shaped body on
/// an upload means the bucket (not the object) is missing, so it stays a
/// backend fault with its message intact.
async fn upsert_error(name: &str, response: reqwest::Response) -> StoreError {
    let http_status = response.status();
    let body: Option<SupabaseError> = response.json().await.ok();
    let code = body.as_ref().and_then(SupabaseError::code);

    if http_status == StatusCode::CONFLICT || code.as_deref() == Some("409") {
        StoreError::AlreadyExists { name: name.to_string() }
    } else {
        StoreError::Backend {
            message: body
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("HTTP {http_status}")),
        }
    }
}

async fn backend_error(response: reqwest::Response) -> StoreError {
    let status = response.status();
    let message = response
        .json::<SupabaseError>()
        .await
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| format!("HTTP {status}"));
    StoreError::Backend { message }
}

impl SupabaseStore {
    pub fn new(url: Url, service_key: String, bucket: String, timeout: Duration, page_size: u32) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .context("storage service_key is not a valid header value")?;
        headers.insert("authorization", bearer);
        headers.insert(
            "apikey",
            HeaderValue::from_str(&service_key).context("storage service_key is not a valid header value")?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create storage HTTP client")?;

        let base = Url::parse(&format!("{}/storage/v1", url.as_str().trim_end_matches('/')))
            .context("storage url cannot carry the storage path")?;

        Ok(Self {
            client,
            base,
            bucket,
            page_size,
        })
    }

    /// Build `{base}/object[/{action}]/{bucket}/{name}`.
    ///
    /// The name goes in as a single percent-encoded path segment, so reserved
    /// characters (`#`, `?`, `/`, `%`) cannot restructure the URL and the
    /// request stays addressed to that one object key. Names that would form
    /// a relative path segment on their own are refused outright.
    fn object_url(&self, action: Option<&str>, name: &str) -> Result<Url, StoreError> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(StoreError::InvalidName { name: name.to_string() });
        }
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| StoreError::Backend {
                message: "storage url cannot be a base".to_string(),
            })?;
            segments.push("object");
            if let Some(action) = action {
                segments.push(action);
            }
            segments.push(&self.bucket).push(name);
        }
        Ok(url)
    }

    async fn list_entries(&self, search: Option<&str>) -> Result<Vec<StoredFile>, StoreError> {
        let request = ListRequest {
            prefix: "",
            limit: self.page_size,
            offset: 0,
            sort_by: SortBy {
                column: "created_at",
                order: "desc",
            },
            search,
        };

        let response = self
            .client
            .post(format!("{}/object/list/{}", self.base, self.bucket))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }
        let entries: Vec<ObjectEntry> = response.json().await?;
        Ok(entries.into_iter().filter_map(ObjectEntry::into_stored).collect())
    }
}

#[async_trait]
impl FileStore for SupabaseStore {
    async fn list(&self) -> Result<Vec<StoredFile>, StoreError> {
        self.list_entries(None).await
    }

    async fn resolve(&self, name: &str) -> Result<Option<StoredFile>, StoreError> {
        // `search` is a substring filter, so the exact-name check stays here.
        let entries = self.list_entries(Some(name)).await?;
        Ok(entries.into_iter().find(|file| file.name == name))
    }

    async fn upsert(&self, name: &str, bytes: Bytes, content_type: &str, replace: bool) -> Result<UpsertReceipt, StoreError> {
        // The backend does not report prior state on upsert, so learn it
        // first when the caller asked to replace. Plain creates skip the
        // lookup; uniqueness is enforced natively. The lookup and the write
        // are separate calls: a concurrent create in between can misreport
        // `replaced`, though the write itself stays atomic via x-upsert.
        let replaced = if replace { self.resolve(name).await?.is_some() } else { false };

        let response = self
            .client
            .post(self.object_url(None, name)?)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", if replace { "true" } else { "false" })
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(upsert_error(name, response).await);
        }

        Ok(UpsertReceipt {
            name: name.to_string(),
            backend_id: None,
            replaced,
        })
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let response = self.client.delete(self.object_url(None, name)?).send().await?;
        if !response.status().is_success() {
            return Err(object_error(name, response).await);
        }
        Ok(())
    }

    async fn access_url(&self, name: &str, expires_in: u64) -> Result<AccessUrl, StoreError> {
        let response = self
            .client
            .post(self.object_url(Some("sign"), name)?)
            .json(&json!({ "expiresIn": expires_in }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(object_error(name, response).await);
        }
        let signed: SignResponse = response.json().await?;

        // signedURL is relative to the storage root, e.g.
        // `/object/sign/bucket/a.txt?token=...`
        let raw = format!("{}{}", self.base, signed.signed_url);
        let url = Url::parse(&raw).map_err(|err| StoreError::Backend {
            message: format!("backend returned an unusable signed URL: {err}"),
        })?;
        Ok(AccessUrl {
            url,
            expiry: UrlExpiry::Enforced,
        })
    }
}
