//! ID-indexed backend speaking the Appwrite storage REST API.
//!
//! Objects live under server-generated IDs and the filename is metadata, so
//! every name-addressed operation starts with a list call filtered on the
//! name. Replace is a delete-then-create sequence with no transaction around
//! it; a per-name lock keeps sequences for the same name from interleaving
//! within this process.

use crate::storage::{AccessUrl, FileStore, NameLocks, StoreError, StoredFile, UpsertReceipt, UrlExpiry};
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{
    StatusCode, multipart,
    header::{HeaderMap, HeaderValue},
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

pub struct AppwriteStore {
    client: reqwest::Client,
    /// Endpoint with any trailing slash removed, e.g. `https://host/v1`
    endpoint: String,
    project_id: String,
    bucket_id: String,
    page_size: u32,
    locks: NameLocks,
}

/// File document as returned by the Appwrite API. Fields we don't use are
/// ignored on deserialization.
#[derive(Debug, Deserialize)]
struct FileDocument {
    #[serde(rename = "$id")]
    id: String,
    name: String,
    #[serde(rename = "sizeOriginal")]
    size_original: u64,
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "$createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "$updatedAt")]
    updated_at: DateTime<Utc>,
}

impl FileDocument {
    fn into_stored(self) -> StoredFile {
        StoredFile {
            name: self.name,
            backend_id: Some(self.id),
            size: self.size_original,
            mime_type: self.mime_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    files: Vec<FileDocument>,
}

#[derive(Debug, Deserialize)]
struct AppwriteError {
    message: String,
}

/// Outcome of removing an object by ID. Absence is success, not an error:
/// the replace sequence treats "already gone" as nothing left to delete.
enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// Appwrite query strings in the modern JSON form, passed as repeated
/// `queries[]` parameters.
fn equal_name_query(name: &str) -> String {
    json!({ "method": "equal", "attribute": "name", "values": [name] }).to_string()
}

fn limit_query(limit: u32) -> String {
    json!({ "method": "limit", "values": [limit] }).to_string()
}

async fn error_from_response(response: reqwest::Response) -> StoreError {
    let status = response.status();
    let message = match response.json::<AppwriteError>().await {
        Ok(body) => body.message,
        Err(_) => format!("HTTP {status}"),
    };
    StoreError::Backend { message }
}

impl AppwriteStore {
    pub fn new(
        endpoint: Url,
        project_id: String,
        api_key: String,
        bucket_id: String,
        timeout: Duration,
        page_size: u32,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-appwrite-project",
            HeaderValue::from_str(&project_id).context("storage project_id is not a valid header value")?,
        );
        headers.insert(
            "x-appwrite-key",
            HeaderValue::from_str(&api_key).context("storage api_key is not a valid header value")?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create storage HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            project_id,
            bucket_id,
            page_size,
            locks: NameLocks::new(),
        })
    }

    fn files_url(&self) -> String {
        format!("{}/storage/buckets/{}/files", self.endpoint, self.bucket_id)
    }

    /// Resolve a name to its backing document via a filtered list call.
    async fn find_by_name(&self, name: &str) -> Result<Option<FileDocument>, StoreError> {
        let response = self
            .client
            .get(self.files_url())
            .query(&[("queries[]", equal_name_query(name))])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let list: FileList = response.json().await?;
        Ok(list.files.into_iter().next())
    }

    async fn create(&self, name: &str, bytes: Bytes, content_type: &str) -> Result<FileDocument, StoreError> {
        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name(name.to_string())
            .mime_str(content_type)
            .map_err(|err| StoreError::Backend {
                message: format!("invalid content type '{content_type}': {err}"),
            })?;
        let form = multipart::Form::new().text("fileId", "unique()").part("file", part);

        let response = self.client.post(self.files_url()).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn delete_by_id(&self, id: &str) -> Result<DeleteOutcome, StoreError> {
        let response = self.client.delete(format!("{}/{id}", self.files_url())).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(DeleteOutcome::Deleted)
        } else if status == StatusCode::NOT_FOUND {
            Ok(DeleteOutcome::AlreadyAbsent)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

#[async_trait]
impl FileStore for AppwriteStore {
    async fn list(&self) -> Result<Vec<StoredFile>, StoreError> {
        let response = self
            .client
            .get(self.files_url())
            .query(&[("queries[]", limit_query(self.page_size))])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let list: FileList = response.json().await?;
        Ok(list.files.into_iter().map(FileDocument::into_stored).collect())
    }

    async fn resolve(&self, name: &str) -> Result<Option<StoredFile>, StoreError> {
        Ok(self.find_by_name(name).await?.map(FileDocument::into_stored))
    }

    async fn upsert(&self, name: &str, bytes: Bytes, content_type: &str, replace: bool) -> Result<UpsertReceipt, StoreError> {
        let _guard = self.locks.acquire(name).await;

        match self.find_by_name(name).await? {
            Some(_) if !replace => Err(StoreError::AlreadyExists { name: name.to_string() }),
            Some(existing) => {
                // The old object goes first so the bucket never holds two
                // objects under one name. Already-absent is fine; any other
                // delete failure aborts before anything is written.
                self.delete_by_id(&existing.id).await?;

                let created = self
                    .create(name, bytes, content_type)
                    .await
                    .map_err(|err| StoreError::ReplaceInterrupted {
                        name: name.to_string(),
                        message: err.to_string(),
                    })?;
                Ok(UpsertReceipt {
                    name: name.to_string(),
                    backend_id: Some(created.id),
                    replaced: true,
                })
            }
            None => {
                let created = self.create(name, bytes, content_type).await?;
                Ok(UpsertReceipt {
                    name: name.to_string(),
                    backend_id: Some(created.id),
                    replaced: false,
                })
            }
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let _guard = self.locks.acquire(name).await;

        let existing = self
            .find_by_name(name)
            .await?
            .ok_or_else(|| StoreError::NotFound { name: name.to_string() })?;

        // Gone between the resolve and the delete still means gone.
        self.delete_by_id(&existing.id).await?;
        Ok(())
    }

    async fn access_url(&self, name: &str, _expires_in: u64) -> Result<AccessUrl, StoreError> {
        let existing = self
            .find_by_name(name)
            .await?
            .ok_or_else(|| StoreError::NotFound { name: name.to_string() })?;

        // Download links are not signed here. The link keeps working as long
        // as bucket permissions allow it, whatever expiry was requested.
        let raw = format!(
            "{}/storage/buckets/{}/files/{}/download?project={}",
            self.endpoint, self.bucket_id, existing.id, self.project_id
        );
        let url = Url::parse(&raw).map_err(|err| StoreError::Backend {
            message: format!("constructed an invalid download URL: {err}"),
        })?;
        Ok(AccessUrl {
            url,
            expiry: UrlExpiry::Advisory,
        })
    }
}
