//! Storage backends and the name-addressed contract they implement.
//!
//! The HTTP API talks about files by name only. Backends differ in how they
//! key their objects: Appwrite-compatible stores are ID-indexed (objects live
//! under server-generated IDs and names are metadata), Supabase-compatible
//! stores are path-indexed (the name is the object key). [`FileStore`] hides
//! that difference; handlers never learn which backend is configured beyond
//! the capability metadata returned with each result.
//!
//! One backend is constructed at startup from [`StorageConfig`] and shared
//! behind `Arc<dyn FileStore>` for the life of the process.

pub mod appwrite;
pub mod supabase;

use crate::config::{Config, StorageConfig};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tokio::sync::{Mutex, OwnedMutexGuard};
use url::Url;

pub use appwrite::AppwriteStore;
pub use supabase::SupabaseStore;

/// A stored object as seen through the name-addressed contract.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// User-chosen filename
    pub name: String,
    /// Backend-assigned opaque ID. `None` for path-indexed backends, where
    /// the name itself is the key.
    pub backend_id: Option<String>,
    /// Size in bytes
    pub size: u64,
    /// MIME type recorded by the backend
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of an upsert, echoed back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertReceipt {
    pub name: String,
    /// ID of the newly written object, when the backend assigns one
    pub backend_id: Option<String>,
    /// Whether an existing object was replaced
    pub replaced: bool,
}

/// Whether the expiry on an access URL is actually enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlExpiry {
    /// The backend signs the URL and stops honoring it after the deadline.
    Enforced,
    /// The URL works forever. Expiry fields on the response are advisory
    /// metadata only, and clients are told so.
    Advisory,
}

/// A download URL for a stored object.
#[derive(Debug, Clone)]
pub struct AccessUrl {
    pub url: Url,
    pub expiry: UrlExpiry,
}

/// Failures surfaced by a storage backend.
///
/// Messages in `Backend` come from the backend verbatim. They end up in 500
/// response bodies, so operators see the real cause rather than a generic
/// wrapper.
#[derive(ThisError, Debug)]
pub enum StoreError {
    /// No object is stored under this name
    #[error("no object named '{name}'")]
    NotFound { name: String },

    /// An object with this name already exists
    #[error("an object named '{name}' already exists")]
    AlreadyExists { name: String },

    /// The name cannot be carried safely as an object key. Rejected before
    /// any backend call.
    #[error("invalid object name '{name}'")]
    InvalidName { name: String },

    /// A replace deleted the old object but failed to write the new one.
    /// The name is gone from the backend until the caller retries the upload.
    #[error("replace of '{name}' failed after the old object was deleted: {message}")]
    ReplaceInterrupted { name: String, message: String },

    /// Any other backend failure, including timeouts
    #[error("{message}")]
    Backend { message: String },
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Backend { message: err.to_string() }
    }
}

/// Name-addressed storage operations.
///
/// Implementations must be safe to share across request handlers.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// List stored objects, up to the configured page size.
    async fn list(&self) -> Result<Vec<StoredFile>, StoreError>;

    /// Look up a single object by name. Returns `None` when absent. If the
    /// backend holds several objects under one name, the first match wins.
    async fn resolve(&self, name: &str) -> Result<Option<StoredFile>, StoreError>;

    /// Create or replace the object stored under `name`.
    ///
    /// With `replace` unset, an existing object under the same name fails the
    /// call with [`StoreError::AlreadyExists`] and leaves it untouched.
    async fn upsert(&self, name: &str, bytes: Bytes, content_type: &str, replace: bool) -> Result<UpsertReceipt, StoreError>;

    /// Remove the object stored under `name`.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Produce a download URL for the object stored under `name`.
    ///
    /// `expires_in` is in seconds. Backends that cannot enforce expiry return
    /// a permanent URL marked [`UrlExpiry::Advisory`].
    async fn access_url(&self, name: &str, expires_in: u64) -> Result<AccessUrl, StoreError>;
}

/// Build the configured storage backend.
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn FileStore>> {
    let store: Arc<dyn FileStore> = match &config.storage {
        StorageConfig::Appwrite {
            endpoint,
            project_id,
            api_key,
            bucket_id,
        } => Arc::new(AppwriteStore::new(
            endpoint.clone(),
            project_id.clone(),
            api_key.clone(),
            bucket_id.clone(),
            config.request_timeout,
            config.list_page_size,
        )?),
        StorageConfig::Supabase { url, service_key, bucket } => Arc::new(SupabaseStore::new(
            url.clone(),
            service_key.clone(),
            bucket.clone(),
            config.request_timeout,
            config.list_page_size,
        )?),
    };
    Ok(store)
}

/// Per-name mutual exclusion for multi-call backend sequences.
///
/// ID-indexed replace is a resolve/delete/create sequence with no transaction
/// around it. Holding the name's lock keeps concurrent sequences for the same
/// name from interleaving. The scope is this process only; replicas cannot
/// see each other's locks.
///
/// Entries are never reclaimed. The set of distinct filenames is assumed
/// small relative to memory.
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    /// Acquire the lock guarding `name`, creating it on first use.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_serializes() {
        let locks = Arc::new(NameLocks::new());
        let entered = Arc::new(AtomicBool::new(false));

        let guard = locks.acquire("a.txt").await;

        let task = {
            let locks = locks.clone();
            let entered = entered.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a.txt").await;
                entered.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!entered.load(Ordering::SeqCst), "second task should be blocked");

        drop(guard);
        task.await.unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_different_names_do_not_block() {
        let locks = NameLocks::new();
        let _a = locks.acquire("a.txt").await;
        // Completes immediately despite the held lock on a.txt.
        let _b = locks.acquire("b.txt").await;
    }

    #[test]
    fn test_backend_error_keeps_message() {
        let err = StoreError::Backend {
            message: "Server Error".to_string(),
        };
        assert_eq!(err.to_string(), "Server Error");
    }

    #[test]
    fn test_replace_interrupted_names_the_cause() {
        let err = StoreError::ReplaceInterrupted {
            name: "a.txt".to_string(),
            message: "disk full".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("a.txt"));
        assert!(rendered.contains("disk full"));
    }
}
