//! HTTP request handlers for all API endpoints.
//!
//! Handlers validate the request, call into the configured storage backend
//! through [`crate::storage::FileStore`], and shape the result into the wire
//! models. They never branch on which backend is running; behavioral
//! differences arrive as capability metadata on the storage results.
//!
//! - [`files`]: File listing, upload, deletion, and signed URLs
//! - [`health`]: Liveness probe

pub mod files;
pub mod health;
