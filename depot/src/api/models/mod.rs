//! API request and response data models.
//!
//! These structures define the public API contract. They are distinct from
//! the storage layer's types ([`crate::storage::StoredFile`] and friends) so
//! the wire format can stay stable regardless of which backend is configured.
//! All models are annotated with `utoipa` for the generated OpenAPI document.
//!
//! - [`files`]: File listings, uploads, deletions, and signed URLs
//! - [`health`]: Health check response

pub mod files;
pub mod health;
