//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Health** (`/health`): Liveness probe, no authentication
//! - **Files** (`/api/*`): List, upload, delete, and signed-URL operations,
//!   all behind the `x-api-key` header

pub mod handlers;
pub mod models;
