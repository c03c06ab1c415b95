//! HTTP handlers for file management endpoints.
//!
//! All four endpoints live under `/api` and sit behind the API-key
//! middleware. Validation failures are rejected here, before any storage
//! call happens.

use crate::AppState;
use crate::api::models::files::{
    DeleteQuery, DeleteRequest, DeleteResponse, FileListResponse, SignedUrlRequest, SignedUrlResponse, UploadRequest,
    UploadResponse,
};
use crate::errors::{ApiJson, Error, Result};
use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use base64::Engine;
use bytes::Bytes;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Upper bound on requested URL lifetimes, ten years in seconds.
const MAX_URL_EXPIRY_SECS: u64 = 315_360_000;

/// Reject names that cannot address exactly one object on every backend.
///
/// Separators would nest the key on path-indexed backends, where the listing
/// is flat, and `.`/`..` are path syntax rather than names.
fn validate_filename(filename: &str) -> Result<()> {
    if filename.contains('/') || filename.contains('\\') {
        return Err(Error::BadRequest {
            message: "filename cannot contain path separators".to_string(),
        });
    }
    if filename == "." || filename == ".." {
        return Err(Error::BadRequest {
            message: "invalid filename".to_string(),
        });
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/list",
    tag = "files",
    summary = "List files",
    description = "List stored files with their metadata, up to the configured page size.",
    responses(
        (status = 200, description = "Current file listing", body = FileListResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 500, description = "Storage backend failure"),
    ),
    security(("ApiKey" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>> {
    let files = state.store.list().await?;
    tracing::debug!("Listed {} files", files.len());
    Ok(Json(FileListResponse::from_stored(files)))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "files",
    summary = "Upload a file",
    description = "Store a base64-encoded file under the given name. Set `replace` to overwrite an existing file; \
                   without it, uploading a name that already exists fails with 409.",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing fields or invalid base64"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 409, description = "A file with this name already exists"),
        (status = 500, description = "Storage backend failure"),
    ),
    security(("ApiKey" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn upload_file(State(state): State<AppState>, ApiJson(body): ApiJson<UploadRequest>) -> Result<Json<UploadResponse>> {
    let filename = body.filename.unwrap_or_default();
    let file_data = body.file_data.unwrap_or_default();
    if filename.is_empty() || file_data.is_empty() {
        return Err(Error::BadRequest {
            message: "filename and file_data required".to_string(),
        });
    }
    validate_filename(&filename)?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(file_data.as_bytes())
        .map_err(|_| Error::BadRequest {
            message: "file_data is not valid base64".to_string(),
        })?;

    let content_type = body
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let receipt = state.store.upsert(&filename, Bytes::from(bytes), &content_type, body.replace).await?;
    tracing::info!(filename = %receipt.name, replaced = receipt.replaced, "Stored file");
    Ok(Json(UploadResponse::from_receipt(receipt)))
}

#[utoipa::path(
    delete,
    path = "/api/delete",
    tag = "files",
    summary = "Delete a file",
    description = "Delete the file stored under the given name. The name is taken from the JSON body when present, \
                   falling back to the `filename` query parameter and then the `x-filename` header. Also accepts \
                   POST for clients that cannot send DELETE bodies.",
    request_body = DeleteRequest,
    params(
        DeleteQuery,
        ("x-filename" = Option<String>, Header, description = "Filename fallback for clients that cannot send a body"),
    ),
    responses(
        (status = 200, description = "File deleted", body = DeleteResponse),
        (status = 400, description = "No filename given"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "No file stored under this name"),
        (status = 500, description = "Storage backend failure"),
    ),
    security(("ApiKey" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_file(
    State(state): State<AppState>,
    Query(query): Query<DeleteQuery>,
    headers: HeaderMap,
    body: Option<ApiJson<DeleteRequest>>,
) -> Result<Json<DeleteResponse>> {
    let filename = body
        .and_then(|ApiJson(body)| body.filename)
        .or(query.filename)
        .or_else(|| {
            headers
                .get("x-filename")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::BadRequest {
            message: "filename required in body, query, or x-filename header".to_string(),
        })?;
    validate_filename(&filename)?;

    state.store.delete(&filename).await?;
    tracing::info!(filename = %filename, "Deleted file");
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("File {filename} deleted successfully"),
    }))
}

#[utoipa::path(
    post,
    path = "/api/signed-url",
    tag = "files",
    summary = "Create a download URL",
    description = "Generate a download URL for the file stored under the given name. Backends that cannot enforce \
                   expiry return a permanent URL together with a `note` saying so.",
    request_body = SignedUrlRequest,
    responses(
        (status = 200, description = "Download URL created", body = SignedUrlResponse),
        (status = 400, description = "No filename given or expiry out of range"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "No file stored under this name"),
        (status = 500, description = "Storage backend failure"),
    ),
    security(("ApiKey" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn signed_url(State(state): State<AppState>, ApiJson(body): ApiJson<SignedUrlRequest>) -> Result<Json<SignedUrlResponse>> {
    let filename = body.filename.unwrap_or_default();
    if filename.is_empty() {
        return Err(Error::BadRequest {
            message: "filename required".to_string(),
        });
    }
    validate_filename(&filename)?;

    let expires_in = body.expires_in.unwrap_or_else(|| state.config.default_url_expiry.as_secs());
    if expires_in == 0 || expires_in > MAX_URL_EXPIRY_SECS {
        return Err(Error::BadRequest {
            message: format!("expires_in must be between 1 and {MAX_URL_EXPIRY_SECS} seconds"),
        });
    }

    let access = state.store.access_url(&filename, expires_in).await?;
    Ok(Json(SignedUrlResponse::from_access(access, expires_in)))
}
