//! OpenAPI documentation for the file-management API.
//!
//! The generated document is served interactively at `/docs` and as raw JSON
//! at `/api-docs/openapi.json`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;

/// Security scheme for the file API (static key in the `x-api-key` header).
struct ApiKeySecurityAddon;

impl Modify for ApiKeySecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "ApiKey".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-api-key",
                    "Static API key shared with the server configuration. Include it on every `/api` request:\n\n\
                     ```\nx-api-key: YOUR_API_KEY\n```",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&ApiKeySecurityAddon),
    paths(
        api::handlers::health::health,
        api::handlers::files::list_files,
        api::handlers::files::upload_file,
        api::handlers::files::delete_file,
        api::handlers::files::signed_url,
    ),
    components(
        schemas(
            crate::api::models::health::HealthResponse,
            crate::api::models::files::FileEntry,
            crate::api::models::files::FileListResponse,
            crate::api::models::files::UploadRequest,
            crate::api::models::files::UploadResponse,
            crate::api::models::files::DeleteRequest,
            crate::api::models::files::DeleteResponse,
            crate::api::models::files::SignedUrlRequest,
            crate::api::models::files::SignedUrlResponse,
        )
    ),
    tags(
        (name = "health", description = "Service liveness."),
        (name = "files", description = "Manage files stored in the configured bucket.

Files are addressed by name. Uploads carry the content base64-encoded in a JSON body; downloads happen
out-of-band through the URLs returned by `/api/signed-url`."),
    ),
    info(
        title = "depot API",
        version = "1.0.0",
        description = "REST API for managing files in an object-storage bucket.

## Authentication

All `/api` endpoints require the configured key in the `x-api-key` header.

## Errors

Errors are returned as JSON with a single `error` field:

```json
{
  \"error\": \"File not found\"
}
```",
    ),
)]
pub struct ApiDoc;
