use crate::storage::{AccessUrl, StoredFile, UpsertReceipt, UrlExpiry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Shown alongside signed URLs from backends that cannot enforce expiry.
pub const PERMANENT_URL_NOTE: &str = "This URL does not expire. Use bucket-level permissions to control access.";

/// A stored file as returned by the list endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileEntry {
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type recorded by the backend
    #[serde(rename = "type")]
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileEntry {
    pub fn from_stored(file: StoredFile) -> Self {
        Self {
            name: file.name,
            size: file.size,
            mime_type: file.mime_type,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

/// Response for the file listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileListResponse {
    pub files: Vec<FileEntry>,
    pub total: usize,
}

impl FileListResponse {
    pub fn from_stored(files: Vec<StoredFile>) -> Self {
        let files: Vec<FileEntry> = files.into_iter().map(FileEntry::from_stored).collect();
        Self {
            total: files.len(),
            files,
        }
    }
}

/// Request body for uploading a file.
///
/// Requiredness of `filename` and `file_data` is checked in the handler so
/// the error message matches the API contract, hence the `Option`s.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadRequest {
    /// Name the file is stored under
    pub filename: Option<String>,
    /// File content, base64-encoded
    pub file_data: Option<String>,
    /// MIME type to record (default `application/octet-stream`)
    pub content_type: Option<String>,
    /// Replace an existing file of the same name instead of failing
    #[serde(default)]
    pub replace: bool,
}

/// Response for a successful upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    /// Backend-assigned file ID, when the backend uses IDs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub message: String,
}

impl UploadResponse {
    pub fn from_receipt(receipt: UpsertReceipt) -> Self {
        let message = if receipt.replaced {
            "File replaced successfully".to_string()
        } else {
            "File uploaded successfully".to_string()
        };
        Self {
            success: true,
            filename: receipt.name,
            file_id: receipt.backend_id,
            message,
        }
    }
}

/// Request body for deleting a file
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteRequest {
    pub filename: Option<String>,
}

/// Query parameters accepted by the delete endpoint as a body alternative
#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteQuery {
    pub filename: Option<String>,
}

/// Response for a successful deletion
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Request body for generating a signed download URL
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignedUrlRequest {
    pub filename: Option<String>,
    /// Lifetime of the URL in seconds (default from server config)
    pub expires_in: Option<u64>,
}

/// Response carrying a download URL
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignedUrlResponse {
    pub success: bool,
    #[schema(value_type = String)]
    pub signed_url: url::Url,
    /// Requested lifetime in seconds
    pub expires_in: u64,
    /// Deadline implied by `expires_in`
    pub expires_at: DateTime<Utc>,
    /// Present when the backend cannot enforce the expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SignedUrlResponse {
    pub fn from_access(access: AccessUrl, expires_in: u64) -> Self {
        let note = match access.expiry {
            UrlExpiry::Enforced => None,
            UrlExpiry::Advisory => Some(PERMANENT_URL_NOTE.to_string()),
        };
        Self {
            success: true,
            signed_url: access.url,
            expires_in,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in as i64),
            note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_file_entry_uses_wire_field_names() {
        let entry = FileEntry {
            name: "a.txt".to_string(),
            size: 5,
            mime_type: "text/plain".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "text/plain");
        assert!(value.get("mime_type").is_none());
    }

    #[test]
    fn test_upload_response_omits_absent_file_id() {
        let receipt = UpsertReceipt {
            name: "a.txt".to_string(),
            backend_id: None,
            replaced: false,
        };
        let value = serde_json::to_value(UploadResponse::from_receipt(receipt)).unwrap();
        assert!(value.get("file_id").is_none());
        assert_eq!(value["message"], "File uploaded successfully");
    }

    #[test]
    fn test_upload_response_reports_replacement() {
        let receipt = UpsertReceipt {
            name: "a.txt".to_string(),
            backend_id: Some("f2".to_string()),
            replaced: true,
        };
        let response = UploadResponse::from_receipt(receipt);
        assert_eq!(response.message, "File replaced successfully");
        assert_eq!(response.file_id.as_deref(), Some("f2"));
    }

    #[test]
    fn test_signed_url_note_only_for_advisory_expiry() {
        let enforced = SignedUrlResponse::from_access(
            AccessUrl {
                url: Url::parse("https://x.supabase.co/storage/v1/object/sign/files/a.txt?token=t").unwrap(),
                expiry: UrlExpiry::Enforced,
            },
            3600,
        );
        assert!(enforced.note.is_none());

        let advisory = SignedUrlResponse::from_access(
            AccessUrl {
                url: Url::parse("https://cloud.appwrite.io/v1/storage/buckets/b/files/f1/download?project=p").unwrap(),
                expiry: UrlExpiry::Advisory,
            },
            3600,
        );
        assert_eq!(advisory.note.as_deref(), Some(PERMANENT_URL_NOTE));

        let value = serde_json::to_value(&enforced).unwrap();
        assert!(value.get("note").is_none());
    }
}
