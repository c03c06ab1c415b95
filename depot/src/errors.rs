//! Error handling for the depot API.
//!
//! Every handler returns [`enum@Error`], which knows how to render itself as a
//! JSON response with the right status code. Storage failures arrive as
//! [`StoreError`] and are folded into the HTTP taxonomy here: absence becomes
//! 404, duplicate names become 409, and everything else surfaces as 500 with
//! the backend's own message so operators can see what actually went wrong.

use crate::storage::StoreError;
use axum::{
    Json,
    extract::{FromRequest, OptionalFromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request did not carry the configured API key
    #[error("Not authenticated")]
    Unauthenticated,

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// A request body the JSON extractor refused. Keeps the extractor's
    /// status (400 malformed, 413 too large, 415 wrong content type, 422
    /// mismatched shape); only the body shape is overridden.
    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },

    /// No file is stored under the requested name
    #[error("file '{name}' not found")]
    NotFound { name: String },

    /// A file with this name already exists and replacement was not requested
    #[error("file '{name}' already exists")]
    Conflict { name: String },

    /// The storage backend failed the operation
    #[error(transparent)]
    Storage(StoreError),

    /// Internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected errors with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { name } => Error::NotFound { name },
            StoreError::AlreadyExists { name } => Error::Conflict { name },
            StoreError::InvalidName { name } => Error::BadRequest {
                message: format!("invalid object name '{name}'"),
            },
            other => Error::Storage(other),
        }
    }
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidBody { status, .. } => *status,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Storage(_) | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message for the response body.
    ///
    /// Backend messages are passed through verbatim; internal errors are not.
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated => "Unauthorized".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::InvalidBody { message, .. } => message.clone(),
            Error::NotFound { .. } => "File not found".to_string(),
            Error::Conflict { name } => format!("File {name} already exists"),
            Error::Storage(err) => err.to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Error::Storage(err) => {
                tracing::error!("Storage backend error: {err:?}");
            }
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal error: {self:?}");
            }
            Error::Conflict { name } => {
                tracing::warn!("Conflict on file '{name}'");
            }
            Error::Unauthenticated => {
                tracing::info!("Rejected request without valid API key");
            }
            Error::BadRequest { message } => {
                tracing::debug!("Bad request: {message}");
            }
            Error::InvalidBody { status, message } => {
                tracing::debug!("Rejected request body ({status}): {message}");
            }
            Error::NotFound { name } => {
                tracing::debug!("File '{name}' not found");
            }
        }

        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}

/// `axum::Json` with rejections folded into [`enum@Error`].
///
/// axum renders extractor rejections as plain text. Every error leaving this
/// API is promised as `{"error": ...}`, so handlers take their JSON bodies
/// through this wrapper instead of `Json` directly.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match <Json<T> as FromRequest<S>>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(Error::InvalidBody {
                status: rejection.status(),
                message: rejection.body_text(),
            }),
        }
    }
}

impl<T, S> OptionalFromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>> {
        match <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await {
            Ok(value) => Ok(value.map(|Json(value)| ApiJson(value))),
            Err(rejection) => Err(Error::InvalidBody {
                status: rejection.status(),
                message: rejection.body_text(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::BadRequest {
                message: "filename required".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::NotFound {
                name: "a.txt".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Conflict {
                name: "a.txt".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Storage(StoreError::Backend {
                message: "boom".to_string()
            })
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        // Extractor rejections keep their own status.
        assert_eq!(
            Error::InvalidBody {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                message: "length limit exceeded".to_string()
            }
            .status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let err: Error = StoreError::NotFound {
            name: "a.txt".to_string(),
        }
        .into();
        assert!(matches!(err, Error::NotFound { .. }));

        let err: Error = StoreError::AlreadyExists {
            name: "a.txt".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Conflict { .. }));

        let err: Error = StoreError::Backend {
            message: "Server Error".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Storage(_)));

        let err: Error = StoreError::InvalidName { name: "..".to_string() }.into();
        assert!(matches!(err, Error::BadRequest { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_backend_message_passed_through() {
        let err = Error::Storage(StoreError::Backend {
            message: "Server Error".to_string(),
        });
        assert_eq!(err.user_message(), "Server Error");
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = Error::Internal {
            operation: "load config".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");
    }
}
