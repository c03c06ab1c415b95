//! API-key authentication for the `/api` routes.
//!
//! Requests must present the configured secret in the `x-api-key` header.
//! The check runs before any handler or storage call, so rejected requests
//! never touch the backend. Browsers do not attach custom headers to
//! preflight requests; OPTIONS passes through for the CORS layer to answer.

use crate::{AppState, errors::Error};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

/// Request header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Check the presented API key against the configured one.
pub(crate) fn check_api_key(state: &AppState, request: &Request) -> Result<(), Error> {
    let presented = request.headers().get(API_KEY_HEADER).and_then(|value| value.to_str().ok());

    match (presented, state.config.api_key.as_deref()) {
        (Some(presented), Some(expected)) if presented == expected => Ok(()),
        _ => Err(Error::Unauthenticated),
    }
}

/// Middleware rejecting requests without the exact configured `x-api-key`.
pub async fn require_api_key_middleware(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, Error> {
    if request.method() != Method::OPTIONS {
        check_api_key(&state, &request)?;
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_API_KEY, appwrite_test_config, create_test_state};
    use axum::body::Body;

    fn request(key: Option<&str>) -> Request {
        let builder = Request::builder().uri("/api/list");
        let builder = match key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        };
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_matching_key_passes() {
        let state = create_test_state(appwrite_test_config("http://127.0.0.1:9"));
        assert!(check_api_key(&state, &request(Some(TEST_API_KEY))).is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let state = create_test_state(appwrite_test_config("http://127.0.0.1:9"));
        let err = check_api_key(&state, &request(Some("nope"))).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[test]
    fn test_missing_header_rejected() {
        let state = create_test_state(appwrite_test_config("http://127.0.0.1:9"));
        let err = check_api_key(&state, &request(None)).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }
}
