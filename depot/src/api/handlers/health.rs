//! Health check endpoint.

use crate::api::models::health::HealthResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Health check",
    description = "Liveness probe. Requires no authentication and touches no storage backend.",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse),
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
