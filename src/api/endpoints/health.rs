use axum::Json;

use crate::api::types::HealthResponse;

/// `GET /health`: liveness probe.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: crate::config::APP_VERSION,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
