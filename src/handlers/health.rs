use axum::{Json, response::IntoResponse};

// liveness probe - no auth, no rate limit
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
