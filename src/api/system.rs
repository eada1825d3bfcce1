use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiResponse, AppState, DbStatusResponse, HealthResponse};

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "warden".to_string(),
    })
}

/// GET /db/status
/// Liveness of the storage backend. Always 200; the body carries the verdict.
pub async fn db_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<DbStatusResponse>> {
    match state.store.ping().await {
        Ok(()) => {
            metrics::counter!("db_connection_status_total", "status" => "up").increment(1);
            Json(ApiResponse::success(DbStatusResponse {
                database: "up".to_string(),
                connection: "healthy".to_string(),
            }))
        }
        Err(e) => {
            metrics::counter!("db_connection_status_total", "status" => "down").increment(1);
            tracing::error!("Database ping failed: {}", e);
            Json(ApiResponse::success(DbStatusResponse {
                database: "down".to_string(),
                connection: e.to_string(),
            }))
        }
    }
}
