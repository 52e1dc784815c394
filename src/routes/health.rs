use axum::{extract::State, routing::get, Json, Router};
use tracing::warn;

use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, database) = match state.repo.ping().await {
        Ok(()) => ("ok", state.repo.backend().to_string()),
        Err(e) => {
            warn!("Health check: database unreachable: {}", e);
            ("degraded", format!("{} (unreachable)", state.repo.backend()))
        }
    };
    let storage = if state.store.is_mock() { "mock" } else { "s3" };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database,
        storage: storage.to_string(),
    })
}
