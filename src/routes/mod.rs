//! API Routes
//!
//! - `/api/health` - Health check
//! - `/api/v1/upload` - Presigned upload and download URLs
//! - `/api/v1/library-items` - Library item metadata, trash and restore
//! - `/api/v1/users` - Registration and profile

pub mod health;
pub mod items;
pub mod upload;
pub mod users;

#[cfg(test)]
mod tests;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server);

    Router::new()
        .merge(health::router(state.clone()))
        .merge(upload::router(state.clone()))
        .merge(items::router(state.clone()))
        .merge(users::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
