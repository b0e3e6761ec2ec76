pub mod health;
pub mod status;

use axum::Router;
use axum::http::Uri;

use courier_common::error::AppError;

use crate::state::AppState;

/// Build the complete status router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(status::router())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}
