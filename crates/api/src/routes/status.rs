//! Supervisor status endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use courier_common::types::SupervisorStatus;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(current_status))
}

async fn current_status(State(state): State<AppState>) -> Json<SupervisorStatus> {
    Json(state.status.borrow().clone())
}
