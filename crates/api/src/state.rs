//! Shared state for the status routes.

use tokio::sync::watch;

use courier_common::types::SupervisorStatus;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub status: watch::Receiver<SupervisorStatus>,
}

impl AppState {
    pub fn new(status: watch::Receiver<SupervisorStatus>) -> Self {
        Self { status }
    }
}
