//! Read-only HTTP status surface for the bot process.
//!
//! - `GET /health` reports liveness and version
//! - `GET /status` reports the receive-loop supervisor state

pub mod routes;
pub mod state;

use std::net::SocketAddr;

use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::routes::create_router;
use crate::state::AppState;

/// Serve the status surface on `addr` until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = create_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Status server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
