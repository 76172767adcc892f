//! # Health Endpoint
//!
//! Minimal axum surface: `GET /health` answers `200 OK` with body `OK` when
//! every registered check passes, otherwise `500` with body `Not OK`.

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{FormServiceError, Result};

pub mod handlers;
pub mod state;

pub use state::WebState;

pub fn create_app(state: WebState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .with_state(state)
}

/// Bind `bind_address` and serve until `cancel` fires
pub async fn serve(
    bind_address: &str,
    state: WebState,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(bind_address).await.map_err(|e| {
        FormServiceError::HealthEndpoint(format!("failed to bind to {bind_address}: {e}"))
    })?;
    let app = create_app(state);

    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await });
        if let Err(e) = server.await {
            error!(error = %e, "Health endpoint server error");
        }
    });

    info!(bind_address = %bind_address, "✅ Health endpoint listening");
    Ok(handle)
}
