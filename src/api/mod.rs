//! HTTP API surface for the gateway
//!
//! Two webhook endpoints plus a liveness probe. Everything else the gateway
//! does happens behind the webhook POST.

pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::router::MessageRouter;
use crate::Result;

/// Shared state for API handlers
pub struct ApiState {
    /// The message dispatch state machine
    pub router: MessageRouter,
    /// Webhook subscription verification secret
    pub verify_token: String,
}

/// Build the gateway router
pub fn build_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhook", get(webhook::verify).post(webhook::receive))
        .with_state(state)
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the gateway until the process exits
///
/// # Errors
///
/// Returns error if the listener cannot bind or the server fails
pub async fn serve(state: Arc<ApiState>, port: u16) -> Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "webhook server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
