//! HTTP server for the liveness and Prometheus metrics endpoints.
//!
//! Runs on a separate tokio task. `/` answers the hosting platform's
//! health checks; `/metrics` serves Prometheus text format.

use axum::{Router, routing::get};
use std::net::SocketAddr;

/// Handler for GET / - hosting platforms poll this to keep the process alive.
async fn liveness_handler() -> &'static str {
    "I'm alive"
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the HTTP server for liveness checks and Prometheus metrics.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_http_server(port: u16) {
    let app = Router::new()
        .route("/", get(liveness_handler))
        .route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("HTTP server error: {}", e);
    }
}
