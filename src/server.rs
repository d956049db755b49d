//! HTTP server assembly for the Civipay daemon.
//!
//! Builds the full application router out of the two route groups and runs it
//! on a TCP listener with graceful shutdown:
//!
//! ```text
//! build_router
//!   ├── webhook_router    POST /webhooks/payment
//!   ├── ops_router        GET  /health /ready /status /metrics
//!   └── cors_layer        localhost-only browser access
//! ```
//!
//! The webhook route group carries its own state ([`WebhookState`]) and the
//! ops group carries the shared metrics ([`AppState`]); both groups observe
//! the same `AppState` because the webhook handler records into it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::cors::cors_layer;
use crate::error::Result;
use crate::handlers::{ops_router, AppState};
use crate::webhook::handler::{webhook_router, WebhookState};

/// Assemble the complete application router.
///
/// Merges the webhook route group with the operational endpoints and applies
/// the localhost-only CORS policy on top.
pub fn build_router(webhook_state: Arc<WebhookState>, metrics: Arc<AppState>) -> Router {
    Router::new()
        .merge(webhook_router(webhook_state))
        .merge(ops_router(metrics))
        .layer(cors_layer())
}

/// Bind the listener and serve the router until a shutdown signal arrives.
///
/// In-flight requests are drained before the future resolves, so a delivery
/// that arrived just before SIGTERM is still acknowledged.
pub async fn serve(router: Router, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "civipay listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("civipay shut down");
    Ok(())
}

/// Resolve when the process is asked to stop.
///
/// On Unix this waits for SIGTERM or SIGINT; elsewhere it waits for Ctrl-C.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl-C");
    }
}
