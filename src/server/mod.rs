//! HTTP API server
//!
//! Axum-based front for the orchestrator:
//! - `POST /api/scrape` scrapes one URL
//! - `GET /` reports liveness

mod handlers;
mod types;

pub use types::{ErrorBody, HealthResponse, OptionsPatch, ScrapeBody};

use crate::scrape::Orchestrator;
use anyhow::{Context, Result};
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Creates the API router
pub fn create_router(state: AppState) -> Router {
    let cors_enabled = state.orchestrator.config().server.cors_enabled;

    let mut app = Router::new()
        .route("/", get(handlers::health))
        .route("/api/scrape", post(handlers::scrape))
        .with_state(state);

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
            .allow_origin(Any);
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http())
}

/// Serves on the configured address until Ctrl-C
pub async fn serve(orchestrator: Orchestrator) -> Result<()> {
    let addr: SocketAddr = orchestrator
        .config()
        .server
        .listen_addr
        .parse()
        .context("Invalid HTTP listen address")?;

    let listener = TcpListener::bind(&addr)
        .await
        .context("Failed to bind HTTP server")?;

    serve_on(listener, orchestrator, shutdown_signal()).await
}

/// Serves on `listener` until `shutdown` resolves
pub async fn serve_on<F>(listener: TcpListener, orchestrator: Orchestrator, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(AppState { orchestrator });

    if let Ok(addr) = listener.local_addr() {
        info!("HTTP API server listening on http://{}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("HTTP server shutting down");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
