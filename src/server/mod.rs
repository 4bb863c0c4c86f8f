use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderValue, Method, Request},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::acquire::Acquirer;
use crate::catalog::CatalogApi;
use crate::config::Config;

pub mod routes;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub acquirer: Arc<Acquirer>,
    pub catalog: Arc<dyn CatalogApi>,
}

impl AppContext {
    pub fn new(acquirer: Arc<Acquirer>, catalog: Arc<dyn CatalogApi>) -> Self {
        Self { acquirer, catalog }
    }
}

fn cors_layer(allow_origin: &str) -> CorsLayer {
    let origin = if allow_origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(allow_origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid allow_origin {:?}: {}", allow_origin, e);
                AllowOrigin::any()
            }
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET])
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext, allow_origin: &str) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/health", get(routes::health))
        .route("/search", get(routes::search))
        .route("/info", get(routes::info))
        .route("/video", get(routes::video))
        .route("/audio", get(routes::audio))
        .route("/list", get(routes::list))
        .layer(cors_layer(allow_origin))
        .layer(trace)
        .with_state(ctx)
}

/// Start the HTTP server and run until a shutdown signal arrives
pub async fn start_server(config: &Config, ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx, &config.server.allow_origin);

    tracing::info!("Starting HTTP server. Listening at {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
