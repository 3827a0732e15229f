//! HTTP server initialization and runtime setup.
//!
//! Handles the store connection, model registration and the Axum server
//! lifecycle including graceful shutdown.

use crate::api::middleware::rate_limit;
use crate::config::Config;
use crate::domain::entities::register_models;
use crate::infrastructure::connection::connect;
use crate::odm::{DocumentStore, ModelRegistry, Odm};
use crate::routes::{RouterOptions, app_router, app_service};
use crate::state::AppState;

use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::Request;
use std::net::SocketAddr;
use std::sync::Arc;

/// Builds the ODM with every domain model registered.
///
/// # Errors
///
/// Returns an error if a model is registered twice or references an
/// unregistered model.
pub fn build_odm(store: Arc<dyn DocumentStore>) -> Result<Odm> {
    let mut registry = ModelRegistry::new();
    register_models(&mut registry).context("Failed to register models")?;
    Odm::new(store, registry).context("Invalid model registry")
}

/// Runs the HTTP server with the given configuration.
///
/// Initializes:
/// - The document store (with connection retries and migrations)
/// - The model registry and services
/// - Axum HTTP server
///
/// The store is closed after the server has drained.
///
/// # Errors
///
/// Returns an error if:
/// - The store cannot be opened
/// - Server bind fails
/// - Server runtime error occurs
pub async fn run(config: Config) -> Result<()> {
    let connection = config.connection_string()?;
    let store = connect(&connection, &config.pool_settings()).await?;

    let odm = build_odm(store)?;
    tracing::info!(models = odm.registry().len(), "Models registered");

    let state = AppState::new(odm.clone())?;

    let options = RouterOptions {
        rate_limit: if config.is_rate_limited() {
            tracing::info!(
                per_second = config.rate_limit_per_second,
                burst = config.rate_limit_burst,
                "Rate limiting enabled"
            );
            Some(rate_limit::layer(
                config.rate_limit_per_second,
                config.rate_limit_burst,
            )?)
        } else {
            None
        },
    };
    let app = app_service(app_router(state, options));

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{addr}");

    let served = axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    odm.close().await;
    tracing::info!("Server stopped");

    served.context("Server error")
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
