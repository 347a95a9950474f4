//! HTTP API for the address book.
//!
//! Routes live under `/api/v1`; `/` and `/health` sit at the root. Store calls
//! are synchronous, so every handler runs them on tokio's blocking pool, bounded
//! by the configured request timeout. A call that overruns answers 500; the
//! store call itself keeps running and a write may still commit.

use address_book::{AddressBook, PROJECT_NAME, ServiceConfig};
use anyhow::Context;
use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod error;
mod routes;

pub use error::ApiError;
pub use routes::{AddressWithDistance, AppState, LocationQuery, SearchQuery};

/// The full application router, ready to serve.
pub fn router(book: AddressBook, config: &ServiceConfig) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            book,
            request_timeout: config.request_timeout,
        })
}

/// Open the store, bind the listener and serve until Ctrl-C or SIGTERM.
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    info!("Starting {PROJECT_NAME}...");
    let book = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || AddressBook::from_config(&config))
            .await
            .context("store initialisation task panicked")??
    };

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, router(book, &config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down {PROJECT_NAME}...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
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
}
