//! mysite-web - server-rendered frontend for a personal blog and portfolio

use anyhow::Result;
use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mysite_web::{
    api::{self, AppState},
    backend::HttpBackend,
    config::Config,
    services::{HttpTokenClient, OidcEndpoints},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mysite_web=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mysite-web...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded, backend at {}", config.backend.api_url);

    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let endpoints = OidcEndpoints::keycloak(&config.oidc.url, &config.oidc.realm);
    let tokens = Arc::new(HttpTokenClient::new(
        &endpoints,
        &config.oidc,
        Duration::from_secs(config.backend.timeout_secs),
    )?);
    tracing::info!("Identity provider realm: {}", config.oidc.realm);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);

    let state = AppState::new(config, backend, tokens)?;
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running at http://{}", addr);

    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let stop = stop.clone();
            async move { stop.notified().await }
        })
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown_signal().await;
            stop.notify_one();
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!(
                "Open connections did not finish within {}s, forcing shutdown",
                shutdown_timeout.as_secs()
            );
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, shutting down");
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
}
