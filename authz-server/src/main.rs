mod api;
mod bootstrap;
mod config;
mod errors;
mod openapi;
mod state;
mod store;
#[cfg(test)]
mod test_utils;

use crate::config::AppConfig;
use crate::errors::StartupError;
use crate::state::AppState;
use authz_engine::ExpirySweeper;
use axum::{routing::get, Json, Router};
use log::{error, info};
use std::net::SocketAddr;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load configuration
    let config = match AppConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", StartupError::Config(e));
            std::process::exit(1);
        }
    };

    let (state, sweeper) = match initialize(&config).await {
        Ok(initialized) => initialized,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let app = create_app(state);

    // Build server address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // Start server
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server running on {}, press Ctrl+C to stop", addr);
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown();
    }
    if let Err(e) = serve {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("Server shutdown complete");
}

/// Creates the store, registers the bootstrap client and starts the sweeper
async fn initialize(
    config: &AppConfig,
) -> Result<(AppState, Option<ExpirySweeper>), StartupError> {
    let store = store::create_store(config).await?;
    let state = AppState::new(config, store.clone());
    bootstrap::register_client(&config.bootstrap, &state.service).await?;

    let sweeper = config
        .store
        .sweep_interval()
        .map(|interval| ExpirySweeper::start(store, interval));
    Ok((state, sweeper))
}

/// Create a new application instance with a given state
pub fn create_app(state: AppState) -> Router {
    let (router, api_doc) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(api::router())
        .split_for_parts();

    let openapi_json = api_doc.clone();
    router
        .route(
            "/openapi.json",
            get(move || {
                let api_doc = openapi_json.clone();
                async move { Json(api_doc) }
            }),
        )
        .merge(Scalar::with_url("/scalar", api_doc))
        .with_state(state)
}

// Simple signal handler that works on all platforms
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
