mod config;
mod error;
mod executor;
mod files;
mod formats;
mod history;
mod routes;
mod ytdlp;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::{
    config::Config,
    error::ApiError,
    executor::DownloadExecutor,
    history::HistoryStore,
    routes::{AppState, build_cors_layer, build_router},
    ytdlp::YtDlp,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ygif_backend=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = Config::from_env();

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .map_err(|error| {
            ApiError::internal(format!(
                "Could not create download directory {:?}: {error}",
                config.download_dir
            ))
        })?;

    let extractor = Arc::new(YtDlp::new(config.ytdlp_bin.clone()));
    let state = AppState {
        history: HistoryStore::new(),
        executor: DownloadExecutor::new(extractor, config.download_dir.clone()),
        download_dir: config.download_dir.clone(),
        download_path: config.download_path.clone(),
    };

    let cors = build_cors_layer(&config.allowed_origins)?;
    let app = build_router(state, cors);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|error| {
            ApiError::internal(format!(
                "Could not listen on {}: {error}",
                config.bind_addr
            ))
        })?;

    info!(
        "Backend ready on http://{} (downloads in {})",
        config.bind_addr, config.download_path
    );

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
