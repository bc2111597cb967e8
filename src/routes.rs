use std::{collections::HashSet, path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, Method},
    response::Response,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};
use url::Url;

use crate::{
    error::{ApiError, ApiResult},
    executor::DownloadExecutor,
    files::{resolve_download_path, stream_download},
    formats::default_format,
    history::{DownloadInfo, HISTORY_PAGE_LIMIT, HistoryStore},
};

const YOUTUBE_DOMAINS: [&str; 3] = ["youtube.com", "youtu.be", "www.youtube.com"];

#[derive(Clone)]
pub struct AppState {
    pub history: HistoryStore,
    pub executor: DownloadExecutor,
    pub download_dir: PathBuf,
    /// Configured `DOWNLOAD_PATH`, reported back verbatim.
    pub download_path: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default = "default_format")]
    pub format: String,
}

#[derive(Debug, Serialize, Default)]
pub struct DownloadResponse {
    pub success: bool,
    pub filename: Option<String>,
    pub format: Option<String>,
    pub size: Option<String>,
    pub error: Option<String>,
    pub download_path: Option<String>,
    pub download_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadsResponse {
    pub success: bool,
    pub downloads: Vec<DownloadInfo>,
    pub total: usize,
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/download", post(start_download))
        .route("/downloads", get(list_downloads))
        .route("/downloads/{id}", delete(delete_download))
        .route("/download-file/{*filename}", get(serve_download_file))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "YGIF yt-dlp Backend is running",
        "status": "ok",
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "download_path": state.download_path,
        "downloads_count": state.history.len().await,
    }))
}

async fn start_download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<Json<DownloadResponse>> {
    let Json(payload) = payload?;
    let url = validate_url(&payload.url)?;

    let ticket = state.history.begin(url).await;
    let outcome = state.executor.execute(url, &payload.format).await;
    state.history.finish(ticket, &outcome).await;

    let response = match outcome {
        Ok(completed) => {
            let download_url = format!(
                "/download-file/{}",
                urlencoding::encode(&completed.filename)
            );
            DownloadResponse {
                success: true,
                filename: Some(completed.filename),
                format: Some(completed.format),
                size: completed.size,
                download_path: Some(state.download_path.clone()),
                download_url: Some(download_url),
                ..DownloadResponse::default()
            }
        }
        Err(error) => DownloadResponse {
            success: false,
            error: Some(error),
            ..DownloadResponse::default()
        },
    };

    Ok(Json(response))
}

/// Plain substring match against the allow-list, so the domain may appear
/// anywhere in the string.
fn validate_url(raw: &str) -> ApiResult<&str> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("URL is required"));
    }
    if !YOUTUBE_DOMAINS.iter().any(|domain| url.contains(domain)) {
        return Err(ApiError::bad_request("Invalid YouTube URL"));
    }
    Ok(url)
}

async fn list_downloads(State(state): State<AppState>) -> Json<DownloadsResponse> {
    let page = state.history.list(HISTORY_PAGE_LIMIT).await;
    Json(DownloadsResponse {
        success: true,
        downloads: page.downloads,
        total: page.total,
    })
}

async fn serve_download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = resolve_download_path(&state.download_dir, &filename)?;
    stream_download(&path, &filename).await
}

async fn delete_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let removed = state.history.delete(&id).await;
    debug!("Removed {removed} history entries with id {id:?}");
    Json(serde_json::json!({
        "success": true,
        "message": "Download removed from history",
    }))
}

pub fn build_cors_layer(origins: &[String]) -> ApiResult<CorsLayer> {
    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins.iter().collect::<Vec<_>>()
    );

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}
