//! HTTP server for the live feed and detection logs.
//!
//! This module provides an HTTP server that:
//! - Streams the camera as motion JPEG via GET /video_feed
//! - Serves detection records and their analysis as JSON
//! - Lists recorded footage clips and serves them for download
//!
//! # Architecture
//!
//! ```text
//! Collector ──▶ LiveFeed ──▶ GET /video_feed ──▶ browser
//! LogStore  ─────────────▶ GET /api/logs, /api/analysis
//! ```

use crate::collector::{LiveFeed, LiveFeedReceiver};
use crate::core::analysis::{analyze, AnalysisReport};
use crate::core::tracker::{DetectionInterval, SharedTracker};
use crate::pipeline::PipelineControl;
use crate::stats::{SharedStats, StatsSnapshot};
use crate::store::{LogRecord, SharedLogStore, StoreError};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Multipart boundary used by the live feed.
pub const FRAME_BOUNDARY: &str = "frame";

/// Content type of recorded clips.
pub const FOOTAGE_CONTENT_TYPE: &str = "video/x-motion-jpeg";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Loopback-only server on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }
}

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub tracker: SharedTracker,
    pub store: SharedLogStore,
    pub stats: SharedStats,
    pub live: LiveFeed,
    /// Directory listed by /api/footages and served under /footages
    pub footage_dir: Option<PathBuf>,
    /// Present when the server runs alongside a pipeline
    pub control: Option<PipelineControl>,
}

impl AppState {
    pub fn new(
        tracker: SharedTracker,
        store: SharedLogStore,
        stats: SharedStats,
        live: LiveFeed,
    ) -> Self {
        Self {
            tracker,
            store,
            stats,
            live,
            footage_dir: None,
            control: None,
        }
    }

    pub fn with_footage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.footage_dir = Some(dir.into());
        self
    }

    pub fn with_control(mut self, control: PipelineControl) -> Self {
        self.control = Some(control);
        self
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Date and time of one detection, for timeline views.
#[derive(Debug, Serialize)]
pub struct DetectionTime {
    pub date: NaiveDate,
    pub detection_time: String,
}

/// Live agent status.
#[derive(Serialize)]
pub struct StatusResponse {
    pub detecting: bool,
    pub paused: bool,
    pub current: Option<DetectionInterval>,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    tracing::error!("Error reading detection log: {e}");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "STORE_ERROR",
        "Failed to fetch logs.",
    )
}

fn parse_date(query: &DateQuery) -> Result<Option<NaiveDate>, ApiError> {
    match query.date.as_deref().filter(|d| !d.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                api_error(
                    StatusCode::BAD_REQUEST,
                    "INVALID_DATE",
                    format!("Invalid date {raw:?}, expected YYYY-MM-DD"),
                )
            }),
        None => Ok(None),
    }
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// One multipart chunk carrying a JPEG frame.
fn frame_part(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--");
    part.extend_from_slice(FRAME_BOUNDARY.as_bytes());
    part.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// GET /video_feed
///
/// Streams every frame published after the client connects, until the
/// client disconnects. `AppState` holds a sender of the live feed, so the
/// stream never ends on its own; server shutdown relies on the runtime's
/// shutdown timeout to drop open streams.
async fn video_feed(State(state): State<AppState>) -> Response {
    let receiver: LiveFeedReceiver = state.live.subscribe();

    let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
        loop {
            if receiver.changed().await.is_err() {
                return None;
            }
            let frame = receiver.borrow_and_update().clone();
            if let Some(frame) = frame {
                return Some((Ok::<_, Infallible>(frame_part(&frame.jpeg)), receiver));
            }
        }
    });

    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={FRAME_BOUNDARY}"),
        )],
        Body::from_stream(stream),
    )
        .into_response()
}

/// GET /api/logs[?date=YYYY-MM-DD]
async fn logs(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<LogRecord>>, ApiError> {
    let records = match parse_date(&query)? {
        Some(date) => state.store.by_date(date),
        None => state.store.all(),
    }
    .map_err(store_error)?;
    Ok(Json(records))
}

/// GET /api/detection_logs
async fn detection_logs(
    State(state): State<AppState>,
) -> Result<Json<Vec<DetectionTime>>, ApiError> {
    let records = state.store.all().map_err(store_error)?;
    Ok(Json(
        records
            .into_iter()
            .map(|r| DetectionTime {
                date: r.date,
                detection_time: r.detection_time,
            })
            .collect(),
    ))
}

/// GET /api/analysis
async fn analysis(State(state): State<AppState>) -> Result<Json<AnalysisReport>, ApiError> {
    let records = state.store.all().map_err(store_error)?;
    Ok(Json(analyze(&records)))
}

/// GET /api/footages[?date=YYYY-MM-DD]
async fn footages(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let date = parse_date(&query)?.map(|d| d.format("%Y-%m-%d").to_string());

    let Some(dir) = state.footage_dir.as_ref() else {
        return Ok(Json(Vec::new()));
    };
    if !dir.exists() {
        return Ok(Json(Vec::new()));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        tracing::error!("Error fetching footages from {dir:?}: {e}");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "FOOTAGE_ERROR",
            "Failed to fetch footages.",
        )
    })?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| date.as_ref().map_or(true, |d| name.contains(d.as_str())))
        .collect();
    names.sort();
    Ok(Json(names))
}

/// Clip names are single path components made of safe characters.
fn is_footage_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// GET /footages/:name
async fn footage_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if !is_footage_name(&name) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_NAME",
            format!("Invalid footage name {name:?}"),
        ));
    }
    let not_found = || {
        api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("No footage named {name:?}"),
        )
    };

    let Some(dir) = state.footage_dir.as_ref() else {
        return Err(not_found());
    };
    let path = dir.join(&name);
    if !path.is_file() {
        return Err(not_found());
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::error!("Error reading footage {path:?}: {e}");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "FOOTAGE_ERROR",
            "Failed to read footage.",
        )
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, FOOTAGE_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/status
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (detecting, current) = {
        let tracker = state.tracker.lock().unwrap_or_else(|e| e.into_inner());
        (tracker.is_open(), tracker.current().cloned())
    };
    Json(StatusResponse {
        detecting,
        paused: state.control.as_ref().map_or(false, |c| c.is_paused()),
        current,
        stats: state.stats.snapshot(),
    })
}

/// Build the router without binding it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/video_feed", get(video_feed))
        .route("/api/logs", get(logs))
        .route("/api/detection_logs", get(detection_logs))
        .route("/api/analysis", get(analysis))
        .route("/api/footages", get(footages))
        .route("/footages/:name", get(footage_file))
        .route("/api/status", get(status))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: AppState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(state);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Wildwatch server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
