//! Local control server: trigger captures by hand and browse the results.
//!
//! One capture at a time: an explicit mutex guards the browser launch, and a
//! concurrent trigger gets `429` instead of being queued. `/status` derives
//! its `capturing` flag from the same mutex, so there is no separate boolean
//! to drift out of sync.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::capture::{self, PageInfo};
use crate::config::CaptureConfig;
use crate::paths;

#[derive(Clone)]
pub struct AppState {
    config: Arc<CaptureConfig>,
    capture_lock: Arc<Mutex<()>>,
    last_result: Arc<RwLock<Option<CaptureReport>>>,
}

impl AppState {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config: Arc::new(config),
            capture_lock: Arc::new(Mutex::new(())),
            last_result: Arc::new(RwLock::new(None)),
        }
    }
}

/// What one `/capture` invocation reported, also cached for `/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    /// `ok`, `warning`, or `error`.
    pub status: String,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageInfo>,
    pub completed_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    capturing: bool,
    last_result: Option<CaptureReport>,
}

#[derive(Debug, Serialize)]
struct BusyResponse {
    status: &'static str,
    message: &'static str,
}

pub fn router(state: AppState) -> Router {
    let captures_dir = state.config.captures_dir.clone();
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/capture", post(trigger_capture))
        .nest_service("/captures", ServeDir::new(captures_dir))
        .with_state(state)
}

/// Binds the server and runs it until the process is terminated.
pub async fn serve(config: CaptureConfig, port: u16) -> anyhow::Result<()> {
    paths::ensure_captures_dir(&config.captures_dir)?;
    info!(dir = %config.captures_dir.display(), "captures directory ready");

    let app = router(AppState::new(config));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("control server listening on http://localhost:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(CONTROL_PANEL_HTML)
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let capturing = state.capture_lock.try_lock().is_err();
    let last_result = state.last_result.read().await.clone();
    Json(StatusResponse { capturing, last_result })
}

async fn trigger_capture(State(state): State<AppState>) -> Response {
    // Reject rather than queue: overlapping browser launches are never safe.
    let Ok(_guard) = state.capture_lock.try_lock() else {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(BusyResponse {
                status: "busy",
                message: "a capture is already running",
            }),
        )
            .into_response();
    };

    let (code, report) = match capture::run(&state.config).await {
        Ok(result) => {
            if let Err(err) = paths::clean_old_captures(&state.config.captures_dir, state.config.keep_last)
            {
                warn!("could not prune old captures: {err:#}");
            }

            let (code, status, message) = if result.is_valid() {
                (StatusCode::OK, "ok", "capture completed".to_string())
            } else {
                (
                    StatusCode::ACCEPTED,
                    "warning",
                    "capture produced but failed size validation".to_string(),
                )
            };
            let report = CaptureReport {
                status: status.to_string(),
                message,
                timestamp: result.timestamp.clone(),
                file_url: Some(format!("/captures/{}", result.file_name)),
                file_name: Some(result.file_name),
                file_size: Some(result.file_size),
                page_info: result.page_info,
                completed_at: Utc::now().to_rfc3339(),
            };
            (code, report)
        }
        Err(err) => {
            error!("capture failed: {err}");
            let report = CaptureReport {
                status: "error".to_string(),
                message: err.to_string(),
                timestamp: Utc::now().format(paths::TIMESTAMP_FORMAT).to_string(),
                file_name: None,
                file_url: None,
                file_size: None,
                page_info: None,
                completed_at: Utc::now().to_rfc3339(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, report)
        }
    };

    *state.last_result.write().await = Some(report.clone());
    (code, Json(report)).into_response()
}

const CONTROL_PANEL_HTML: &str = r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="utf-8" />
<title>windybot</title>
<meta name="viewport" content="width=device-width, initial-scale=1" />
<style>
body { font-family: system-ui, sans-serif; margin: 0; padding: 2rem; background: #f4f6fb; }
main { max-width: 720px; margin: 0 auto; background: #fff; padding: 2rem; border-radius: 12px; }
button { background: #2563eb; color: #fff; border: none; border-radius: 8px;
         padding: 0.7rem 1.4rem; font-size: 1rem; cursor: pointer; }
button:disabled { background: #94a3b8; cursor: not-allowed; }
pre { background: #0f172a; color: #cffafe; padding: 1rem; border-radius: 8px;
      white-space: pre-wrap; word-break: break-word; }
img { max-width: 100%; border-radius: 8px; margin-top: 1rem; }
</style>
</head>
<body>
<main>
  <h1>windybot</h1>
  <p>Dispara una captura del radar y revisa el resultado más reciente.</p>
  <button id="capture">Tomar captura</button>
  <p id="state"></p>
  <pre id="output">Pulsa el botón para empezar…</pre>
  <div id="preview"></div>
</main>
<script>
const button = document.getElementById('capture');
const output = document.getElementById('output');
const preview = document.getElementById('preview');
const state = document.getElementById('state');

async function refreshStatus() {
  try {
    const data = await (await fetch('/status')).json();
    state.textContent = data.capturing
      ? 'Captura en progreso…'
      : (data.lastResult ? 'Última: ' + data.lastResult.status + ' · ' + (data.lastResult.fileName || '') : '');
  } catch (err) {
    state.textContent = '';
  }
}

button.addEventListener('click', async () => {
  button.disabled = true;
  output.textContent = 'Ejecutando captura…';
  preview.innerHTML = '';
  try {
    const data = await (await fetch('/capture', { method: 'POST' })).json();
    output.textContent = JSON.stringify(data, null, 2);
    if (data.fileUrl) {
      const img = new Image();
      img.src = data.fileUrl + '?t=' + Date.now();
      preview.appendChild(img);
    }
  } catch (err) {
    output.textContent = 'Error: ' + err.message;
  } finally {
    button.disabled = false;
    refreshStatus();
  }
});

refreshStatus();
</script>
</body>
</html>"#;
