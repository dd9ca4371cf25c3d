use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, body::Body};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use sotto::config::AUTO_DEVICE_ID;
use sotto::{
    CancelToken, EventSink, TranscribeRequest, Transcriber, TranscriptionEvent, accelerator_status,
    artifacts,
};

#[derive(Parser, Debug)]
#[command(name = "sotto-server")]
#[command(about = "Local speech-to-text sidecar over HTTP")]
struct Params {
    /// Directory holding the model weights and vocabulary.
    /// Defaults to `SOTTO_MODELS_DIR`, then the per-user data directory.
    #[arg(short = 'm', long = "models-dir")]
    models_dir: Option<PathBuf>,

    /// Display name(s) of the machine's graphics adapters, as enumerated by the
    /// embedding application. Used by `/status` to report accelerator availability.
    #[arg(long = "adapter")]
    adapters: Vec<String>,

    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 38081)]
    port: u16,

    /// Load the model at startup instead of on the first request.
    #[arg(long = "preload", default_value_t = false)]
    preload: bool,
}

#[derive(Clone)]
struct AppState {
    transcriber: Arc<Transcriber>,
    adapters: Arc<Vec<String>>,
    active_cancel: Arc<Mutex<Option<CancelToken>>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    model_loaded: bool,
    device: String,
    accelerator_available: bool,
    accelerator_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoadBody {
    #[serde(default = "default_use_acceleration")]
    use_acceleration: bool,
    #[serde(default = "default_device_id")]
    device_id: i32,
}

fn default_use_acceleration() -> bool {
    true
}

fn default_device_id() -> i32 {
    AUTO_DEVICE_ID
}

#[derive(Debug, Serialize)]
struct LoadResponse {
    status: &'static str,
    device: String,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    status: &'static str,
    cancelled: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Event sink that writes each event as one SSE frame (`data: {json}\n\n`).
///
/// Terminal events also feed the transcription outcome counter.
struct SseEventSink<W: Write> {
    writer: W,
}

impl<W: Write> EventSink for SseEventSink<W> {
    fn emit(&mut self, event: TranscriptionEvent) -> sotto::Result<()> {
        if event.is_terminal() {
            let outcome = match event {
                TranscriptionEvent::Success { .. } => "success",
                _ => "error",
            };
            metrics::record_transcription(outcome);
        }

        let json = serde_json::to_string(&event)?;
        self.writer.write_all(b"data: ")?;
        self.writer.write_all(json.as_bytes())?;
        self.writer.write_all(b"\n\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    sotto::logging::init();

    if let Err(err) = run().await {
        error!(error = ?err, "sotto-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    metrics::init();

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let models_dir = params
        .models_dir
        .unwrap_or_else(artifacts::default_models_dir);
    info!(models_dir = %models_dir.display(), "using models directory");

    let state = AppState {
        transcriber: Arc::new(Transcriber::new(models_dir)),
        adapters: Arc::new(params.adapters),
        active_cancel: Arc::new(Mutex::new(None)),
    };

    if params.preload {
        let transcriber = state.transcriber.clone();
        tokio::task::spawn_blocking(move || {
            match transcriber.load(true, AUTO_DEVICE_ID) {
                Ok(device) => info!(%device, "model preloaded"),
                Err(err) => warn!(error = %err, "model preload failed, will retry on demand"),
            }
        });
    }

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/load", post(load))
        .route("/unload", post(unload))
        .route("/transcribe", post(transcribe))
        .route("/cancel", post(cancel))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn root() -> &'static str {
    "sotto-server: POST /transcribe (JSON body: {\"audio_path\": \"...\"})"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "sotto",
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let accelerator = accelerator_status(&state.adapters);

    // Waits for any in-flight request to release the model slot.
    let service = tokio::task::spawn_blocking(move || state.transcriber.status())
        .await
        .unwrap_or_else(|_| sotto::ServiceStatus {
            model_loaded: false,
            device: "Error".to_owned(),
        });

    Json(StatusResponse {
        model_loaded: service.model_loaded,
        device: service.device,
        accelerator_available: accelerator.available,
        accelerator_name: accelerator.name,
    })
}

async fn load(
    State(state): State<AppState>,
    Json(body): Json<LoadBody>,
) -> std::result::Result<Json<LoadResponse>, AppError> {
    let transcriber = state.transcriber.clone();
    let device = tokio::task::spawn_blocking(move || {
        transcriber.load(body.use_acceleration, body.device_id)
    })
    .await
    .map_err(|err| AppError::internal(err.to_string()))?
    .map_err(|err| AppError::internal(err.to_string()))?;

    Ok(Json(LoadResponse {
        status: "ok",
        device,
    }))
}

async fn unload(State(state): State<AppState>) -> Json<OkResponse> {
    let transcriber = state.transcriber.clone();
    let _ = tokio::task::spawn_blocking(move || transcriber.unload()).await;
    Json(OkResponse { status: "ok" })
}

async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    let slot = state
        .active_cancel
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    let cancelled = match slot.as_ref() {
        Some(token) => {
            token.cancel();
            true
        }
        None => false,
    };

    Json(CancelResponse {
        status: "ok",
        cancelled,
    })
}

async fn transcribe(
    State(state): State<AppState>,
    Json(request): Json<TranscribeRequest>,
) -> Response {
    let token = CancelToken::new();
    {
        let mut slot = state
            .active_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(token.clone());
    }

    let transcriber = state.transcriber.clone();
    let (out_tx, out_rx) = tokio::io::duplex(64 * 1024);

    tokio::task::spawn_blocking(move || {
        let mut sink = SseEventSink {
            writer: SyncIoBridge::new(out_tx),
        };
        if let Err(err) = transcriber.transcribe(&request, &token, &mut sink) {
            // The sink failed, so the client is gone; nothing left to report to.
            warn!(error = %err, "event stream aborted");
        }
    });

    let body = Body::from_stream(ReaderStream::new(out_rx));
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/event-stream; charset=utf-8"),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response()
}
