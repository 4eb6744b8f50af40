use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use metrics::Outcome;
use whisper_gateway::backends::hosted_api::{DEFAULT_BASE_URL, DEFAULT_MODEL, HostedApiConfig};
use whisper_gateway::backends::local_binary::DEFAULT_WHISPER_BIN;
use whisper_gateway::config::{DEFAULT_DATA_DIR, DEFAULT_FFMPEG, DEFAULT_MODELS_DIR};
use whisper_gateway::{
    BackendKind, ComputeMode, Error, Gateway, GatewayConfig, SettingsSnapshot,
    TranscriptionRequest, TranscriptionResult,
};

#[derive(Parser, Debug)]
#[command(name = "whisper-gateway-server")]
#[command(about = "HTTP gateway routing audio to local, remote, or hosted Whisper backends")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 8000)]
    port: u16,

    /// Directory for per-request temporary files.
    #[arg(long = "data-dir", env = "WHISPER_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Directory holding `{model}.bin` files.
    #[arg(long = "models-dir", env = "WHISPER_MODELS_DIR", default_value = DEFAULT_MODELS_DIR)]
    models_dir: PathBuf,

    /// Model name (or path to a model file).
    #[arg(long = "model", env = "WHISPER_MODEL", default_value = "base")]
    model: String,

    /// Default transcription language (`auto` to detect).
    #[arg(long = "language", env = "WHISPER_LANG", default_value = "zh")]
    language: String,

    /// Thread count for local engines.
    #[arg(long = "threads", env = "WHISPER_THREADS", default_value_t = 4)]
    threads: usize,

    /// Initial compute mode: local, remote or auto.
    #[arg(long = "compute-mode", env = "COMPUTE_MODE", default_value = "local")]
    compute_mode: String,

    /// Base URL of a peer gateway.
    #[arg(long = "remote-host", env = "REMOTE_WHISPER_HOST")]
    remote_host: Option<String>,

    /// Backends to enable.
    #[arg(
        long = "backends",
        value_delimiter = ',',
        default_value = "local-model,remote-peer"
    )]
    backends: Vec<String>,

    /// Pin every request to one backend unless the request names its own.
    #[arg(long = "backend")]
    backend: Option<String>,

    /// whisper.cpp command line binary.
    #[arg(long = "whisper-bin", env = "WHISPER_BIN", default_value = DEFAULT_WHISPER_BIN)]
    whisper_bin: PathBuf,

    /// ffmpeg binary used to normalize uploads.
    #[arg(long = "ffmpeg", env = "FFMPEG_BIN", default_value = DEFAULT_FFMPEG)]
    ffmpeg: PathBuf,

    /// API key for the hosted backend.
    #[arg(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long = "openai-base-url", default_value = DEFAULT_BASE_URL)]
    openai_base_url: String,

    /// Hosted transcription model.
    #[arg(long = "openai-model", default_value = DEFAULT_MODEL)]
    openai_model: String,

    /// Timeout for availability probes (seconds).
    #[arg(long = "probe-timeout-secs", default_value_t = 5)]
    probe_timeout_secs: u64,

    /// Timeout for each transcription call (seconds).
    #[arg(long = "transcribe-timeout-secs", default_value_t = 300)]
    transcribe_timeout_secs: u64,

    /// Never retry a failed `local`/`remote` request on another backend.
    #[arg(long = "no-fallback")]
    no_fallback: bool,

    /// Maximum request body size (bytes).
    #[arg(long = "max-bytes", default_value_t = 100 * 1024 * 1024)]
    max_bytes: usize,
}

impl Params {
    fn gateway_config(&self) -> Result<GatewayConfig> {
        let compute_mode: ComputeMode = self
            .compute_mode
            .parse()
            .context("invalid --compute-mode")?;
        let backend = self
            .backend
            .as_deref()
            .map(str::parse::<BackendKind>)
            .transpose()
            .context("invalid --backend")?;
        let backends = self
            .backends
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| raw.parse::<BackendKind>())
            .collect::<whisper_gateway::Result<Vec<_>>>()
            .context("invalid --backends")?;
        let transcribe_timeout = Duration::from_secs(self.transcribe_timeout_secs);

        Ok(GatewayConfig {
            data_dir: self.data_dir.clone(),
            models_dir: self.models_dir.clone(),
            backends,
            whisper_bin: self.whisper_bin.clone(),
            ffmpeg: self.ffmpeg.clone(),
            hosted: HostedApiConfig {
                api_key: self.openai_api_key.clone(),
                base_url: self.openai_base_url.clone(),
                model: self.openai_model.clone(),
                timeout: transcribe_timeout,
            },
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            transcribe_timeout,
            settings: SettingsSnapshot {
                compute_mode,
                language: self.language.clone(),
                remote_host: self.remote_host.clone(),
                threads: self.threads.max(1),
                model: self.model.clone(),
                backend,
                allow_fallback: !self.no_fallback,
            },
        })
    }
}

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        if err.is_invalid_input() {
            Self::bad_request(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            detail: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ModeForm {
    mode: String,
}

#[derive(Debug, Deserialize)]
struct HostForm {
    host: String,
}

#[tokio::main]
async fn main() {
    whisper_gateway::logging::init();

    if let Err(err) = run().await {
        error!(error = ?err, "whisper-gateway-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    if let Err(err) = metrics::init() {
        warn!(error = ?err, "metrics disabled (init failed)");
    }

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let gateway = Gateway::from_config(params.gateway_config()?)
        .context("failed to initialize gateway")?;

    let state = AppState {
        gateway: Arc::new(gateway),
    };

    let app = router(state)
        .layer(DefaultBodyLimit::max(params.max_bytes))
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

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/transcribe", post(transcribe))
        .route("/config", get(get_config))
        .route("/config/compute_mode", post(set_compute_mode))
        .route("/config/remote_host", post(set_remote_host))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route_layer(from_fn(metrics::track_http_metrics))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "whisper-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "transcribe": "/transcribe",
            "config": "/config",
            "set_compute_mode": "/config/compute_mode",
            "set_remote_host": "/config/remote_host",
            "metrics": "/metrics",
        },
        "compute_modes": ComputeMode::ALL,
        "backends": BackendKind::ALL,
    }))
}

async fn health(State(state): State<AppState>) -> Result<Response, AppError> {
    let gateway = state.gateway.clone();
    let report = tokio::task::spawn_blocking(move || gateway.health())
        .await
        .map_err(|err| AppError::internal(format!("health check aborted: {err}")))?;
    Ok(Json(report).into_response())
}

async fn transcribe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let request = read_transcribe_form(multipart).await?;

    let gateway = state.gateway.clone();
    let outcome = tokio::task::spawn_blocking(move || gateway.run(&request))
        .await
        .map_err(|err| AppError::internal(format!("transcription aborted: {err}")))?;

    match outcome {
        Ok(result) => {
            let label = if result.fallback_from.is_some() {
                Outcome::Fallback
            } else {
                Outcome::Ok
            };
            metrics::record_transcription(result.backend.as_str(), label);
            Ok(Json(transcribe_body(&result)))
        }
        Err(err) => {
            let backend = match &err {
                Error::Backend { source, .. } => source.backend().as_str(),
                _ => "none",
            };
            metrics::record_transcription(backend, Outcome::Error);
            Err(err.into())
        }
    }
}

/// Collect the multipart form into a request; blank optional fields count as absent.
async fn read_transcribe_form(mut multipart: Multipart) -> Result<TranscriptionRequest, AppError> {
    let mut audio: Option<(Vec<u8>, Option<String>)> = None;
    let mut fields: Vec<(String, String)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "audio_file" {
            let filename = field.file_name().map(str::to_owned);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::bad_request(err.to_string()))?;
            audio = Some((bytes.to_vec(), filename));
        } else {
            let value = field
                .text()
                .await
                .map_err(|err| AppError::bad_request(err.to_string()))?;
            fields.push((name, value));
        }
    }

    let Some((bytes, filename)) = audio else {
        return Err(AppError::bad_request("missing multipart field 'audio_file'"));
    };

    let mut request = TranscriptionRequest::new(bytes);
    if let Some(filename) = filename {
        request = request.with_filename(filename);
    }
    for (name, value) in fields {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        request = match name.as_str() {
            "language" => request.with_language(value),
            "compute_mode" => request.with_mode(value.parse::<ComputeMode>()?),
            "backend" => request.with_backend(value.parse::<BackendKind>()?),
            "remote_host" => request.with_remote_host(value),
            "threads" => {
                let threads = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| AppError::bad_request(format!("invalid threads '{value}'")))?;
                request.with_threads(threads)
            }
            _ => request,
        };
    }
    Ok(request)
}

fn transcribe_body(result: &TranscriptionResult) -> Value {
    let host = result.metadata.host.clone().or_else(|| {
        (result.compute_mode == ComputeMode::Local).then(|| "localhost".to_owned())
    });
    json!({
        "text": result.text,
        "language": result.language,
        "service_info": {
            "compute_mode": result.compute_mode,
            "backend": result.backend,
            "model": result.metadata.model,
            "host": host,
            "threads": result.metadata.threads,
            "fallback_from": result.fallback_from,
        },
        "file_info": {
            "filename": result.file.filename,
            "size": result.file.size,
        },
    })
}

async fn get_config(State(state): State<AppState>) -> Json<Value> {
    let settings = state.gateway.settings().snapshot();
    Json(json!({
        "compute_mode": settings.compute_mode,
        "model": settings.model,
        "language": settings.language,
        "threads": settings.threads,
        "remote_host": settings.remote_host,
        "backend": settings.backend,
        "allow_fallback": settings.allow_fallback,
        "data_dir": state.gateway.data_dir(),
    }))
}

async fn set_compute_mode(
    State(state): State<AppState>,
    Form(form): Form<ModeForm>,
) -> Result<Json<Value>, AppError> {
    let mode = state.gateway.settings().set_compute_mode_str(&form.mode)?;
    info!(%mode, "compute mode updated");
    Ok(Json(json!({
        "message": format!("compute mode set to: {mode}"),
        "compute_mode": mode,
    })))
}

async fn set_remote_host(
    State(state): State<AppState>,
    Form(form): Form<HostForm>,
) -> Json<Value> {
    let host = state
        .gateway
        .settings()
        .set_remote_host(Some(form.host.as_str()));
    info!(remote_host = ?host, "remote host updated");
    Json(json!({
        "message": match &host {
            Some(host) => format!("remote host set to: {host}"),
            None => "remote host cleared".to_owned(),
        },
        "remote_host": host,
    }))
}
