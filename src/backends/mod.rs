//! Built-in backend adapters.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, Response};

use crate::backend::BackendKind;
use crate::error::{BackendError, BackendStage};

/// OpenAI-compatible hosted transcription API.
pub mod hosted_api;

/// whisper.cpp `whisper-cli` executable.
pub mod local_binary;

/// In-process whisper.cpp via `whisper-rs`.
pub mod local_model;

/// Another instance of this gateway.
pub mod remote_peer;

const USER_AGENT: &str = concat!("whisper-gateway/", env!("CARGO_PKG_VERSION"));

/// Locate the model file for `name` under `models_dir`.
///
/// A name that already points at a file is used as-is. Otherwise `{name}.bin` and the upstream
/// `ggml-{name}.bin` spelling are tried, defaulting to `{name}.bin`.
pub fn resolve_model_path(models_dir: &Path, name: &str) -> PathBuf {
    let direct = Path::new(name);
    if direct.is_file() {
        return direct.to_path_buf();
    }

    let plain = models_dir.join(format!("{name}.bin"));
    if plain.is_file() {
        return plain;
    }
    let ggml = models_dir.join(format!("ggml-{name}.bin"));
    if ggml.is_file() {
        return ggml;
    }
    plain
}

// Clients are built per call so a blocking client is never dropped inside an async runtime.
pub(crate) fn http_client(kind: BackendKind, timeout: Duration) -> Result<Client, BackendError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|err| BackendError::new(kind, BackendStage::Request, err.to_string()))
}

/// Turn a non-2xx response into a `Request` failure carrying the status and body.
pub(crate) fn ensure_success(
    kind: BackendKind,
    response: Response,
) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(BackendError::new(
        kind,
        BackendStage::Request,
        format!("status {}: {}", status.as_u16(), body.trim()),
    ))
}

pub(crate) fn request_error(kind: BackendKind, err: reqwest::Error) -> BackendError {
    let message = if err.is_timeout() {
        format!("timed out: {err}")
    } else {
        err.to_string()
    };
    BackendError::new(kind, BackendStage::Request, message)
}
