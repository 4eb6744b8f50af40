use std::fmt;

use thiserror::Error;

use crate::backend::BackendKind;

/// The gateway's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The gateway's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so the server (and any other embedder) can map
/// each variant onto its own response shape.
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing, e.g. no remote host while `remote` mode is requested.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No backend is reachable at all.
    #[error("{0}")]
    Availability(String),

    /// The requested mode or backend cannot be satisfied by the current availability snapshot.
    #[error("{0}")]
    Selection(String),

    /// Adapter-level failure. When a fallback was attempted, `primary` holds the first failure.
    #[error("{source}")]
    Backend {
        source: BackendError,
        primary: Option<BackendError>,
    },

    /// Temporary file creation failed.
    #[error("resource error: {0}")]
    Resource(String),

    /// A compute mode outside `local | remote | auto`.
    #[error("invalid compute mode '{0}' (expected 'local', 'remote' or 'auto')")]
    InvalidMode(String),

    /// A backend name outside the four known kinds.
    #[error(
        "invalid backend '{0}' (expected 'hosted-api', 'local-binary', 'local-model' or 'remote-peer')"
    )]
    InvalidBackend(String),
}

impl Error {
    pub(crate) fn selection(message: impl Into<String>) -> Self {
        Self::Selection(message.into())
    }

    /// Whether this error stems from malformed caller input rather than backend state.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidMode(_) | Self::InvalidBackend(_))
    }
}

impl From<BackendError> for Error {
    fn from(source: BackendError) -> Self {
        Self::Backend {
            source,
            primary: None,
        }
    }
}

/// Where inside an adapter a failure happened.
///
/// Timeouts are tagged with the stage that ran out of time. Callers only ever see one message;
/// the stage is kept for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStage {
    /// Normalizing the upload to mono 16kHz wav.
    Transcode,
    /// Running the local engine executable or in-process inference.
    Engine,
    /// Sending a request to a hosted API or peer.
    Request,
    /// Decoding a hosted API or peer response.
    Response,
    /// The engine finished but its output artifact was missing or unreadable.
    Output,
    /// Loading an in-process model.
    ModelLoad,
}

impl BackendStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcode => "transcode",
            Self::Engine => "engine",
            Self::Request => "request",
            Self::Response => "response",
            Self::Output => "output",
            Self::ModelLoad => "model_load",
        }
    }
}

impl fmt::Display for BackendStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure produced by one backend adapter.
#[derive(Debug, Clone, Error)]
#[error("{backend} {stage} failed: {message}")]
pub struct BackendError {
    backend: BackendKind,
    stage: BackendStage,
    message: String,
}

impl BackendError {
    pub fn new(backend: BackendKind, stage: BackendStage, message: impl Into<String>) -> Self {
        Self {
            backend,
            stage,
            message: message.into(),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn stage(&self) -> BackendStage {
        self.stage
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_message_names_backend_and_stage() {
        let err = BackendError::new(BackendKind::LocalBinary, BackendStage::Transcode, "exit 1");
        assert_eq!(err.to_string(), "local-binary transcode failed: exit 1");
    }

    #[test]
    fn backend_variant_displays_terminal_failure_only() {
        let err = Error::Backend {
            source: BackendError::new(BackendKind::RemotePeer, BackendStage::Request, "refused"),
            primary: Some(BackendError::new(
                BackendKind::LocalModel,
                BackendStage::Engine,
                "boom",
            )),
        };
        assert_eq!(err.to_string(), "remote-peer request failed: refused");
    }

    #[test]
    fn invalid_input_covers_mode_and_backend() {
        assert!(Error::InvalidMode("x".into()).is_invalid_input());
        assert!(Error::InvalidBackend("x".into()).is_invalid_input());
        assert!(!Error::Selection("x".into()).is_invalid_input());
    }
}
