use crate::backend::BackendKind;
use crate::mode::ComputeMode;

/// One upload plus the caller's optional overrides.
///
/// Every override falls back to the gateway's current settings when absent.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionRequest {
    audio: Vec<u8>,
    filename: Option<String>,
    language: Option<String>,
    mode: Option<ComputeMode>,
    backend: Option<BackendKind>,
    remote_host: Option<String>,
    threads: Option<usize>,
}

impl TranscriptionRequest {
    pub fn new(audio: impl Into<Vec<u8>>) -> Self {
        Self {
            audio: audio.into(),
            ..Self::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_mode(mut self, mode: ComputeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn mode(&self) -> Option<ComputeMode> {
        self.mode
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    pub fn remote_host(&self) -> Option<&str> {
        self.remote_host.as_deref()
    }

    pub fn threads(&self) -> Option<usize> {
        self.threads
    }
}
