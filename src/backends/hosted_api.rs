use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use tracing::debug;

use crate::backend::{Backend, BackendKind, CallContext, Transcript};
use crate::error::{BackendError, BackendStage};
use crate::language::Language;
use crate::scoped::ScopedAudioFile;

use super::{ensure_success, http_client, request_error};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "whisper-1";

const KIND: BackendKind = BackendKind::HostedApi;

#[derive(Debug, Clone)]
pub struct HostedApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for HostedApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Uploads the original file to an OpenAI-compatible `/audio/transcriptions` endpoint.
#[derive(Debug, Clone)]
pub struct HostedApiBackend {
    config: HostedApiConfig,
}

impl HostedApiBackend {
    pub fn new(config: HostedApiConfig) -> Self {
        Self { config }
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

impl Backend for HostedApiBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn probe(&self, _ctx: &CallContext) -> bool {
        self.api_key().is_some()
    }

    fn transcribe(
        &self,
        audio: &ScopedAudioFile,
        language: &Language,
        _ctx: &CallContext,
    ) -> Result<Transcript, BackendError> {
        let api_key = self.api_key().ok_or_else(|| {
            BackendError::new(KIND, BackendStage::Request, "no API key configured")
        })?;

        let file = Part::file(audio.path())
            .map_err(|err| BackendError::new(KIND, BackendStage::Request, err.to_string()))?;
        let form = upload_form(file, &self.config.model, language);

        debug!(
            endpoint = %self.endpoint(),
            model = %self.config.model,
            "sending hosted transcription"
        );
        let response = http_client(KIND, self.config.timeout)?
            .post(self.endpoint())
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .map_err(|err| request_error(KIND, err))?;

        let text = ensure_success(KIND, response)?
            .text()
            .map_err(|err| BackendError::new(KIND, BackendStage::Response, err.to_string()))?;

        Ok(Transcript::new(text, self.config.model.clone()))
    }
}

fn upload_form(file: Part, model: &str, language: &Language) -> Form {
    let form = Form::new()
        .part("file", file)
        .text("model", model.to_owned())
        .text("response_format", "text");
    match language.hint() {
        Some(code) => form.text("language", code.to_owned()),
        None => form,
    }
}
