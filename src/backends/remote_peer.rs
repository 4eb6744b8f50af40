use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::backend::{Backend, BackendKind, CallContext, Transcript};
use crate::error::{BackendError, BackendStage};
use crate::language::Language;
use crate::scoped::ScopedAudioFile;

use super::{ensure_success, http_client, request_error};

/// Model label reported when the peer does not name its own.
pub const REMOTE_MODEL_LABEL: &str = "remote_whisper";

const KIND: BackendKind = BackendKind::RemotePeer;

/// Forwards uploads to another gateway instance's `/transcribe`.
#[derive(Debug, Clone)]
pub struct RemotePeerBackend {
    probe_timeout: Duration,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct PeerResponse {
    text: String,
    #[serde(default)]
    service_info: Option<PeerServiceInfo>,
}

#[derive(Debug, Deserialize)]
struct PeerServiceInfo {
    #[serde(default)]
    model: Option<String>,
}

impl RemotePeerBackend {
    pub fn new(probe_timeout: Duration, timeout: Duration) -> Self {
        Self {
            probe_timeout,
            timeout,
        }
    }
}

impl Backend for RemotePeerBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn probe(&self, ctx: &CallContext) -> bool {
        let Some(host) = ctx.remote_host.as_deref() else {
            return false;
        };
        let Ok(client) = http_client(KIND, self.probe_timeout) else {
            return false;
        };
        match client.get(format!("{host}/health")).send() {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                debug!(%host, error = %err, "remote peer health check failed");
                false
            }
        }
    }

    fn transcribe(
        &self,
        audio: &ScopedAudioFile,
        language: &Language,
        ctx: &CallContext,
    ) -> Result<Transcript, BackendError> {
        let host = ctx.remote_host.as_deref().ok_or_else(|| {
            BackendError::new(KIND, BackendStage::Request, "remote host not configured")
        })?;

        let file = Part::file(audio.path())
            .map_err(|err| BackendError::new(KIND, BackendStage::Request, err.to_string()))?;
        // The peer runs this gateway, which understands `auto` itself.
        let form = Form::new()
            .part("audio_file", file)
            .text("language", language.as_str().to_owned());

        debug!(%host, %language, "forwarding to remote peer");
        let response = http_client(KIND, self.timeout)?
            .post(format!("{host}/transcribe"))
            .multipart(form)
            .send()
            .map_err(|err| request_error(KIND, err))?;

        let body: PeerResponse = ensure_success(KIND, response)?
            .json()
            .map_err(|err| BackendError::new(KIND, BackendStage::Response, err.to_string()))?;

        let model = body
            .service_info
            .and_then(|info| info.model)
            .unwrap_or_else(|| REMOTE_MODEL_LABEL.to_owned());
        Ok(Transcript::new(body.text, model).with_host(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::HttpStub;

    fn backend() -> RemotePeerBackend {
        RemotePeerBackend::new(Duration::from_secs(5), Duration::from_secs(5))
    }

    fn ctx(host: Option<&str>) -> CallContext {
        CallContext {
            remote_host: host.map(str::to_owned),
            threads: 4,
            model: "base".into(),
        }
    }

    #[test]
    fn probe_is_false_without_a_host() {
        assert!(!backend().probe(&ctx(None)));
    }

    #[test]
    fn probe_requires_a_200_health_response() {
        let up = HttpStub::start(vec![(200, "{\"status\":\"ok\"}")]);
        assert!(backend().probe(&ctx(Some(up.url()))));
        assert!(up.requests()[0].starts_with("GET /health"));

        let down = HttpStub::start(vec![(503, "{}")]);
        assert!(!backend().probe(&ctx(Some(down.url()))));
        down.requests();
    }

    #[test]
    fn probe_is_false_when_nothing_listens() -> anyhow::Result<()> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let url = format!("http://{}", listener.local_addr()?);
        drop(listener);
        assert!(!backend().probe(&ctx(Some(&url))));
        Ok(())
    }

    #[test]
    fn forwards_audio_and_language() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let audio = ScopedAudioFile::create(dir.path(), Some("clip.mp3"), b"audio-bytes")?;
        let stub = HttpStub::start(vec![(
            200,
            r#"{"text":"peer text","service_info":{"model":"small"}}"#,
        )]);

        let transcript =
            backend().transcribe(&audio, &Language::Auto, &ctx(Some(stub.url())))?;
        assert_eq!(transcript.text, "peer text");
        assert_eq!(transcript.model, "small");
        assert_eq!(transcript.host.as_deref(), Some(stub.url()));

        let requests = stub.requests();
        let request = &requests[0];
        assert!(request.starts_with("POST /transcribe"));
        assert!(request.contains("name=\"audio_file\""));
        assert!(request.contains("audio-bytes"));
        assert!(request.contains("name=\"language\"\r\n\r\nauto"));
        Ok(())
    }

    #[test]
    fn missing_model_uses_the_remote_label() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let audio = ScopedAudioFile::create(dir.path(), None, b"audio")?;
        let stub = HttpStub::start(vec![(200, r#"{"text":"hi"}"#)]);

        let transcript = backend().transcribe(
            &audio,
            &Language::Code("zh".into()),
            &ctx(Some(stub.url())),
        )?;
        assert_eq!(transcript.model, REMOTE_MODEL_LABEL);
        stub.requests();
        Ok(())
    }

    #[test]
    fn error_status_keeps_status_and_body() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let audio = ScopedAudioFile::create(dir.path(), None, b"audio")?;
        let stub = HttpStub::start(vec![(500, r#"{"detail":"engine crashed"}"#)]);

        let err = backend()
            .transcribe(&audio, &Language::Auto, &ctx(Some(stub.url())))
            .unwrap_err();
        assert_eq!(err.stage(), BackendStage::Request);
        assert!(err.message().contains("500"));
        assert!(err.message().contains("engine crashed"));
        stub.requests();
        Ok(())
    }

    #[test]
    fn malformed_body_is_a_response_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let audio = ScopedAudioFile::create(dir.path(), None, b"audio")?;
        let stub = HttpStub::start(vec![(200, "not json")]);

        let err = backend()
            .transcribe(&audio, &Language::Auto, &ctx(Some(stub.url())))
            .unwrap_err();
        assert_eq!(err.stage(), BackendStage::Response);
        stub.requests();
        Ok(())
    }
}
