use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::backend::{Backend, BackendKind};
use crate::backends::hosted_api::{HostedApiBackend, HostedApiConfig};
use crate::backends::local_binary::{DEFAULT_WHISPER_BIN, LocalBinaryBackend};
use crate::backends::local_model::LocalModelBackend;
use crate::backends::remote_peer::RemotePeerBackend;
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::settings::{Settings, SettingsSnapshot};
use crate::transcoder::Transcoder;

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_MODELS_DIR: &str = "/models";
pub const DEFAULT_FFMPEG: &str = "ffmpeg";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(300);

/// Adapters enabled when none are listed explicitly.
pub const DEFAULT_BACKENDS: [BackendKind; 2] = [BackendKind::LocalModel, BackendKind::RemotePeer];

/// Startup configuration. Values here are fixed for the life of the process; anything that can
/// change at runtime lives in `settings`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub backends: Vec<BackendKind>,
    pub whisper_bin: PathBuf,
    pub ffmpeg: PathBuf,
    pub hosted: HostedApiConfig,
    pub probe_timeout: Duration,
    pub transcribe_timeout: Duration,
    pub settings: SettingsSnapshot,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            backends: DEFAULT_BACKENDS.to_vec(),
            whisper_bin: PathBuf::from(DEFAULT_WHISPER_BIN),
            ffmpeg: PathBuf::from(DEFAULT_FFMPEG),
            hosted: HostedApiConfig::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            transcribe_timeout: DEFAULT_TRANSCRIBE_TIMEOUT,
            settings: SettingsSnapshot::default(),
        }
    }
}

impl GatewayConfig {
    fn build_backend(&self, kind: BackendKind) -> Arc<dyn Backend> {
        let transcoder = Transcoder::new(&self.ffmpeg, self.transcribe_timeout);
        match kind {
            BackendKind::HostedApi => Arc::new(HostedApiBackend::new(HostedApiConfig {
                timeout: self.transcribe_timeout,
                ..self.hosted.clone()
            })),
            BackendKind::LocalBinary => Arc::new(LocalBinaryBackend::new(
                &self.whisper_bin,
                &self.models_dir,
                transcoder,
                self.probe_timeout,
                self.transcribe_timeout,
            )),
            BackendKind::LocalModel => Arc::new(LocalModelBackend::whisper(
                &self.models_dir,
                transcoder,
                self.probe_timeout,
                self.transcribe_timeout,
            )),
            BackendKind::RemotePeer => Arc::new(RemotePeerBackend::new(
                self.probe_timeout,
                self.transcribe_timeout,
            )),
        }
    }
}

impl Gateway {
    /// Assemble a gateway with the adapters `config` enables, creating the data dir if needed.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).map_err(|err| {
            Error::Resource(format!(
                "failed to create data dir '{}': {err}",
                config.data_dir.display()
            ))
        })?;
        if config.backends.is_empty() {
            return Err(Error::Configuration("no backends enabled".to_owned()));
        }

        let mut kinds = config.backends.clone();
        kinds.sort();
        kinds.dedup();
        let backends = kinds
            .iter()
            .map(|kind| config.build_backend(*kind))
            .collect();

        info!(
            data_dir = %config.data_dir.display(),
            models_dir = %config.models_dir.display(),
            backends = ?kinds,
            "gateway configured"
        );
        let settings = Arc::new(Settings::new(config.settings));
        Ok(Gateway::new(settings, config.data_dir, backends))
    }
}
