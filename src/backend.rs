use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{BackendError, Error};
use crate::language::Language;
use crate::mode::ComputeMode;
use crate::scoped::ScopedAudioFile;

/// The closed set of backend kinds the gateway can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    HostedApi,
    LocalBinary,
    LocalModel,
    RemotePeer,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        Self::HostedApi,
        Self::LocalBinary,
        Self::LocalModel,
        Self::RemotePeer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostedApi => "hosted-api",
            Self::LocalBinary => "local-binary",
            Self::LocalModel => "local-model",
            Self::RemotePeer => "remote-peer",
        }
    }

    /// The concrete compute mode reported when this kind does the work.
    pub fn compute_mode(self) -> ComputeMode {
        match self {
            Self::LocalBinary | Self::LocalModel => ComputeMode::Local,
            Self::RemotePeer | Self::HostedApi => ComputeMode::Remote,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| Error::InvalidBackend(raw.to_owned()))
    }
}

/// Per-request values an adapter may need besides the audio itself.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Remote peer base URL (request override, else the configured one).
    pub remote_host: Option<String>,
    /// Effective thread count for local engines.
    pub threads: usize,
    /// Configured model name.
    pub model: String,
}

/// Text plus diagnostics returned by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    pub model: String,
    pub threads: Option<usize>,
    pub host: Option<String>,
}

impl Transcript {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            threads: None,
            host: None,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// Pluggable transcription backend used by [`crate::Gateway`].
///
/// Implementations block on their I/O (subprocesses, HTTP, inference); the gateway runs them on
/// blocking threads.
pub trait Backend: Send + Sync {
    /// Which kind this adapter implements.
    fn kind(&self) -> BackendKind;

    /// Bounded liveness check.
    ///
    /// Must not panic or block past its own short timeout; any internal error is `false`.
    fn probe(&self, ctx: &CallContext) -> bool;

    /// Transcribe the materialized upload.
    ///
    /// Adapters that produce side files must place them on `audio`'s derived paths so the scope
    /// can remove them.
    fn transcribe(
        &self,
        audio: &ScopedAudioFile,
        language: &Language,
        ctx: &CallContext,
    ) -> Result<Transcript, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_and_snake_names() -> crate::Result<()> {
        assert_eq!("local-model".parse::<BackendKind>()?, BackendKind::LocalModel);
        assert_eq!("REMOTE_PEER".parse::<BackendKind>()?, BackendKind::RemotePeer);
        assert!("gpu".parse::<BackendKind>().is_err());
        Ok(())
    }

    #[test]
    fn compute_mode_is_never_auto() {
        for kind in BackendKind::ALL {
            assert_ne!(kind.compute_mode(), ComputeMode::Auto);
        }
    }
}
