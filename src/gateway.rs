//! Request orchestration: resolve effective values, probe, select, invoke with at most one
//! fallback, and release the scoped upload on every path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::{error, info, warn};

use crate::backend::{Backend, BackendKind, CallContext, Transcript};
use crate::error::{BackendError, BackendStage, Error, Result};
use crate::language::Language;
use crate::mode::ComputeMode;
use crate::probe::{AvailabilitySnapshot, probe_all};
use crate::request::TranscriptionRequest;
use crate::scoped::ScopedAudioFile;
use crate::select::{SelectionInput, fallback_for, relevant_kinds, select};
use crate::settings::{Settings, SettingsSnapshot, normalize_host};

/// Diagnostics describing how a transcript was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptMetadata {
    pub model: String,
    pub threads: Option<usize>,
    pub host: Option<String>,
}

/// The caller's upload as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub filename: Option<String>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: String,
    pub backend: BackendKind,
    /// Always `local` or `remote`.
    pub compute_mode: ComputeMode,
    pub metadata: TranscriptMetadata,
    /// The backend that failed first, when this result came from the fallback.
    pub fallback_from: Option<BackendKind>,
    pub file: FileInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    NoService,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub backends: AvailabilitySnapshot,
    pub available_backends: Vec<BackendKind>,
    pub available_modes: Vec<ComputeMode>,
    #[serde(serialize_with = "mode_or_none")]
    pub current_compute_mode: Option<ComputeMode>,
    pub remote_host: Option<String>,
    pub model: String,
    pub language: String,
}

fn mode_or_none<S: Serializer>(
    mode: &Option<ComputeMode>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(mode.map_or("none", ComputeMode::as_str))
}

enum Attempt {
    Primary(BackendKind),
    Fallback {
        kind: BackendKind,
        primary: BackendError,
    },
}

impl Attempt {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Primary(kind) | Self::Fallback { kind, .. } => *kind,
        }
    }
}

/// Routes transcription requests across the configured backends.
pub struct Gateway {
    settings: Arc<Settings>,
    data_dir: PathBuf,
    backends: BTreeMap<BackendKind, Arc<dyn Backend>>,
}

impl Gateway {
    /// Later adapters replace earlier ones of the same kind.
    pub fn new(
        settings: Arc<Settings>,
        data_dir: impl Into<PathBuf>,
        backends: Vec<Arc<dyn Backend>>,
    ) -> Self {
        let backends = backends
            .into_iter()
            .map(|backend| (backend.kind(), backend))
            .collect();
        Self {
            settings,
            data_dir: data_dir.into(),
            backends,
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Kinds with a configured adapter, in display order.
    pub fn backend_kinds(&self) -> Vec<BackendKind> {
        self.backends.keys().copied().collect()
    }

    /// Transcribe one upload.
    ///
    /// Blocks on subprocess and network I/O; async callers should run it on a blocking thread.
    pub fn run(&self, request: &TranscriptionRequest) -> Result<TranscriptionResult> {
        let settings = self.settings.snapshot();
        let audio = ScopedAudioFile::create(&self.data_dir, request.filename(), request.audio())?;

        let language = Language::resolve(request.language(), Some(&settings.language));
        let mode = request.mode().unwrap_or(settings.compute_mode);
        let explicit = request.backend().or(settings.backend);
        let ctx = CallContext {
            remote_host: normalize_host(request.remote_host())
                .or_else(|| settings.remote_host.clone()),
            threads: clamp_threads(request.threads().unwrap_or(settings.threads)),
            model: settings.model.clone(),
        };

        let snapshot = self.probe(
            relevant_kinds(mode, explicit, settings.allow_fallback),
            &ctx,
        );
        let input = SelectionInput {
            mode,
            snapshot: &snapshot,
            explicit,
            remote_host: ctx.remote_host.as_deref(),
        };
        let primary = select(input).inspect_err(|err| {
            warn!(request_id = %audio.id(), %mode, error = %err, "no backend selected");
        })?;
        info!(request_id = %audio.id(), backend = %primary, %mode, %language, "backend selected");

        let mut attempt = Attempt::Primary(primary);
        loop {
            let kind = attempt.kind();
            let outcome = self.invoke(kind, &audio, &language, &ctx);

            attempt = match (attempt, outcome) {
                (Attempt::Primary(_), Ok(transcript)) => {
                    return Ok(self.finish(request, kind, transcript, &language, None));
                }
                (Attempt::Fallback { primary, .. }, Ok(transcript)) => {
                    let from = primary.backend();
                    return Ok(self.finish(request, kind, transcript, &language, Some(from)));
                }
                (Attempt::Primary(_), Err(err)) => {
                    match fallback_for(kind, input, settings.allow_fallback) {
                        Some(next) => {
                            warn!(
                                request_id = %audio.id(),
                                backend = %kind,
                                fallback = %next,
                                stage = %err.stage(),
                                error = %err,
                                "backend failed, falling back"
                            );
                            Attempt::Fallback {
                                kind: next,
                                primary: err,
                            }
                        }
                        None => {
                            error!(
                                request_id = %audio.id(),
                                backend = %kind,
                                stage = %err.stage(),
                                error = %err,
                                "transcription failed"
                            );
                            return Err(err.into());
                        }
                    }
                }
                (Attempt::Fallback { primary, .. }, Err(err)) => {
                    error!(
                        request_id = %audio.id(),
                        backend = %kind,
                        primary = %primary.backend(),
                        stage = %err.stage(),
                        error = %err,
                        "fallback failed"
                    );
                    return Err(Error::Backend {
                        source: err,
                        primary: Some(primary),
                    });
                }
            };
        }
    }

    /// Probe every configured backend against the current settings. Never fails.
    pub fn health(&self) -> HealthReport {
        let settings = self.settings.snapshot();
        let ctx = context_for(&settings);
        let snapshot = self.probe(self.backend_kinds(), &ctx);

        let mut available_modes = Vec::new();
        for mode in [ComputeMode::Local, ComputeMode::Remote] {
            if snapshot.available().any(|kind| kind.compute_mode() == mode) {
                available_modes.push(mode);
            }
        }

        let current_compute_mode = select(SelectionInput {
            mode: settings.compute_mode,
            snapshot: &snapshot,
            explicit: settings.backend,
            remote_host: ctx.remote_host.as_deref(),
        })
        .ok()
        .map(BackendKind::compute_mode);

        let remote_host = settings
            .remote_host
            .clone()
            .filter(|_| snapshot.is_available(BackendKind::RemotePeer));

        HealthReport {
            status: if snapshot.any_available() {
                HealthStatus::Ok
            } else {
                HealthStatus::NoService
            },
            version: env!("CARGO_PKG_VERSION"),
            available_backends: snapshot.available().collect(),
            backends: snapshot,
            available_modes,
            current_compute_mode,
            remote_host,
            model: settings.model,
            language: settings.language,
        }
    }

    fn probe(&self, kinds: Vec<BackendKind>, ctx: &CallContext) -> AvailabilitySnapshot {
        let backends: Vec<Arc<dyn Backend>> = kinds
            .into_iter()
            .filter_map(|kind| self.backends.get(&kind).cloned())
            .collect();
        probe_all(&backends, ctx)
    }

    fn invoke(
        &self,
        kind: BackendKind,
        audio: &ScopedAudioFile,
        language: &Language,
        ctx: &CallContext,
    ) -> std::result::Result<Transcript, BackendError> {
        let backend = self.backends.get(&kind).ok_or_else(|| {
            BackendError::new(kind, BackendStage::Request, "backend not configured")
        })?;
        backend.transcribe(audio, language, ctx)
    }

    fn finish(
        &self,
        request: &TranscriptionRequest,
        kind: BackendKind,
        transcript: Transcript,
        language: &Language,
        fallback_from: Option<BackendKind>,
    ) -> TranscriptionResult {
        info!(
            backend = %kind,
            fallback_from = ?fallback_from,
            model = %transcript.model,
            "transcription succeeded"
        );
        TranscriptionResult {
            text: transcript.text.trim().to_owned(),
            language: language.as_str().to_owned(),
            backend: kind,
            compute_mode: kind.compute_mode(),
            metadata: TranscriptMetadata {
                model: transcript.model,
                threads: transcript.threads,
                host: transcript.host,
            },
            fallback_from,
            file: FileInfo {
                filename: request.filename().map(str::to_owned),
                size: request.audio().len(),
            },
        }
    }
}

fn context_for(settings: &SettingsSnapshot) -> CallContext {
    CallContext {
        remote_host: settings.remote_host.clone(),
        threads: clamp_threads(settings.threads),
        model: settings.model.clone(),
    }
}

fn clamp_threads(threads: usize) -> usize {
    threads.clamp(1, num_cpus::get().max(1))
}
