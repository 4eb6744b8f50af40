use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use anyhow::{Context, Result};
use hound::WavReader;
use tracing::debug;
use whisper_rs::WhisperContext;

use crate::backend::{Backend, BackendKind, CallContext, Transcript};
use crate::error::{BackendError, BackendStage};
use crate::language::Language;
use crate::model_registry::ModelRegistry;
use crate::scoped::ScopedAudioFile;
use crate::transcoder::{TARGET_SAMPLE_RATE, Transcoder};

use super::resolve_model_path;

mod logging;
mod whisper;

pub use whisper::load_whisper_model;

const KIND: BackendKind = BackendKind::LocalModel;

/// An in-process speech model that turns 16kHz mono samples into text.
pub trait SpeechModel: Send + Sync + 'static {
    /// `language` is `None` when the model should detect it.
    fn transcribe(
        &self,
        samples: &[f32],
        language: Option<&str>,
        threads: usize,
    ) -> Result<String>;
}

/// Runs inference in process against a model shared through a [`ModelRegistry`].
pub struct LocalModelBackend<M: SpeechModel = WhisperContext> {
    registry: Arc<ModelRegistry<M>>,
    models_dir: PathBuf,
    transcoder: Transcoder,
    probe_timeout: Duration,
    timeout: Duration,
}

impl LocalModelBackend<WhisperContext> {
    /// A backend that loads whisper.cpp models from `models_dir` on first use.
    pub fn whisper(
        models_dir: impl Into<PathBuf>,
        transcoder: Transcoder,
        probe_timeout: Duration,
        timeout: Duration,
    ) -> Self {
        let models_dir = models_dir.into();
        let loader_dir = models_dir.clone();
        let registry = ModelRegistry::new(move |name| {
            load_whisper_model(&resolve_model_path(&loader_dir, name))
        });
        Self::with_registry(
            Arc::new(registry),
            models_dir,
            transcoder,
            probe_timeout,
            timeout,
        )
    }
}

impl<M: SpeechModel> LocalModelBackend<M> {
    pub fn with_registry(
        registry: Arc<ModelRegistry<M>>,
        models_dir: impl Into<PathBuf>,
        transcoder: Transcoder,
        probe_timeout: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            models_dir: models_dir.into(),
            transcoder,
            probe_timeout,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry<M>> {
        &self.registry
    }

    fn infer(
        &self,
        model: Arc<M>,
        samples: Vec<f32>,
        language: Option<String>,
        threads: usize,
    ) -> Result<String, BackendError> {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(model.transcribe(&samples, language.as_deref(), threads));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result
                .map_err(|err| BackendError::new(KIND, BackendStage::Engine, format!("{err:#}"))),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(BackendError::new(
                KIND,
                BackendStage::Engine,
                format!("inference timed out after {}s", self.timeout.as_secs()),
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(BackendError::new(
                KIND,
                BackendStage::Engine,
                "inference worker exited without a result",
            )),
        }
    }
}

impl<M: SpeechModel> Backend for LocalModelBackend<M> {
    fn kind(&self) -> BackendKind {
        KIND
    }

    /// Every upload is normalized first, so a missing transcoder makes this backend unusable
    /// even with the model already in memory.
    fn probe(&self, ctx: &CallContext) -> bool {
        (self.registry.is_loaded(&ctx.model)
            || resolve_model_path(&self.models_dir, &ctx.model).is_file())
            && self.transcoder.is_available(self.probe_timeout)
    }

    fn transcribe(
        &self,
        audio: &ScopedAudioFile,
        language: &Language,
        ctx: &CallContext,
    ) -> Result<Transcript, BackendError> {
        let wav = audio.wav_path();
        self.transcoder.normalize(KIND, audio.path(), &wav)?;
        let samples = read_samples(&wav)
            .map_err(|err| BackendError::new(KIND, BackendStage::Transcode, format!("{err:#}")))?;

        let model = self.registry.get_or_load(&ctx.model).map_err(|err| {
            BackendError::new(KIND, BackendStage::ModelLoad, format!("{err:#}"))
        })?;

        debug!(
            model = %ctx.model,
            samples = samples.len(),
            threads = ctx.threads,
            "running in-process inference"
        );
        let hint = language.hint().map(str::to_owned);
        let text = self.infer(model, samples, hint, ctx.threads)?;

        Ok(Transcript::new(text, ctx.model.clone()).with_threads(ctx.threads))
    }
}

/// Read a normalized wav as f32 samples in `[-1.0, 1.0]`.
fn read_samples(path: &Path) -> Result<Vec<f32>> {
    let file = File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
    let mut reader = WavReader::new(BufReader::new(file)).context("failed to read WAV data")?;
    let spec = reader.spec();

    anyhow::ensure!(
        spec.channels == 1,
        "expected mono WAV (1 channel), got {} channels",
        spec.channels
    );
    anyhow::ensure!(
        spec.sample_rate == TARGET_SAMPLE_RATE,
        "expected {} Hz sample rate, got {} Hz",
        TARGET_SAMPLE_RATE,
        spec.sample_rate
    );

    reader
        .samples::<i16>()
        .map(|sample| {
            sample
                .map(|pcm| pcm as f32 / i16::MAX as f32)
                .context("failed to read WAV sample")
        })
        .collect()
}
