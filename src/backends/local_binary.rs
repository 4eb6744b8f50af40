use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::backend::{Backend, BackendKind, CallContext, Transcript};
use crate::error::{BackendError, BackendStage};
use crate::language::{AUTO_LANGUAGE, Language};
use crate::process::{find_program, run_bounded};
use crate::scoped::ScopedAudioFile;
use crate::transcoder::Transcoder;

use super::resolve_model_path;

pub const DEFAULT_WHISPER_BIN: &str = "/app/build/bin/whisper-cli";

const KIND: BackendKind = BackendKind::LocalBinary;

/// Runs the whisper.cpp command line tool on a normalized copy of the upload.
#[derive(Debug, Clone)]
pub struct LocalBinaryBackend {
    binary: PathBuf,
    models_dir: PathBuf,
    transcoder: Transcoder,
    probe_timeout: Duration,
    timeout: Duration,
}

impl LocalBinaryBackend {
    pub fn new(
        binary: impl Into<PathBuf>,
        models_dir: impl Into<PathBuf>,
        transcoder: Transcoder,
        probe_timeout: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            models_dir: models_dir.into(),
            transcoder,
            probe_timeout,
            timeout,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn engine_command(
        &self,
        model_path: &Path,
        audio: &ScopedAudioFile,
        language: &Language,
        threads: usize,
    ) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(model_path)
            .arg("-f")
            .arg(audio.wav_path())
            .arg("-otxt")
            .arg("-of")
            .arg(audio.output_prefix())
            .arg("-t")
            .arg(threads.to_string())
            // whisper-cli defaults to English without `-l`; `auto` is its own detect keyword.
            .arg("-l")
            .arg(language.hint().unwrap_or(AUTO_LANGUAGE));
        cmd
    }
}

impl Backend for LocalBinaryBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn probe(&self, ctx: &CallContext) -> bool {
        find_program(&self.binary).is_some()
            && resolve_model_path(&self.models_dir, &ctx.model).is_file()
            && self.transcoder.is_available(self.probe_timeout)
    }

    fn transcribe(
        &self,
        audio: &ScopedAudioFile,
        language: &Language,
        ctx: &CallContext,
    ) -> Result<Transcript, BackendError> {
        let model_path = resolve_model_path(&self.models_dir, &ctx.model);
        if !model_path.is_file() {
            return Err(BackendError::new(
                KIND,
                BackendStage::ModelLoad,
                format!("model not found at '{}'", model_path.display()),
            ));
        }

        self.transcoder
            .normalize(KIND, audio.path(), &audio.wav_path())?;

        debug!(
            binary = %self.binary.display(),
            threads = ctx.threads,
            %language,
            "running whisper-cli"
        );
        let mut cmd = self.engine_command(&model_path, audio, language, ctx.threads);
        run_bounded(&mut cmd, self.timeout)
            .map_err(|err| BackendError::new(KIND, BackendStage::Engine, err.to_string()))?;

        let text_path = audio.text_path();
        let raw = fs::read(&text_path).map_err(|err| {
            BackendError::new(
                KIND,
                BackendStage::Output,
                format!("failed to read '{}': {err}", text_path.display()),
            )
        })?;

        Ok(
            Transcript::new(String::from_utf8_lossy(&raw).into_owned(), ctx.model.clone())
                .with_threads(ctx.threads),
        )
    }
}
