use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::error::{BackendError, BackendStage};
use crate::process::run_bounded;

/// Target sample rate of every normalized file.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Wrapper around the external `ffmpeg` transcoder.
///
/// Normalizes any input container/codec into a mono 16kHz PCM wav.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    timeout: Duration,
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Convert `src` into a mono 16kHz wav at `dst`.
    ///
    /// Any failure, including a timeout, is tagged [`BackendStage::Transcode`] on behalf of
    /// `backend`.
    pub fn normalize(
        &self,
        backend: BackendKind,
        src: &Path,
        dst: &Path,
    ) -> Result<(), BackendError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-y")
            .arg("-i")
            .arg(src)
            .args(["-ac", "1", "-ar"])
            .arg(TARGET_SAMPLE_RATE.to_string())
            .args(["-f", "wav"])
            .arg(dst);

        run_bounded(&mut cmd, self.timeout)
            .map_err(|err| BackendError::new(backend, BackendStage::Transcode, err.to_string()))?;

        if !dst.is_file() {
            return Err(BackendError::new(
                backend,
                BackendStage::Transcode,
                format!("transcoder produced no output at '{}'", dst.display()),
            ));
        }
        Ok(())
    }

    /// Whether the transcoder answers `-version` within `timeout`.
    pub fn is_available(&self, timeout: Duration) -> bool {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-version");
        run_bounded(&mut cmd, timeout).is_ok()
    }
}
