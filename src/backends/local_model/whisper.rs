use std::path::Path;

use anyhow::{Context, Result};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::SpeechModel;
use super::logging::silence_whisper_logging;

/// Load a ggml model file into a whisper.cpp context.
pub fn load_whisper_model(path: &Path) -> Result<WhisperContext> {
    silence_whisper_logging();

    let path = path.to_string_lossy();
    WhisperContext::new_with_params(&path, WhisperContextParameters::default())
        .with_context(|| format!("failed to load model from path: {path}"))
}

fn full_params(language: Option<&str>, threads: usize) -> FullParams<'_, '_> {
    let mut params = FullParams::new(SamplingStrategy::BeamSearch {
        beam_size: 5,
        patience: 1.0,
    });

    params.set_n_threads(i32::try_from(threads).unwrap_or(i32::MAX));
    params.set_translate(false);
    params.set_language(language);
    params.set_no_context(true);

    params.set_print_progress(false);
    params.set_print_special(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    params
}

impl SpeechModel for WhisperContext {
    fn transcribe(
        &self,
        samples: &[f32],
        language: Option<&str>,
        threads: usize,
    ) -> Result<String> {
        let mut state = self
            .create_state()
            .context("failed to create whisper state")?;
        state
            .full(full_params(language, threads), samples)
            .context("failed to run whisper full()")?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(segment.to_str().context("failed to get segment text")?);
        }
        Ok(text)
    }
}
