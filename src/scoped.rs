//! Request-scoped temporary files.
//!
//! Every upload is written to `{data_dir}/{uuid}.upload.{ext}`. Adapters derive their side files
//! from the same base name (`{uuid}.wav`, `{uuid}.txt`, ...), so dropping the scope can enumerate
//! and remove everything a request may have produced, including artifacts whose creation failed
//! halfway through.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Output suffixes whisper.cpp-style engines may write next to the output prefix.
pub const DERIVED_OUTPUT_EXTENSIONS: [&str; 5] = ["txt", "srt", "vtt", "json", "tsv"];

const DEFAULT_EXTENSION: &str = "wav";
const MAX_EXTENSION_LEN: usize = 16;

/// The on-disk materialization of one upload plus its derived artifacts.
///
/// Deleted on drop. Missing files are ignored; other deletion failures are logged and swallowed.
#[derive(Debug)]
pub struct ScopedAudioFile {
    id: Uuid,
    dir: PathBuf,
    source: PathBuf,
}

impl ScopedAudioFile {
    /// Write `audio` into `dir` under a fresh random name.
    ///
    /// Only the extension of `filename` is used; the rest of the client-supplied name never
    /// reaches the filesystem.
    pub fn create(dir: &Path, filename: Option<&str>, audio: &[u8]) -> Result<Self> {
        let id = Uuid::new_v4();
        let extension = sanitized_extension(filename);
        let source = dir.join(format!("{id}.upload.{extension}"));

        // Build the scope first so a partially written source is still removed on error.
        let scope = Self {
            id,
            dir: dir.to_path_buf(),
            source,
        };

        let mut file = fs::File::create(&scope.source).map_err(|err| {
            Error::Resource(format!(
                "failed to create temp file '{}': {err}",
                scope.source.display()
            ))
        })?;
        file.write_all(audio)
            .and_then(|()| file.flush())
            .map_err(|err| {
                Error::Resource(format!(
                    "failed to write temp file '{}': {err}",
                    scope.source.display()
                ))
            })?;

        debug!(path = %scope.source.display(), bytes = audio.len(), "materialized upload");
        Ok(scope)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The uploaded payload as written to disk.
    pub fn path(&self) -> &Path {
        &self.source
    }

    /// Target of the mono 16kHz normalization.
    pub fn wav_path(&self) -> PathBuf {
        self.derived("wav")
    }

    /// Prefix handed to engines that append their own output suffixes.
    pub fn output_prefix(&self) -> PathBuf {
        self.dir.join(self.id.to_string())
    }

    /// The plain-text transcript an engine writes at `output_prefix()`.
    pub fn text_path(&self) -> PathBuf {
        self.derived("txt")
    }

    /// Every path this scope is responsible for, existing or not.
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.source.clone(), self.wav_path()];
        paths.extend(DERIVED_OUTPUT_EXTENSIONS.iter().map(|ext| self.derived(ext)));
        paths
    }

    fn derived(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{extension}", self.id))
    }
}

impl Drop for ScopedAudioFile {
    fn drop(&mut self) {
        for path in self.artifact_paths() {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed scoped file"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove scoped file")
                }
            }
        }
    }
}

fn sanitized_extension(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::entries;

    #[test]
    fn writes_payload_and_removes_it_on_drop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let scope = ScopedAudioFile::create(dir.path(), Some("clip.mp3"), b"abc")?;
        assert_eq!(fs::read(scope.path())?, b"abc");
        assert!(scope.path().to_string_lossy().ends_with(".mp3"));

        drop(scope);
        assert_eq!(entries(dir.path()), 0);
        Ok(())
    }

    #[test]
    fn removes_every_derived_artifact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let scope = ScopedAudioFile::create(dir.path(), Some("clip.m4a"), b"abc")?;
        fs::write(scope.wav_path(), b"wav")?;
        for ext in DERIVED_OUTPUT_EXTENSIONS {
            fs::write(scope.output_prefix().with_extension(ext), b"out")?;
        }
        assert_eq!(entries(dir.path()), 7);

        drop(scope);
        assert_eq!(entries(dir.path()), 0);
        Ok(())
    }

    #[test]
    fn tolerates_already_removed_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let scope = ScopedAudioFile::create(dir.path(), None, b"abc")?;
        fs::remove_file(scope.path())?;
        drop(scope);
        assert_eq!(entries(dir.path()), 0);
        Ok(())
    }

    #[test]
    fn create_fails_with_resource_error_for_missing_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("nope");
        let err = ScopedAudioFile::create(&missing, Some("a.wav"), b"abc").unwrap_err();
        assert!(matches!(err, Error::Resource(_)));
        Ok(())
    }

    #[test]
    fn client_filenames_only_contribute_a_safe_extension() {
        assert_eq!(sanitized_extension(Some("../../etc/passwd")), "wav");
        assert_eq!(sanitized_extension(Some("talk.FLAC")), "flac");
        assert_eq!(sanitized_extension(Some("weird.m p3")), "wav");
        assert_eq!(sanitized_extension(None), "wav");
    }

    #[test]
    fn wav_upload_never_aliases_the_normalization_target() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let scope = ScopedAudioFile::create(dir.path(), Some("a.wav"), b"abc")?;
        assert_ne!(scope.path(), scope.wav_path());
        assert_eq!(scope.artifact_paths().len(), 7);
        Ok(())
    }

    #[test]
    fn concurrent_scopes_get_distinct_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = ScopedAudioFile::create(dir.path(), Some("a.wav"), b"a")?;
        let b = ScopedAudioFile::create(dir.path(), Some("a.wav"), b"b")?;
        assert_ne!(a.id(), b.id());
        assert_eq!(fs::read(a.path())?, b"a");
        assert_eq!(fs::read(b.path())?, b"b");
        Ok(())
    }
}
