//! Shared fixtures for unit tests: fake executables, a canned HTTP server, stub backends.

use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backend::{Backend, BackendKind, CallContext, Transcript};
use crate::error::{BackendError, BackendStage};
use crate::language::Language;
use crate::scoped::ScopedAudioFile;

/// Write an executable shell script into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// A stand-in for `ffmpeg`: copies the `-i` input to the last argument.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-ffmpeg",
        r#"if [ "$1" = "-version" ]; then exit 0; fi
src=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then src="$arg"; fi
  prev="$arg"
  dst="$arg"
done
cp "$src" "$dst""#,
    )
}

/// A stand-in for `whisper-cli`: appends its arguments to `args_log`, then writes `text` to
/// `<prefix>.txt` and an empty `<prefix>.srt`.
#[cfg(unix)]
pub fn fake_whisper_cli(dir: &Path, text: &str, args_log: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-whisper-cli",
        &format!(
            r#"echo "$@" >> "{log}"
prefix=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-of" ]; then prefix="$arg"; fi
  prev="$arg"
done
printf '%s\n' "{text}" > "$prefix.txt"
: > "$prefix.srt""#,
            log = args_log.display(),
        ),
    )
}

/// A 16-bit mono 16kHz wav containing `samples`.
pub fn wav_bytes(samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: crate::transcoder::TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for sample in samples {
            writer.write_sample(*sample).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

/// Number of entries in `dir`.
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
}

/// Serves one canned response per connection, in order, then stops.
pub struct HttpStub {
    url: String,
    handle: JoinHandle<Vec<String>>,
}

impl HttpStub {
    pub fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
        let url = format!("http://{}", listener.local_addr().expect("stub addr"));

        let handle = std::thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
                requests.push(read_request(&mut stream));
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
            requests
        });

        Self { url, handle }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw requests received so far; waits for every canned response to be served.
    pub fn requests(self) -> Vec<String> {
        self.handle.join().expect("stub thread")
    }
}

fn read_request(stream: &mut impl Read) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if request_complete(&buf) {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn request_complete(buf: &[u8]) -> bool {
    let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let body = &buf[header_end + 4..];

    if let Some(len) = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        return body.len() >= len;
    }
    if headers.contains("transfer-encoding: chunked") {
        return body.ends_with(b"0\r\n\r\n");
    }
    true
}

/// What a [`StubBackend`] does when asked to transcribe.
#[derive(Debug, Clone)]
pub enum StubBehavior {
    /// Return a fixed text.
    Text(&'static str),
    /// Return the uploaded bytes as text.
    Echo,
    /// Fail at the given stage.
    Fail(BackendStage),
}

/// Configurable in-memory backend that counts invocations.
pub struct StubBackend {
    kind: BackendKind,
    available: bool,
    behavior: StubBehavior,
    pub probes: AtomicUsize,
    pub calls: AtomicUsize,
    pub hints: Mutex<Vec<Option<String>>>,
    pub source_existed: Mutex<Vec<bool>>,
    /// Entries in the upload's directory at call time.
    pub dir_entries: Mutex<Vec<usize>>,
}

impl StubBackend {
    pub fn new(kind: BackendKind, available: bool, behavior: StubBehavior) -> Self {
        Self {
            kind,
            available,
            behavior,
            probes: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            hints: Mutex::new(Vec::new()),
            source_existed: Mutex::new(Vec::new()),
            dir_entries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Backend for StubBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn probe(&self, ctx: &CallContext) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.kind == BackendKind::RemotePeer && ctx.remote_host.is_none() {
            return false;
        }
        self.available
    }

    fn transcribe(
        &self,
        audio: &ScopedAudioFile,
        language: &Language,
        ctx: &CallContext,
    ) -> Result<Transcript, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hints
            .lock()
            .expect("hints lock")
            .push(language.hint().map(str::to_owned));
        self.source_existed
            .lock()
            .expect("source lock")
            .push(audio.path().is_file());
        self.dir_entries
            .lock()
            .expect("entries lock")
            .push(audio.path().parent().map_or(0, entries));

        let mut transcript = match &self.behavior {
            StubBehavior::Text(text) => Transcript::new(*text, "stub"),
            StubBehavior::Echo => {
                let bytes = std::fs::read(audio.path()).map_err(|err| {
                    BackendError::new(self.kind, BackendStage::Output, err.to_string())
                })?;
                Transcript::new(String::from_utf8_lossy(&bytes).into_owned(), "stub")
            }
            StubBehavior::Fail(stage) => {
                return Err(BackendError::new(self.kind, *stage, "stub failure"));
            }
        };
        if self.kind == BackendKind::RemotePeer {
            if let Some(host) = &ctx.remote_host {
                transcript = transcript.with_host(host.clone());
            }
        }
        Ok(transcript.with_threads(ctx.threads))
    }
}

pub fn stub(kind: BackendKind, available: bool, behavior: StubBehavior) -> Arc<StubBackend> {
    Arc::new(StubBackend::new(kind, available, behavior))
}

pub fn as_backends(stubs: &[&Arc<StubBackend>]) -> Vec<Arc<dyn Backend>> {
    stubs
        .iter()
        .map(|stub| Arc::clone(*stub) as Arc<dyn Backend>)
        .collect()
}
