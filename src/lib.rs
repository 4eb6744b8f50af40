//! `whisper-gateway` is a transcription gateway that routes uploaded audio to one of several
//! Whisper backends.
//!
//! This crate provides:
//! - Four backend adapters behind one [`Backend`] trait: a hosted API, the whisper.cpp
//!   executable, in-process whisper.cpp, and a remote peer running this gateway
//! - Per-request availability probing and a pure backend selector
//! - A [`Gateway`] that runs each request with at most one fallback and removes every
//!   temporary file it created
//! - Runtime-mutable [`Settings`] shared with the HTTP surface
//!
//! The core is synchronous; the bundled server drives it from blocking tasks.

// High-level API (most consumers should start here).
pub mod config;
pub mod gateway;
pub mod request;
pub mod settings;

// Routing vocabulary.
pub mod backend;
pub mod language;
pub mod mode;

// Probing and selection.
pub mod probe;
pub mod select;

// Backend adapters and the pieces they share.
pub mod backends;
pub mod model_registry;
pub mod process;
pub mod scoped;
pub mod transcoder;

pub mod error;

#[cfg(feature = "logging")]
pub mod logging;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{Backend, BackendKind, CallContext, Transcript};
pub use config::GatewayConfig;
pub use error::{BackendError, BackendStage, Error, Result};
pub use gateway::{
    FileInfo, Gateway, HealthReport, HealthStatus, TranscriptMetadata, TranscriptionResult,
};
pub use language::Language;
pub use mode::ComputeMode;
pub use request::TranscriptionRequest;
pub use scoped::ScopedAudioFile;
pub use settings::{Settings, SettingsSnapshot};
